//! # Rifas Runtime
//!
//! Drives a [`Reducer`] for one interactive session: actions go in, the
//! reducer updates state, and the effects it returns are spawned on tokio.
//! Whatever action an effect resolves to is sent back through the reducer.
//!
//! ## Example
//!
//! ```ignore
//! use rifas_runtime::Store;
//!
//! let store = Store::new(GridState::new(..), GridReducer::new(), environment);
//!
//! store.send(GridAction::Load).await?;
//! store.settled().await;
//!
//! let busy = store.state(|s| s.busy).await;
//! ```

use rifas_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, RwLock};

/// Errors raised by the session runtime itself
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// The store was shut down and takes no more actions
    #[error("Session is shutting down")]
    ShutdownInProgress,

    /// Effects were still running when the shutdown deadline passed
    #[error("Shutdown timed out with {0} effects still running")]
    ShutdownTimeout(usize),
}

/// Counts spawned effects and wakes waiters when the count drops to zero
#[derive(Clone, Default)]
struct InFlight {
    count: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl InFlight {
    fn enter(&self) -> InFlightGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard(self.clone())
    }

    fn load(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

/// Leaves the in-flight count on drop, so a panicking effect still settles
struct InFlightGuard(InFlight);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.0.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Runtime coordinator for one reducer
///
/// Cloning is cheap and every clone shares the same state.
pub struct Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E>,
{
    state: Arc<RwLock<S>>,
    reducer: R,
    environment: E,
    closed: Arc<AtomicBool>,
    in_flight: InFlight,
    _action: std::marker::PhantomData<fn(A)>,
}

impl<S, A, E, R> Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Clone + Send + Sync + 'static,
    A: Send + Clone + std::fmt::Debug + 'static,
    S: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Creates a store with its initial state
    #[must_use]
    pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
        Self {
            state: Arc::new(RwLock::new(initial_state)),
            reducer,
            environment,
            closed: Arc::new(AtomicBool::new(false)),
            in_flight: InFlight::default(),
            _action: std::marker::PhantomData,
        }
    }

    /// The injected environment
    #[must_use]
    pub const fn environment(&self) -> &E {
        &self.environment
    }

    /// Number of effects currently running
    #[must_use]
    pub fn pending_effects(&self) -> usize {
        self.in_flight.load()
    }

    /// Reduces `action` and spawns the effects it returns
    ///
    /// Returns once the effects are started, not when they finish; use
    /// [`Store::settled`] to wait for them.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ShutdownInProgress`] after [`Store::shutdown`].
    #[tracing::instrument(skip_all, name = "session_send")]
    pub async fn send(&self, action: A) -> Result<(), RuntimeError> {
        if self.closed.load(Ordering::Acquire) {
            tracing::debug!(?action, "Action rejected after shutdown");
            metrics::counter!("rifas.session.rejected_actions").increment(1);
            return Err(RuntimeError::ShutdownInProgress);
        }

        let effects = {
            let mut state = self.state.write().await;
            self.reducer.reduce(&mut *state, action, &self.environment)
        };
        tracing::trace!(effects = effects.len(), "Reduced action");

        for effect in effects {
            self.spawn_effect(effect);
        }
        Ok(())
    }

    /// Reads the state through a closure
    pub async fn state<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&S) -> T,
    {
        let state = self.state.read().await;
        f(&*state)
    }

    /// Waits until no effect is running
    ///
    /// A feedback action spawns its own effects before the effect that
    /// produced it finishes, so this covers whole chains of round trips.
    pub async fn settled(&self) {
        loop {
            let idle = self.in_flight.idle.notified();
            if self.in_flight.load() == 0 {
                return;
            }
            idle.await;
        }
    }

    /// Stops taking actions and waits for running effects
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::ShutdownTimeout`] if effects are still running
    /// when `timeout` expires.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), RuntimeError> {
        self.closed.store(true, Ordering::Release);

        if tokio::time::timeout(timeout, self.settled()).await.is_ok() {
            tracing::debug!("Session closed");
            Ok(())
        } else {
            let pending = self.in_flight.load();
            tracing::warn!(pending_effects = pending, "Session shutdown timed out");
            Err(RuntimeError::ShutdownTimeout(pending))
        }
    }

    fn spawn_effect(&self, effect: Effect<A>) {
        let fut = match effect {
            Effect::None => return,
            Effect::Future(fut) => fut,
        };

        metrics::counter!("rifas.session.effects").increment(1);
        let guard = self.in_flight.enter();
        let store = self.clone();

        tokio::spawn(async move {
            let _guard = guard;
            if let Some(action) = fut.await {
                if let Err(error) = store.send(action).await {
                    tracing::debug!(%error, "Feedback action dropped");
                }
            }
        });
    }
}

impl<S, A, E, R> Clone for Store<S, A, E, R>
where
    R: Reducer<State = S, Action = A, Environment = E> + Clone,
    E: Clone,
{
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            reducer: self.reducer.clone(),
            environment: self.environment.clone(),
            closed: Arc::clone(&self.closed),
            in_flight: self.in_flight.clone(),
            _action: std::marker::PhantomData,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use rifas_core::{SmallVec, smallvec};

    #[derive(Debug, Clone, Default)]
    struct Counter {
        value: i32,
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum CounterAction {
        Bump,
        BumpLater,
        Countdown(u8),
        Hang,
    }

    #[derive(Debug, Clone)]
    struct CounterReducer;

    impl Reducer for CounterReducer {
        type State = Counter;
        type Action = CounterAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Counter,
            action: CounterAction,
            _env: &(),
        ) -> SmallVec<[Effect<CounterAction>; 4]> {
            match action {
                CounterAction::Bump => {
                    state.value += 1;
                    smallvec![Effect::None]
                },
                CounterAction::BumpLater => smallvec![Effect::future(async { Some(CounterAction::Bump) })],
                CounterAction::Countdown(0) => {
                    state.value += 100;
                    SmallVec::new()
                },
                CounterAction::Countdown(n) => {
                    state.value += 1;
                    smallvec![Effect::future(async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        Some(CounterAction::Countdown(n - 1))
                    })]
                },
                CounterAction::Hang => smallvec![Effect::future(async {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    None
                })],
            }
        }
    }

    fn store() -> Store<Counter, CounterAction, (), CounterReducer> {
        Store::new(Counter::default(), CounterReducer, ())
    }

    #[tokio::test]
    async fn reducer_runs_before_send_returns() {
        let store = store();
        store.send(CounterAction::Bump).await.unwrap();
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn effect_result_is_fed_back() {
        let store = store();
        store.send(CounterAction::BumpLater).await.unwrap();
        store.settled().await;
        assert_eq!(store.state(|s| s.value).await, 1);
    }

    #[tokio::test]
    async fn settled_covers_the_whole_feedback_chain() {
        let store = store();
        store.send(CounterAction::Countdown(3)).await.unwrap();
        store.settled().await;

        assert_eq!(store.state(|s| s.value).await, 103);
        assert_eq!(store.pending_effects(), 0);
    }

    #[tokio::test]
    async fn shutdown_rejects_new_actions() {
        let store = store();
        store.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(
            store.send(CounterAction::Bump).await.unwrap_err(),
            RuntimeError::ShutdownInProgress
        );
    }

    #[tokio::test]
    async fn shutdown_reports_stuck_effects() {
        let store = store();
        store.send(CounterAction::Hang).await.unwrap();
        assert_eq!(
            store.shutdown(Duration::from_millis(20)).await.unwrap_err(),
            RuntimeError::ShutdownTimeout(1)
        );
    }
}
