//! In-memory [`TicketStore`].
//!
//! All raffles live behind one `tokio::sync::Mutex`, so every call is atomic
//! with respect to every other call. Used by the server when no database is
//! configured, by the demo and throughout the test suites.

use crate::environment::Clock;
use crate::ledger::{PurchaseOutcome, PurchaseSelection, RaffleBook, ReleaseOutcome, ReservationOutcome};
use crate::store::{StoreError, TicketStore, check_payment_option};
use crate::ticket::Ticket;
use crate::types::{
    ApprovalStatus, NewParticipant, NewPaymentOption, NewRaffle, NumberRange, Participant, ParticipantId,
    PaymentOption, PaymentOptionId, Raffle, RafflePatch, RaffleId, RaffleStatus, ReservationTtl, TicketNumber,
};
use async_trait::async_trait;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;

struct Inner {
    books: BTreeMap<RaffleId, RaffleBook>,
    participants: BTreeMap<ParticipantId, Participant>,
    payment_options: BTreeMap<PaymentOptionId, PaymentOption>,
    next_raffle: i64,
    next_participant: i64,
    next_payment_option: i64,
    rng: StdRng,
}

impl Inner {
    fn book(&self, id: RaffleId) -> Result<&RaffleBook, StoreError> {
        self.books
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(format!("raffle {id}")))
    }

    fn book_mut(&mut self, id: RaffleId) -> Result<&mut RaffleBook, StoreError> {
        self.books
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("raffle {id}")))
    }

    fn options_of(&self, raffle: RaffleId) -> Vec<PaymentOption> {
        let mut options: Vec<PaymentOption> = self
            .payment_options
            .values()
            .filter(|option| option.raffle_id == raffle)
            .cloned()
            .collect();
        options.sort_by_key(|option| (option.sort_order, option.id));
        options
    }

    fn replace_options(&mut self, raffle: RaffleId, options: Vec<NewPaymentOption>) {
        self.payment_options.retain(|_, option| option.raffle_id != raffle);
        for option in options {
            let id = PaymentOptionId::new(self.next_payment_option);
            self.next_payment_option += 1;
            self.payment_options.insert(id, option.into_option(id, raffle));
        }
    }
}

/// Ticket store held entirely in process memory
pub struct InMemoryTicketStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
}

impl InMemoryTicketStore {
    /// Creates an empty store
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_rng(clock, StdRng::from_entropy())
    }

    /// Creates an empty store whose random picks are reproducible
    #[must_use]
    pub fn with_seed(clock: Arc<dyn Clock>, seed: u64) -> Self {
        Self::with_rng(clock, StdRng::seed_from_u64(seed))
    }

    fn with_rng(clock: Arc<dyn Clock>, rng: StdRng) -> Self {
        Self {
            inner: Mutex::new(Inner {
                books: BTreeMap::new(),
                participants: BTreeMap::new(),
                payment_options: BTreeMap::new(),
                next_raffle: 1,
                next_participant: 1,
                next_payment_option: 1,
                rng,
            }),
            clock,
        }
    }

    /// Replaces the stored tickets of a raffle
    ///
    /// Used to load records that came from elsewhere (legacy imports, fixtures).
    /// Numbers outside the raffle range are ignored.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] for an unknown raffle.
    pub async fn import_tickets(
        &self,
        raffle: RaffleId,
        tickets: impl IntoIterator<Item = Ticket> + Send,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        let book = inner.book_mut(raffle)?;
        let meta = book.raffle().clone();
        let mut merged: BTreeMap<TicketNumber, Ticket> =
            book.tickets(None).into_iter().map(|t| (t.numero, t)).collect();
        for ticket in tickets {
            if meta.contains(ticket.numero) {
                merged.insert(ticket.numero, ticket);
            }
        }
        *book = RaffleBook::from_parts(meta, merged.into_values());
        Ok(())
    }
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    #[tracing::instrument(skip(self, raffle), fields(titulo = %raffle.titulo))]
    async fn create_raffle(&self, raffle: NewRaffle) -> Result<Raffle, StoreError> {
        raffle.validate().map_err(StoreError::Validation)?;

        let mut inner = self.inner.lock().await;
        let id = RaffleId::new(inner.next_raffle);
        inner.next_raffle += 1;

        let created = Raffle {
            id,
            titulo: raffle.titulo.trim().to_string(),
            producto_id: raffle.producto_id,
            rango_min: raffle.rango_min,
            rango_max: raffle.rango_max,
            precio_numero: raffle.precio_numero,
            estado: RaffleStatus::Creada,
        };
        inner.books.insert(id, RaffleBook::seeded(created.clone()));
        inner.replace_options(id, raffle.payment_options);

        tracing::info!(raffle = %id, numbers = created.total_numbers(), "Raffle created");
        Ok(created)
    }

    async fn list_raffles(&self, status: Option<RaffleStatus>) -> Result<Vec<Raffle>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .books
            .values()
            .map(RaffleBook::raffle)
            .filter(|r| status.is_none_or(|s| r.estado == s))
            .cloned()
            .collect())
    }

    async fn get_raffle(&self, id: RaffleId) -> Result<Raffle, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.book(id)?.raffle().clone())
    }

    #[tracing::instrument(skip(self, patch))]
    async fn update_raffle(&self, id: RaffleId, patch: RafflePatch) -> Result<Raffle, StoreError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        let book = inner.book_mut(id)?;
        let next = patch.apply(book.raffle()).map_err(StoreError::Validation)?;
        book.revise(next, now)?;
        let updated = book.raffle().clone();
        if let Some(options) = patch.payment_options {
            inner.replace_options(id, options);
        }

        tracing::info!(estado = %updated.estado, numbers = updated.total_numbers(), "Raffle updated");
        Ok(updated)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_raffle(&self, id: RaffleId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner
            .books
            .remove(&id)
            .ok_or_else(|| StoreError::NotFound(format!("raffle {id}")))?;
        inner.participants.retain(|_, participant| participant.rifa_id != id);
        inner.payment_options.retain(|_, option| option.raffle_id != id);

        tracing::info!("Raffle deleted");
        Ok(())
    }

    async fn list_payment_options(&self, raffle: RaffleId) -> Result<Vec<PaymentOption>, StoreError> {
        let inner = self.inner.lock().await;
        inner.book(raffle)?;
        Ok(inner.options_of(raffle))
    }

    async fn list_tickets(&self, raffle: RaffleId, range: Option<NumberRange>) -> Result<Vec<Ticket>, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.book(raffle)?.tickets(range))
    }

    #[tracing::instrument(skip(self, numbers), fields(requested = numbers.len()))]
    async fn reserve_explicit(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
        numbers: &BTreeSet<TicketNumber>,
        ttl: ReservationTtl,
    ) -> Result<ReservationOutcome, StoreError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        let outcome = inner.book_mut(raffle)?.reserve_explicit(participant, numbers, ttl, now)?;

        tracing::info!(
            reserved = outcome.reserved.len(),
            already_mine = outcome.already_mine.len(),
            unavailable = outcome.unavailable.len(),
            "Explicit reservation applied"
        );
        Ok(outcome)
    }

    #[tracing::instrument(skip(self))]
    async fn reserve_random(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
        count: u32,
        ttl: ReservationTtl,
    ) -> Result<ReservationOutcome, StoreError> {
        let now = self.clock.now();
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let book = inner
            .books
            .get_mut(&raffle)
            .ok_or_else(|| StoreError::NotFound(format!("raffle {raffle}")))?;
        let outcome = book.reserve_random(participant, count, ttl, now, &mut inner.rng)?;

        tracing::info!(reserved = outcome.reserved.len(), "Random reservation applied");
        Ok(outcome)
    }

    #[tracing::instrument(skip(self, numbers), fields(requested = numbers.len()))]
    async fn release_reservations(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
        numbers: &BTreeSet<TicketNumber>,
    ) -> Result<ReleaseOutcome, StoreError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        let outcome = inner.book_mut(raffle)?.release(participant, numbers, now);

        tracing::info!(released = outcome.released.len(), "Reservations released");
        Ok(outcome)
    }

    #[tracing::instrument(skip(self, selection))]
    async fn confirm_purchase(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
        selection: &PurchaseSelection,
    ) -> Result<PurchaseOutcome, StoreError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        let outcome = inner.book_mut(raffle)?.confirm(participant, selection, now)?;

        tracing::info!(
            purchased = outcome.purchased.len(),
            invalid = outcome.invalid.len(),
            "Purchase confirmed"
        );
        Ok(outcome)
    }

    #[tracing::instrument(skip(self))]
    async fn release_expired(&self, raffle: RaffleId) -> Result<u32, StoreError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        let released = inner.book_mut(raffle)?.release_expired(now);

        if released > 0 {
            tracing::info!(released, "Expired reservations released");
        }
        Ok(released)
    }

    async fn tickets_of_participant(
        &self,
        raffle: RaffleId,
        participant: ParticipantId,
    ) -> Result<Vec<TicketNumber>, StoreError> {
        let now = self.clock.now();
        let inner = self.inner.lock().await;
        Ok(inner.book(raffle)?.numbers_of(participant, now))
    }

    #[tracing::instrument(skip(self, participant), fields(raffle = %participant.rifa_id))]
    async fn register_participant(&self, participant: NewParticipant) -> Result<Participant, StoreError> {
        let participant = participant.normalized().map_err(StoreError::Validation)?;

        let mut inner = self.inner.lock().await;
        inner.book(participant.rifa_id)?;
        check_payment_option(&participant, &inner.options_of(participant.rifa_id))?;

        let id = ParticipantId::new(inner.next_participant);
        inner.next_participant += 1;
        let registered = participant.into_participant(id);
        inner.participants.insert(id, registered.clone());

        tracing::info!(participant = %id, "Participant registered");
        Ok(registered)
    }

    async fn get_participant(&self, id: ParticipantId) -> Result<Participant, StoreError> {
        let inner = self.inner.lock().await;
        inner
            .participants
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("participant {id}")))
    }

    #[tracing::instrument(skip(self))]
    async fn set_participant_status(
        &self,
        id: ParticipantId,
        status: ApprovalStatus,
    ) -> Result<Participant, StoreError> {
        let mut inner = self.inner.lock().await;
        let participant = inner
            .participants
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("participant {id}")))?;
        participant.estado = status;

        tracing::info!(estado = status.as_str(), "Participant reviewed");
        Ok(participant.clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ticket::TicketStatus;
    use crate::types::{Money, ProductId};
    use chrono::{DateTime, Utc};

    struct Fixed(DateTime<Utc>);

    impl Clock for Fixed {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn store() -> InMemoryTicketStore {
        let now = DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        InMemoryTicketStore::with_seed(Arc::new(Fixed(now)), 1)
    }

    fn new_raffle(min: i32, max: i32) -> NewRaffle {
        NewRaffle {
            titulo: "  Televisor  ".to_string(),
            producto_id: ProductId::new(9),
            rango_min: TicketNumber::new(min),
            rango_max: TicketNumber::new(max),
            precio_numero: Money::from_cents(1000),
            payment_options: Vec::new(),
        }
    }

    fn transfer(sort_order: i32, is_active: bool) -> NewPaymentOption {
        NewPaymentOption {
            payment_method_id: 7,
            instructions: Some("Banco de Venezuela".to_string()),
            min_amount: None,
            max_amount: None,
            sort_order,
            is_active,
        }
    }

    fn visitor(raffle: RaffleId) -> NewParticipant {
        NewParticipant {
            rifa_id: raffle,
            nombre: "Luis".to_string(),
            apellido: "Mora".to_string(),
            numero_telefono: "0412-5550000".to_string(),
            numero_referencia: "REF-9".to_string(),
            email: None,
            cantidad_numeros: 1,
            comprobante: None,
            payment_option_id: None,
        }
    }

    fn nums(values: &[i32]) -> BTreeSet<TicketNumber> {
        values.iter().copied().map(TicketNumber::new).collect()
    }

    #[tokio::test]
    async fn created_raffle_starts_closed_to_sales() {
        let store = store();
        let raffle = store.create_raffle(new_raffle(1, 50)).await.unwrap();

        assert_eq!(raffle.estado, RaffleStatus::Creada);
        assert_eq!(raffle.titulo, "Televisor");
        assert_eq!(store.list_tickets(raffle.id, None).await.unwrap().len(), 50);

        let err = store
            .reserve_explicit(raffle.id, ParticipantId::new(1), &nums(&[1]), ReservationTtl::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::RaffleNotOpen { .. }));
    }

    #[tokio::test]
    async fn listing_honours_window_and_status_filter() {
        let store = store();
        let open = store.create_raffle(new_raffle(1, 300)).await.unwrap();
        store.create_raffle(new_raffle(1, 10)).await.unwrap();
        store.set_raffle_status(open.id, RaffleStatus::Abierta).await.unwrap();

        let window = NumberRange::new(TicketNumber::new(101), TicketNumber::new(200));
        let tickets = store.list_tickets(open.id, Some(window)).await.unwrap();
        assert_eq!(tickets.len(), 100);
        assert_eq!(tickets[0].numero, TicketNumber::new(101));

        let abiertas = store.list_raffles(Some(RaffleStatus::Abierta)).await.unwrap();
        assert_eq!(abiertas.len(), 1);
        assert_eq!(store.list_raffles(None).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn participant_tickets_include_purchases_and_holds() {
        let store = store();
        let raffle = store.create_raffle(new_raffle(1, 20)).await.unwrap();
        store.set_raffle_status(raffle.id, RaffleStatus::Abierta).await.unwrap();
        let me = ParticipantId::new(4);

        store
            .reserve_explicit(raffle.id, me, &nums(&[1, 2, 3]), ReservationTtl::default())
            .await
            .unwrap();
        store
            .confirm_purchase(raffle.id, me, &PurchaseSelection::from_numbers([TicketNumber::new(1)]))
            .await
            .unwrap();

        let mine = store.tickets_of_participant(raffle.id, me).await.unwrap();
        assert_eq!(mine, vec![TicketNumber::new(1), TicketNumber::new(2), TicketNumber::new(3)]);
    }

    #[tokio::test]
    async fn import_keeps_reservations_without_expiry() {
        let store = store();
        let raffle = store.create_raffle(new_raffle(1, 5)).await.unwrap();
        let holder = ParticipantId::new(3);
        store
            .import_tickets(
                raffle.id,
                [Ticket {
                    numero: TicketNumber::new(2),
                    status: TicketStatus::Reserved { holder, until: None },
                    updated_at: None,
                }],
            )
            .await
            .unwrap();

        assert_eq!(store.release_expired(raffle.id).await.unwrap(), 0);
        let tickets = store.list_tickets(raffle.id, None).await.unwrap();
        assert_eq!(tickets[1].holder(), Some(holder));
    }

    #[tokio::test]
    async fn registration_validates_and_requires_raffle() {
        let store = store();
        let raffle = store.create_raffle(new_raffle(1, 5)).await.unwrap();
        let mut input = NewParticipant {
            rifa_id: raffle.id,
            nombre: " Ana ".to_string(),
            apellido: "Pérez".to_string(),
            numero_telefono: "0414-5551234".to_string(),
            numero_referencia: "REF-1".to_string(),
            email: Some(String::new()),
            cantidad_numeros: 2,
            comprobante: None,
            payment_option_id: None,
        };

        let registered = store.register_participant(input.clone()).await.unwrap();
        assert_eq!(registered.nombre, "Ana");
        assert_eq!(registered.email, None);
        assert_eq!(store.get_participant(registered.id).await.unwrap(), registered);

        input.rifa_id = RaffleId::new(99);
        assert!(matches!(
            store.register_participant(input).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn oversized_range_is_rejected_before_seeding() {
        let store = store();
        let err = store.create_raffle(new_raffle(i32::MIN, i32::MAX)).await.unwrap_err();

        assert!(matches!(err, StoreError::Validation(_)));
        assert!(store.list_raffles(None).await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_visitors_never_share_a_number() {
        let store = Arc::new(store());
        let raffle = store.create_raffle(new_raffle(1, 60)).await.unwrap();
        store.set_raffle_status(raffle.id, RaffleStatus::Abierta).await.unwrap();

        let mut handles = Vec::new();
        for n in 1..=16_i64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let me = ParticipantId::new(n);
                let ttl = ReservationTtl::default();
                let outcome = if n % 2 == 0 {
                    let wanted = nums(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
                    store.reserve_explicit(raffle.id, me, &wanted, ttl).await
                } else {
                    store.reserve_random(raffle.id, me, 6, ttl).await
                };
                (me, outcome.unwrap())
            }));
        }

        let mut won: BTreeMap<TicketNumber, ParticipantId> = BTreeMap::new();
        for handle in handles {
            let (me, outcome) = handle.await.unwrap();
            assert!(outcome.already_mine.is_empty());
            if me.value() % 2 == 1 {
                assert_eq!(outcome.reserved.len(), 6);
            }
            for numero in outcome.reserved {
                assert_eq!(won.insert(numero, me), None, "{numero} was won twice");
            }
        }

        let tickets = store.list_tickets(raffle.id, None).await.unwrap();
        let held: BTreeMap<TicketNumber, ParticipantId> = tickets
            .iter()
            .filter_map(|ticket| ticket.holder().map(|holder| (ticket.numero, holder)))
            .collect();
        assert_eq!(held, won);
        assert!((1..=10).all(|n| won.contains_key(&TicketNumber::new(n))));
    }

    #[tokio::test]
    async fn update_moves_range_only_while_untouched() {
        let store = store();
        let raffle = store.create_raffle(new_raffle(1, 10)).await.unwrap();

        let patch = RafflePatch {
            rango_max: Some(TicketNumber::new(30)),
            precio_numero: Some(Money::from_cents(250)),
            ..RafflePatch::default()
        };
        let updated = store.update_raffle(raffle.id, patch).await.unwrap();
        assert_eq!(updated.precio_numero, Money::from_cents(250));
        assert_eq!(store.list_tickets(raffle.id, None).await.unwrap().len(), 30);

        store.set_raffle_status(raffle.id, RaffleStatus::Abierta).await.unwrap();
        store
            .reserve_explicit(raffle.id, ParticipantId::new(1), &nums(&[3]), ReservationTtl::default())
            .await
            .unwrap();
        let narrow = RafflePatch {
            rango_max: Some(TicketNumber::new(5)),
            ..RafflePatch::default()
        };
        assert!(matches!(
            store.update_raffle(raffle.id, narrow).await,
            Err(StoreError::Conflict(_))
        ));
        let blank = RafflePatch {
            titulo: Some(" ".to_string()),
            ..RafflePatch::default()
        };
        assert!(matches!(
            store.update_raffle(raffle.id, blank).await,
            Err(StoreError::Validation(_))
        ));
        assert_eq!(store.get_raffle(raffle.id).await.unwrap().rango_max, TicketNumber::new(30));
    }

    #[tokio::test]
    async fn payment_options_are_ordered_and_checked_at_registration() {
        let store = store();
        let mut input = new_raffle(1, 10);
        input.payment_options = vec![transfer(2, true), transfer(1, false)];
        let raffle = store.create_raffle(input).await.unwrap();

        let options = store.list_payment_options(raffle.id).await.unwrap();
        assert_eq!(options.iter().map(|o| o.sort_order).collect::<Vec<_>>(), vec![1, 2]);
        let (inactive, active) = (options[0].id, options[1].id);

        let mut chosen = visitor(raffle.id);
        chosen.payment_option_id = Some(active);
        assert_eq!(
            store.register_participant(chosen.clone()).await.unwrap().payment_option_id,
            Some(active)
        );

        chosen.payment_option_id = Some(inactive);
        assert!(matches!(
            store.register_participant(chosen.clone()).await,
            Err(StoreError::Validation(_))
        ));
        chosen.payment_option_id = Some(PaymentOptionId::new(404));
        assert!(matches!(
            store.register_participant(chosen).await,
            Err(StoreError::Validation(_))
        ));

        let replaced = RafflePatch {
            payment_options: Some(vec![transfer(5, true)]),
            ..RafflePatch::default()
        };
        store.update_raffle(raffle.id, replaced).await.unwrap();
        let options = store.list_payment_options(raffle.id).await.unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].sort_order, 5);
    }

    #[tokio::test]
    async fn deleting_a_raffle_drops_everything_it_owns() {
        let store = store();
        let mut input = new_raffle(1, 10);
        input.payment_options = vec![transfer(0, true)];
        let raffle = store.create_raffle(input).await.unwrap();
        let kept = store.create_raffle(new_raffle(1, 5)).await.unwrap();
        let gone = store.register_participant(visitor(raffle.id)).await.unwrap();
        let stays = store.register_participant(visitor(kept.id)).await.unwrap();

        store.delete_raffle(raffle.id).await.unwrap();

        assert!(matches!(store.get_raffle(raffle.id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.get_participant(gone.id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            store.list_payment_options(raffle.id).await,
            Err(StoreError::NotFound(_))
        ));
        assert!(store.get_participant(stays.id).await.is_ok());
        assert!(matches!(store.delete_raffle(raffle.id).await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn participant_review_updates_approval() {
        let store = store();
        let raffle = store.create_raffle(new_raffle(1, 5)).await.unwrap();
        let registered = store.register_participant(visitor(raffle.id)).await.unwrap();
        assert_eq!(registered.estado, ApprovalStatus::Pendiente);

        let approved = store
            .set_participant_status(registered.id, ApprovalStatus::Aprobado)
            .await
            .unwrap();
        assert_eq!(approved.estado, ApprovalStatus::Aprobado);
        assert_eq!(store.get_participant(registered.id).await.unwrap(), approved);
        assert!(matches!(
            store
                .set_participant_status(ParticipantId::new(99), ApprovalStatus::Rechazado)
                .await,
            Err(StoreError::NotFound(_))
        ));
    }
}
