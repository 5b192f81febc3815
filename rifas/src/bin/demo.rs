//! Raffle grid demo.
//!
//! Two visitors pick numbers from the same raffle through their own grids:
//! - Ana selects three numbers by hand and reserves them
//! - Luis tries one of Ana's numbers, picks another and fills the rest at random
//! - both confirm their purchases
//!
//! Runs against an in-memory store, or against a running server when
//! `RIFAS_API_BASE_URL` is set.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin demo
//! RIFAS_API_BASE_URL=http://localhost:8000 cargo run --bin demo
//! ```

use rifas::{Config, init_tracing};
use rifas_client::HttpTicketStore;
use rifas_core::environment::{Clock, SystemClock};
use rifas_core::memory::InMemoryTicketStore;
use rifas_core::store::TicketStore;
use rifas_core::ticket::TicketState;
use rifas_core::types::{
    ApprovalStatus, Money, NewParticipant, NewPaymentOption, NewRaffle, PaymentOptionId, ProductId, Raffle, RaffleStatus, TicketNumber,
};
use rifas_grid::{GridView, RaffleGrid};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing("warn,rifas=info");

    println!("\n🎟️  ============================================");
    println!("   Rifas - Number Grid Demo");
    println!("============================================\n");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn TicketStore> = match &config.client.base_url {
        Some(url) => {
            println!("🌐 Using remote API at {url}\n");
            let client = HttpTicketStore::new(url.clone());
            Arc::new(match &config.client.token {
                Some(token) => client.with_token(token.clone()),
                None => client,
            })
        }
        None => {
            println!("💾 Using in-memory store\n");
            Arc::new(InMemoryTicketStore::new(clock.clone()))
        }
    };
    let ttl = i64::from(config.reservations.ttl.minutes());

    // Step 1: raffle
    println!("1️⃣  Creating raffle 1-250...");
    let raffle = store
        .create_raffle(NewRaffle {
            titulo: "Moto 0km".to_string(),
            producto_id: ProductId::new(1),
            rango_min: TicketNumber::new(1),
            rango_max: TicketNumber::new(250),
            precio_numero: Money::from_cents(500),
            payment_options: vec![NewPaymentOption {
                payment_method_id: 1,
                instructions: Some("Transferencia a la cuenta 0102-0000".to_string()),
                min_amount: None,
                max_amount: None,
                sort_order: 0,
                is_active: true,
            }],
        })
        .await?;
    let raffle = store.set_raffle_status(raffle.id, RaffleStatus::Abierta).await?;
    let payment = store.list_payment_options(raffle.id).await?.first().map(|option| option.id);
    println!("   ✓ Raffle {} is {}\n", raffle.id, raffle.estado);

    // Step 2: visitors
    println!("2️⃣  Registering visitors...");
    let ana = store.register_participant(visitor(&raffle, "Ana", 3, payment)).await?;
    let luis = store.register_participant(visitor(&raffle, "Luis", 4, payment)).await?;
    println!("   ✓ Ana wants 3 numbers, Luis wants 4\n");

    let ana_grid = RaffleGrid::render(store.clone(), clock.clone(), raffle.id, ana.id, 3, ttl).await?;
    let luis_grid = RaffleGrid::render(store.clone(), clock.clone(), raffle.id, luis.id, 4, ttl).await?;
    summary("Ana", &ana_grid).await;

    // Step 3: manual selection
    println!("3️⃣  Ana selects 7, 8 and 9 and reserves them...");
    for n in [7, 8, 9] {
        ana_grid.toggle(TicketNumber::new(n)).await?;
    }
    ana_grid.reserve_selected().await?;
    summary("Ana", &ana_grid).await;

    // Step 4: competing selection
    println!("4️⃣  Luis tries 8, picks 10 and fills the rest at random...");
    let view = luis_grid.reload().await?;
    let eight = view.cells.iter().find(|c| c.numero == TicketNumber::new(8));
    if let Some(cell) = eight {
        println!("   • number 8 is {:?} for Luis (clickable: {})", cell.hint, cell.clickable);
    }
    luis_grid.toggle(TicketNumber::new(8)).await?;
    luis_grid.toggle(TicketNumber::new(10)).await?;
    luis_grid.reserve_selected().await?;
    luis_grid.reserve_random().await?;
    summary("Luis", &luis_grid).await;

    // Step 5: purchases
    println!("5️⃣  Confirming purchases...");
    ana_grid.confirm_selected().await?;
    summary("Ana", &ana_grid).await;
    luis_grid.confirm_all_active().await?;
    summary("Luis", &luis_grid).await;

    for (name, participant) in [("Ana", &ana), ("Luis", &luis)] {
        let numbers = store.tickets_of_participant(raffle.id, participant.id).await?;
        let listed: Vec<String> = numbers.iter().map(ToString::to_string).collect();
        println!("   🎫 {name} owns: {}", listed.join(", "));
        let approved = store.set_participant_status(participant.id, ApprovalStatus::Aprobado).await?;
        println!("   ✓ {name}'s payment is {}", approved.estado.as_str());
    }

    let tickets = store.list_tickets(raffle.id, None).await?;
    let sold = tickets.iter().filter(|t| t.state() == TicketState::Purchased).count();
    println!("\n✓ {sold} of {} numbers sold\n", tickets.len());

    ana_grid.close(Duration::from_secs(5)).await?;
    luis_grid.close(Duration::from_secs(5)).await?;
    Ok(())
}

fn visitor(raffle: &Raffle, nombre: &str, cantidad: u32, payment: Option<PaymentOptionId>) -> NewParticipant {
    NewParticipant {
        rifa_id: raffle.id,
        nombre: nombre.to_string(),
        apellido: "Demo".to_string(),
        numero_telefono: "0414-0000000".to_string(),
        numero_referencia: format!("DEMO-{nombre}"),
        email: None,
        cantidad_numeros: cantidad,
        comprobante: None,
        payment_option_id: payment,
    }
}

async fn summary(name: &str, grid: &RaffleGrid) {
    let view: GridView = grid.view().await;
    let selected: Vec<String> = grid.state().await.selected.iter().map(ToString::to_string).collect();
    println!(
        "   • {name}: selected [{}] {}/{} (remaining {}){}",
        selected.join(", "),
        view.selected,
        view.requested,
        view.remaining,
        if view.completed { " ✅ purchase complete" } else { "" }
    );
    for notice in &view.notices {
        println!("     ⚠️  {}", notice.message);
    }
    println!();
}
