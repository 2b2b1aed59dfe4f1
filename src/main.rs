// Demo: seed an in-memory catalog, quote a three day booking, show its
// price in the viewer's currency.
//
//   cargo run -- [COUNTRY_CODE] [CONFIG_FILE]
//
// Set BOOKING_OFFLINE=1 to use a fixed rate table instead of the HTTP provider.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use conference_booking::model::{ApprovalStatus, BillingUnit, ExtraService, Hotel, Room};
use conference_booking::{
    display_currency_for_country, logging, BookingApi, BookingEngine, BookingRequest,
    BookingStatus, ContactInfo, Currency, EngineConfig, EngineDeps, FixedRateProvider,
    Granularity, HttpRateProvider, InMemoryStore, Principal, RateProvider, ServiceSelection,
    UnconfiguredPaymentProvider,
};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_tracing();

    let mut args = std::env::args().skip(1);
    let country = args.next();
    let config_path = args.next();
    let config = EngineConfig::load(config_path.as_deref()).context("loading configuration")?;

    let rate_provider: Arc<dyn RateProvider> = if std::env::var_os("BOOKING_OFFLINE").is_some() {
        Arc::new(
            FixedRateProvider::new()
                .with_rate(Currency::EUR, Currency::TRY, Decimal::new(3650, 2))
                .with_rate(Currency::EUR, Currency::USD, Decimal::new(108, 2))
                .with_rate(Currency::USD, Currency::TRY, Decimal::new(3380, 2))
                .with_rate(Currency::USD, Currency::EUR, Decimal::new(93, 2)),
        )
    } else {
        Arc::new(HttpRateProvider::new(&config.rate_provider).context("building rate provider")?)
    };

    let store = Arc::new(InMemoryStore::new());
    let manager = Principal::manager(Uuid::new_v4());
    let customer = Principal::customer(Uuid::new_v4());
    let (room_id, coffee_id) = seed_catalog(&store, &manager);

    let deps = EngineDeps::in_memory(store, rate_provider, Arc::new(UnconfiguredPaymentProvider));
    let engine = BookingEngine::new(config, deps).context("building engine")?;

    let start = Utc::now() + Duration::days(14);
    let end = start + Duration::days(3);
    let services = vec![ServiceSelection {
        service_id: coffee_id,
        quantity: 40,
    }];

    let quote = engine
        .price_booking(room_id, Granularity::Daily, start, end, &services)
        .await?;
    let display_currency = display_currency_for_country(country.as_deref());
    let display = engine
        .get_display_price(quote.total_price, quote.currency, display_currency)
        .await;

    info!(
        days = quote.total_days,
        room = %quote.room_price,
        services = %quote.services_price,
        total = %quote.total_price,
        currency = %quote.currency,
        "quote"
    );
    println!(
        "{} {} -> {} {} (rate {})",
        display.base_price,
        display.base_currency,
        display.display_price,
        display.display_currency,
        display
            .exchange_rate
            .map(|r| r.to_string())
            .unwrap_or_else(|| "-".to_string())
    );

    let booking = engine
        .create_booking(
            &customer,
            BookingRequest {
                room_id,
                start_date: start,
                end_date: end,
                granularity: Granularity::Daily,
                guest_count: 40,
                services,
                special_requests: Some("U-shape seating".to_string()),
                contact: ContactInfo {
                    person: "Demo Customer".to_string(),
                    phone: "+90 212 000 0000".to_string(),
                    email: "demo@example.com".to_string(),
                    company_name: Some("Demo Ltd".to_string()),
                },
            },
        )
        .await?;
    let confirmed = engine
        .transition_booking_status(&manager, booking.id, BookingStatus::Confirmed, None)
        .await?;

    println!(
        "booking {} {} / payment {}",
        confirmed.id, confirmed.status, confirmed.payment_status
    );
    Ok(())
}

fn seed_catalog(store: &InMemoryStore, manager: &Principal) -> (Uuid, Uuid) {
    let hotel_id = Uuid::new_v4();
    store.add_hotel(Hotel {
        id: hotel_id,
        manager_id: manager.id,
        name: "Pera Congress Hotel".to_string(),
        contact_email: Some("events@pera.example".to_string()),
        approval_status: ApprovalStatus::Approved,
    });

    let room_id = Uuid::new_v4();
    store.add_room(Room {
        id: room_id,
        hotel_id,
        name: "Grand Ballroom".to_string(),
        capacity: 120,
        price_per_day: Decimal::from(850),
        price_per_hour: Some(Decimal::from(140)),
        currency: Currency::EUR,
        approval_status: ApprovalStatus::Approved,
        is_available: true,
    });

    let coffee_id = Uuid::new_v4();
    store.add_service(ExtraService {
        id: coffee_id,
        hotel_id,
        name: "Coffee break".to_string(),
        price: Decimal::new(750, 2),
        currency: Currency::EUR,
        unit: BillingUnit::Person,
        category: "refreshment".to_string(),
        is_available: true,
    });

    (room_id, coffee_id)
}
