#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use conference_booking::model::{ApprovalStatus, BillingUnit, ExtraService, Hotel, Room, RoomId};
use conference_booking::payment::parse_checkout_event;
use conference_booking::{
    BookingEngine, BookingRequest, CheckoutRequest, CheckoutSession, CheckoutStatus, ContactInfo,
    Currency, EngineConfig, EngineDeps, FixedRateProvider, Granularity, InMemoryStore,
    ManualClock, Notification, Notifier, PaymentProvider, PaymentProviderError, Principal,
    Template, WebhookEvent,
};

pub const SIGNATURE: &str = "whsec_test";

#[derive(Default)]
pub struct FakeCheckout {
    sessions: Mutex<HashMap<String, CheckoutStatus>>,
}

impl FakeCheckout {
    pub fn set_status(&self, session_id: &str, status: CheckoutStatus) {
        self.sessions.lock().insert(session_id.to_string(), status);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[async_trait]
impl PaymentProvider for FakeCheckout {
    async fn create_checkout(
        &self,
        _request: CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentProviderError> {
        let session_id = format!("cs_{}", Uuid::new_v4().simple());
        self.set_status(&session_id, CheckoutStatus::Pending);
        Ok(CheckoutSession {
            url: format!("https://pay.example/{}", session_id),
            session_id,
        })
    }

    async fn checkout_status(&self, session_id: &str) -> Result<CheckoutStatus, PaymentProviderError> {
        self.sessions
            .lock()
            .get(session_id)
            .copied()
            .ok_or_else(|| PaymentProviderError::Rejected(session_id.to_string()))
    }

    fn parse_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, PaymentProviderError> {
        match signature {
            Some(SIGNATURE) => parse_checkout_event(payload),
            _ => Err(PaymentProviderError::InvalidSignature),
        }
    }
}

#[derive(Default)]
pub struct Outbox {
    pub sent: Mutex<Vec<Notification>>,
}

impl Outbox {
    pub fn templates(&self) -> Vec<Template> {
        self.sent.lock().iter().map(|n| n.template).collect()
    }
}

#[async_trait]
impl Notifier for Outbox {
    async fn send(&self, notification: Notification) -> bool {
        self.sent.lock().push(notification);
        true
    }
}

pub struct Harness {
    pub engine: Arc<BookingEngine>,
    pub store: Arc<InMemoryStore>,
    pub checkout: Arc<FakeCheckout>,
    pub outbox: Arc<Outbox>,
    pub clock: Arc<ManualClock>,
    pub rates: Arc<FixedRateProvider>,
    pub manager: Principal,
    pub customer: Principal,
    pub admin: Principal,
    pub room_id: RoomId,
    pub other_room_id: RoomId,
    pub coffee_id: Uuid,
}

pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap()
}

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 4, d, 9, 0, 0).unwrap()
}

pub fn harness() -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let checkout = Arc::new(FakeCheckout::default());
    let outbox = Arc::new(Outbox::default());
    let clock = Arc::new(ManualClock::new(now()));
    let rates = Arc::new(
        FixedRateProvider::new().with_rate(Currency::EUR, Currency::TRY, Decimal::from(35)),
    );
    let manager = Principal::manager(Uuid::new_v4());

    let hotel_id = Uuid::new_v4();
    store.add_hotel(Hotel {
        id: hotel_id,
        manager_id: manager.id,
        name: "Marmara Business".to_string(),
        contact_email: Some("sales@marmara.example".to_string()),
        approval_status: ApprovalStatus::Approved,
    });

    let room = |name: &str| Room {
        id: Uuid::new_v4(),
        hotel_id,
        name: name.to_string(),
        capacity: 25,
        price_per_day: Decimal::from(100),
        price_per_hour: Some(Decimal::from(50)),
        currency: Currency::EUR,
        approval_status: ApprovalStatus::Approved,
        is_available: true,
    };
    let main_room = room("Topkapi");
    let other_room = room("Dolmabahce");
    let (room_id, other_room_id) = (main_room.id, other_room.id);
    store.add_room(main_room);
    store.add_room(other_room);

    let coffee_id = Uuid::new_v4();
    store.add_service(ExtraService {
        id: coffee_id,
        hotel_id,
        name: "Coffee break".to_string(),
        price: Decimal::new(850, 2),
        currency: Currency::EUR,
        unit: BillingUnit::Person,
        category: "refreshment".to_string(),
        is_available: true,
    });

    let deps = EngineDeps::in_memory(store.clone(), rates.clone(), checkout.clone())
        .with_notifier(outbox.clone())
        .with_clock(clock.clone());
    let engine = Arc::new(BookingEngine::new(EngineConfig::default(), deps).unwrap());

    Harness {
        engine,
        store,
        checkout,
        outbox,
        clock,
        rates,
        manager,
        customer: Principal::customer(Uuid::new_v4()),
        admin: Principal::admin(Uuid::new_v4()),
        room_id,
        other_room_id,
        coffee_id,
    }
}

pub fn request(room_id: RoomId, start: DateTime<Utc>, end: DateTime<Utc>) -> BookingRequest {
    BookingRequest {
        room_id,
        start_date: start,
        end_date: end,
        granularity: Granularity::Daily,
        guest_count: 10,
        services: vec![],
        special_requests: None,
        contact: ContactInfo {
            person: "Elif Sahin".to_string(),
            phone: "+90 533 444 5566".to_string(),
            email: "elif@example.com".to_string(),
            company_name: Some("Sahin Danismanlik".to_string()),
        },
    }
}

pub fn hours(start: DateTime<Utc>, h: i64) -> DateTime<Utc> {
    start + Duration::hours(h)
}

pub fn completed_event(session_id: &str) -> Bytes {
    Bytes::from(format!(
        r#"{{"type":"checkout.session.completed","data":{{"object":{{"id":"{}"}}}}}}"#,
        session_id
    ))
}
