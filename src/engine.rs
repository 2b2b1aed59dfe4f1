// The booking engine's own surface: every operation a transport layer
// (HTTP, gRPC, CLI) exposes goes through BookingApi.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::info;

use crate::booking::{BookingOrchestrator, BookingRequest};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, EngineConfig};
use crate::error::{BookingError, BookingResult, Entity};
use crate::lifecycle::BookingLifecycle;
use crate::model::{
    Availability, Booking, BookingId, BookingStatus, Currency, Granularity, PaymentStatus,
    PricingInfo, Principal, RoomId, ServiceSelection,
};
use crate::notify::{LogNotifier, Notifier};
use crate::payment::{PaymentProvider, PaymentService};
use crate::pricing::{BookingQuote, PricingCalculator};
use crate::rate_cache::ExchangeRateCache;
use crate::rate_provider::RateProvider;
use crate::store::{BookingStore, CatalogStore, InMemoryStore, PaymentStore};

#[async_trait]
pub trait BookingApi: Send + Sync + 'static {
    async fn check_availability(
        &self,
        room_id: RoomId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BookingResult<Availability>;

    async fn price_booking(
        &self,
        room_id: RoomId,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        services: &[ServiceSelection],
    ) -> BookingResult<BookingQuote>;

    async fn create_booking(
        &self,
        customer: &Principal,
        request: BookingRequest,
    ) -> BookingResult<Booking>;

    async fn transition_booking_status(
        &self,
        principal: &Principal,
        booking_id: BookingId,
        target: BookingStatus,
        notes: Option<String>,
    ) -> BookingResult<Booking>;

    async fn transition_payment_status(
        &self,
        principal: &Principal,
        booking_id: BookingId,
        target: PaymentStatus,
    ) -> BookingResult<Booking>;

    // Never fails; see PricingCalculator::display_price
    async fn get_display_price(
        &self,
        base_price: Decimal,
        base_currency: Currency,
        display_currency: Currency,
    ) -> PricingInfo;
}

/// Collaborators the engine is built from.
pub struct EngineDeps {
    pub catalog: Arc<dyn CatalogStore>,
    pub bookings: Arc<dyn BookingStore>,
    pub payments: Arc<dyn PaymentStore>,
    pub rate_provider: Arc<dyn RateProvider>,
    pub payment_provider: Arc<dyn PaymentProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

impl EngineDeps {
    /// All three stores backed by one in-memory store, notifications logged,
    /// system time.
    pub fn in_memory(
        store: Arc<InMemoryStore>,
        rate_provider: Arc<dyn RateProvider>,
        payment_provider: Arc<dyn PaymentProvider>,
    ) -> Self {
        Self {
            catalog: store.clone(),
            bookings: store.clone(),
            payments: store,
            rate_provider,
            payment_provider,
            notifier: Arc::new(LogNotifier),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

pub struct BookingEngine {
    catalog: Arc<dyn CatalogStore>,
    orchestrator: BookingOrchestrator,
    lifecycle: Arc<BookingLifecycle>,
    pricing: PricingCalculator,
    payments: PaymentService,
}

impl BookingEngine {
    pub fn new(config: EngineConfig, deps: EngineDeps) -> Result<Self, ConfigError> {
        config.validate()?;

        let rates = Arc::new(ExchangeRateCache::new(
            config.rate_cache.clone(),
            deps.rate_provider,
            deps.clock.clone(),
        ));
        let lifecycle = Arc::new(BookingLifecycle::new(
            deps.catalog.clone(),
            deps.bookings.clone(),
            deps.payments.clone(),
            deps.notifier.clone(),
            deps.clock.clone(),
        ));
        let orchestrator = BookingOrchestrator::new(
            deps.catalog.clone(),
            deps.bookings.clone(),
            deps.notifier,
            deps.clock.clone(),
        );
        let payments = PaymentService::new(
            deps.payment_provider,
            deps.bookings,
            deps.payments,
            lifecycle.clone(),
            deps.clock,
            config.payment.clone(),
        );

        info!(
            rate_ttl_hours = config.rate_cache.ttl_hours,
            payment_timeout_ms = config.payment.timeout_ms,
            "booking engine ready"
        );

        Ok(Self {
            catalog: deps.catalog,
            orchestrator,
            lifecycle,
            pricing: PricingCalculator::new(rates),
            payments,
        })
    }

    pub fn orchestrator(&self) -> &BookingOrchestrator {
        &self.orchestrator
    }

    pub fn lifecycle(&self) -> &BookingLifecycle {
        &self.lifecycle
    }

    pub fn pricing(&self) -> &PricingCalculator {
        &self.pricing
    }

    pub fn payments(&self) -> &PaymentService {
        &self.payments
    }
}

#[async_trait]
impl BookingApi for BookingEngine {
    async fn check_availability(
        &self,
        room_id: RoomId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BookingResult<Availability> {
        if self.catalog.room(room_id).await?.is_none() {
            return Err(BookingError::not_found(Entity::Room, room_id));
        }
        self.orchestrator.availability().check(room_id, start, end).await
    }

    async fn price_booking(
        &self,
        room_id: RoomId,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        services: &[ServiceSelection],
    ) -> BookingResult<BookingQuote> {
        self.orchestrator
            .quote(room_id, granularity, start, end, services)
            .await
    }

    async fn create_booking(
        &self,
        customer: &Principal,
        request: BookingRequest,
    ) -> BookingResult<Booking> {
        self.orchestrator.create_booking(customer, request).await
    }

    async fn transition_booking_status(
        &self,
        principal: &Principal,
        booking_id: BookingId,
        target: BookingStatus,
        notes: Option<String>,
    ) -> BookingResult<Booking> {
        self.lifecycle
            .transition_booking_status(principal, booking_id, target, notes)
            .await
    }

    async fn transition_payment_status(
        &self,
        principal: &Principal,
        booking_id: BookingId,
        target: PaymentStatus,
    ) -> BookingResult<Booking> {
        self.lifecycle
            .transition_payment_status(principal, booking_id, target)
            .await
    }

    async fn get_display_price(
        &self,
        base_price: Decimal,
        base_currency: Currency,
        display_currency: Currency,
    ) -> PricingInfo {
        self.pricing
            .display_price(base_price, base_currency, display_currency)
            .await
    }
}
