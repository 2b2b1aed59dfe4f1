// Conference room booking engine: availability, pricing, booking lifecycle
// and payment reconciliation

pub mod availability;
pub mod booking;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod locks;
pub mod logging;
pub mod model;
pub mod notify;
pub mod payment;
pub mod pricing;
pub mod rate_cache;
pub mod rate_provider;
pub mod store;

// Re-export key types for convenience
pub use booking::{BookingOrchestrator, BookingRequest};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig, PaymentConfig, RateCacheConfig, RateProviderConfig};
pub use engine::{BookingApi, BookingEngine, EngineDeps};
pub use error::{BookingError, BookingResult, ConflictError, Entity, InvalidRequest};
pub use lifecycle::{BookingLifecycle, PaymentOutcome};
pub use model::{
    Availability, Booking, BookingStatus, ContactInfo, Currency, Granularity, PaymentStatus,
    PaymentTransaction, PricingInfo, Principal, Role, ServiceSelection,
};
pub use notify::{LogNotifier, Notification, Notifier, Template};
pub use payment::{
    CheckoutRequest, CheckoutSession, CheckoutStatus, PaymentProvider, PaymentProviderError,
    PaymentService, UnconfiguredPaymentProvider, WebhookEvent, WebhookOutcome,
};
pub use pricing::{display_currency_for_country, BookingQuote, PricingCalculator};
pub use rate_cache::{CacheStatsReport, ExchangeRateCache, RateLookup};
pub use rate_provider::{FixedRateProvider, HttpRateProvider, RateProvider, RateProviderError};
pub use store::{BookingStore, CatalogStore, InMemoryStore, PaymentStore};
