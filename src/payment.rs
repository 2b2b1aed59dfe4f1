// Payment sessions and reconciliation with the external checkout provider

use async_trait::async_trait;
use bytes::Bytes;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::PaymentConfig;
use crate::error::{BookingError, BookingResult, ConflictError, Entity, InvalidRequest};
use crate::lifecycle::{BookingLifecycle, PaymentOutcome};
use crate::model::{
    Booking, BookingId, BookingStatus, Currency, PaymentStatus, PaymentTransaction, Principal,
};
use crate::store::{BookingStore, PaymentStore};

pub const CHECKOUT_COMPLETED_EVENT: &str = "checkout.session.completed";

#[derive(Error, Debug)]
pub enum PaymentProviderError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider rejected the request: {0}")]
    Rejected(String),

    #[error("Webhook signature is missing or invalid")]
    InvalidSignature,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub amount: Decimal,
    pub currency: Currency,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutStatus {
    Paid,
    Pending,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    CheckoutSessionCompleted { session_id: String },
    Other { event_type: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied,
    AlreadyApplied,
    /// The session was already closed with another result. Acknowledged so
    /// the provider stops retrying; left for manual follow-up.
    Unreconciled,
    Ignored,
}

#[async_trait]
pub trait PaymentProvider: Send + Sync + 'static {
    async fn create_checkout(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentProviderError>;

    async fn checkout_status(&self, session_id: &str) -> Result<CheckoutStatus, PaymentProviderError>;

    /// Verify the signature and decode the event.
    fn parse_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, PaymentProviderError>;
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: Option<RawEventData>,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: RawEventObject,
}

#[derive(Debug, Deserialize)]
struct RawEventObject {
    id: String,
}

/// Decode a `{"type": ..., "data": {"object": {"id": ...}}}` event body.
/// Providers call this once the signature has been checked.
pub fn parse_checkout_event(payload: &[u8]) -> Result<WebhookEvent, PaymentProviderError> {
    let raw: RawEvent = serde_json::from_slice(payload)
        .map_err(|e| PaymentProviderError::MalformedPayload(e.to_string()))?;

    if raw.event_type != CHECKOUT_COMPLETED_EVENT {
        return Ok(WebhookEvent::Other {
            event_type: raw.event_type,
        });
    }

    let data = raw.data.ok_or_else(|| {
        PaymentProviderError::MalformedPayload("completed event without session".to_string())
    })?;
    Ok(WebhookEvent::CheckoutSessionCompleted {
        session_id: data.object.id,
    })
}

/// Stands in when no checkout provider is configured; every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredPaymentProvider;

#[async_trait]
impl PaymentProvider for UnconfiguredPaymentProvider {
    async fn create_checkout(
        &self,
        _request: CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentProviderError> {
        Err(PaymentProviderError::Rejected(
            "payment provider not configured".to_string(),
        ))
    }

    async fn checkout_status(&self, _session_id: &str) -> Result<CheckoutStatus, PaymentProviderError> {
        Err(PaymentProviderError::Rejected(
            "payment provider not configured".to_string(),
        ))
    }

    fn parse_webhook(
        &self,
        _payload: &[u8],
        _signature: Option<&str>,
    ) -> Result<WebhookEvent, PaymentProviderError> {
        Err(PaymentProviderError::InvalidSignature)
    }
}

pub struct PaymentService {
    provider: Arc<dyn PaymentProvider>,
    bookings: Arc<dyn BookingStore>,
    payments: Arc<dyn PaymentStore>,
    lifecycle: Arc<BookingLifecycle>,
    clock: Arc<dyn Clock>,
    config: PaymentConfig,
}

impl PaymentService {
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        bookings: Arc<dyn BookingStore>,
        payments: Arc<dyn PaymentStore>,
        lifecycle: Arc<BookingLifecycle>,
        clock: Arc<dyn Clock>,
        config: PaymentConfig,
    ) -> Self {
        Self {
            provider,
            bookings,
            payments,
            lifecycle,
            clock,
            config,
        }
    }

    /// Open (or reuse) a checkout session for a confirmed booking. Bookings
    /// whose payment failed or was refunded get no new session.
    pub async fn create_payment_session(
        &self,
        principal: &Principal,
        booking_id: BookingId,
        success_url: &str,
        cancel_url: &str,
    ) -> BookingResult<PaymentTransaction> {
        let _guard = self.lifecycle.lock_booking(booking_id).await;
        let booking = self.load_booking(booking_id).await?;

        if booking.customer_id != principal.id {
            return Err(BookingError::Forbidden(format!(
                "booking {} belongs to another customer",
                booking_id
            )));
        }
        if booking.status != BookingStatus::Confirmed {
            return Err(InvalidRequest::BookingNotConfirmed(booking_id).into());
        }
        if booking.payment_status == PaymentStatus::Paid {
            return Err(ConflictError::PaymentAlreadyCompleted(booking_id).into());
        }
        if booking.payment_status.is_closed() {
            warn!(
                booking_id = %booking_id,
                payment_status = %booking.payment_status,
                "payment session refused"
            );
            return Err(InvalidRequest::IllegalPaymentTransition {
                from: booking.payment_status,
                to: PaymentStatus::Paid,
            }
            .into());
        }

        let existing = self.payments.transactions_for_booking(booking_id).await?;
        if existing.iter().any(|t| t.status == PaymentStatus::Paid) {
            return Err(ConflictError::PaymentAlreadyCompleted(booking_id).into());
        }
        if let Some(pending) = existing.into_iter().find(|t| t.status == PaymentStatus::Pending) {
            info!(
                booking_id = %booking_id,
                session_id = %pending.session_id,
                "reusing pending payment session"
            );
            return Ok(pending);
        }

        let metadata = HashMap::from([
            ("booking_id".to_string(), booking.id.to_string()),
            ("customer_id".to_string(), booking.customer_id.to_string()),
        ]);
        let request = CheckoutRequest {
            amount: booking.total_price,
            currency: booking.currency,
            success_url: success_url.to_string(),
            cancel_url: cancel_url.to_string(),
            metadata,
        };
        let session = self
            .call_provider("create_checkout", self.provider.create_checkout(request))
            .await?;

        let now = self.clock.now();
        let transaction = PaymentTransaction {
            id: Uuid::new_v4(),
            booking_id,
            session_id: session.session_id,
            amount: booking.total_price,
            currency: booking.currency,
            status: PaymentStatus::Pending,
            checkout_url: session.url,
            created_at: now,
            updated_at: now,
        };
        self.payments.insert_transaction(transaction.clone()).await?;

        info!(
            booking_id = %booking_id,
            session_id = %transaction.session_id,
            amount = %transaction.amount,
            currency = %transaction.currency,
            "payment session created"
        );
        Ok(transaction)
    }

    /// Ask the provider for the current state of a session and record it.
    pub async fn refresh_payment_status(
        &self,
        principal: &Principal,
        session_id: &str,
    ) -> BookingResult<PaymentTransaction> {
        let transaction = self.load_transaction(session_id).await?;
        self.lifecycle
            .get_booking(principal, transaction.booking_id)
            .await?;

        if transaction.status != PaymentStatus::Pending {
            return Ok(transaction);
        }

        let status = self
            .call_provider("checkout_status", self.provider.checkout_status(session_id))
            .await?;

        let outcome = match status {
            CheckoutStatus::Paid => PaymentStatus::Paid,
            CheckoutStatus::Expired => PaymentStatus::Failed,
            CheckoutStatus::Pending => return Ok(transaction),
        };
        Ok(self
            .lifecycle
            .record_payment_outcome(session_id, outcome)
            .await?
            .into_transaction())
    }

    /// Apply an inbound provider event. Errors are meant to be answered with
    /// a client error so the provider delivers the event again.
    pub async fn handle_webhook(
        &self,
        payload: Bytes,
        signature: Option<&str>,
    ) -> BookingResult<WebhookOutcome> {
        let event = self.provider.parse_webhook(&payload, signature).map_err(|e| {
            warn!(error = %e, "webhook rejected");
            BookingError::from(InvalidRequest::Webhook(e.to_string()))
        })?;

        let session_id = match event {
            WebhookEvent::CheckoutSessionCompleted { session_id } => session_id,
            WebhookEvent::Other { event_type } => {
                info!(%event_type, "webhook event ignored");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        let outcome = self
            .lifecycle
            .record_payment_outcome(&session_id, PaymentStatus::Paid)
            .await
            .map_err(|e| {
                if matches!(e, BookingError::NotFound(..)) {
                    warn!(%session_id, "webhook for unknown payment session");
                }
                e
            })?;

        Ok(match outcome {
            PaymentOutcome::Applied(_) => {
                info!(%session_id, "webhook applied");
                WebhookOutcome::Applied
            }
            PaymentOutcome::AlreadyRecorded(_) => {
                info!(%session_id, "webhook already applied");
                WebhookOutcome::AlreadyApplied
            }
            PaymentOutcome::Stale(_) => WebhookOutcome::Unreconciled,
        })
    }

    async fn call_provider<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = Result<T, PaymentProviderError>>,
    ) -> BookingResult<T> {
        match tokio::time::timeout(self.config.timeout(), call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                warn!(operation, error = %e, "payment provider call failed");
                Err(BookingError::UpstreamUnavailable(e.to_string()))
            }
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.config.timeout_ms,
                    "payment provider call timed out"
                );
                Err(BookingError::UpstreamUnavailable(format!(
                    "payment provider timed out after {}ms",
                    self.config.timeout_ms
                )))
            }
        }
    }

    async fn load_booking(&self, id: BookingId) -> BookingResult<Booking> {
        self.bookings
            .booking(id)
            .await?
            .ok_or_else(|| BookingError::not_found(Entity::Booking, id))
    }

    async fn load_transaction(&self, session_id: &str) -> BookingResult<PaymentTransaction> {
        self.payments
            .transaction_by_session(session_id)
            .await?
            .ok_or_else(|| BookingError::not_found(Entity::PaymentSession, session_id))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub const VALID_SIGNATURE: &str = "t=1,v1=test";

    /// Checkout provider double. Sessions start `pending`; tests move them
    /// with `set_status`.
    #[derive(Debug, Default)]
    pub struct MockPaymentProvider {
        pub statuses: Mutex<HashMap<String, CheckoutStatus>>,
        pub requests: Mutex<Vec<CheckoutRequest>>,
        pub created: AtomicUsize,
        pub fail: bool,
        pub delay: Option<Duration>,
    }

    impl MockPaymentProvider {
        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::default()
            }
        }

        pub fn set_status(&self, session_id: &str, status: CheckoutStatus) {
            self.statuses.lock().insert(session_id.to_string(), status);
        }

        pub fn created(&self) -> usize {
            self.created.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PaymentProvider for MockPaymentProvider {
        async fn create_checkout(
            &self,
            request: CheckoutRequest,
        ) -> Result<CheckoutSession, PaymentProviderError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(PaymentProviderError::Network("connection reset".to_string()));
            }

            let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
            let session_id = format!("cs_test_{}", n);
            self.statuses
                .lock()
                .insert(session_id.clone(), CheckoutStatus::Pending);
            self.requests.lock().push(request);
            Ok(CheckoutSession {
                url: format!("https://checkout.test/pay/{}", session_id),
                session_id,
            })
        }

        async fn checkout_status(
            &self,
            session_id: &str,
        ) -> Result<CheckoutStatus, PaymentProviderError> {
            if self.fail {
                return Err(PaymentProviderError::Network("connection reset".to_string()));
            }
            self.statuses
                .lock()
                .get(session_id)
                .copied()
                .ok_or_else(|| PaymentProviderError::Rejected(format!("no such session {}", session_id)))
        }

        fn parse_webhook(
            &self,
            payload: &[u8],
            signature: Option<&str>,
        ) -> Result<WebhookEvent, PaymentProviderError> {
            if signature != Some(VALID_SIGNATURE) {
                return Err(PaymentProviderError::InvalidSignature);
            }
            parse_checkout_event(payload)
        }
    }

    pub fn completed_event(session_id: &str) -> Bytes {
        Bytes::from(
            serde_json::json!({
                "type": CHECKOUT_COMPLETED_EVENT,
                "data": { "object": { "id": session_id } }
            })
            .to_string(),
        )
    }
}
