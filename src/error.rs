// Error taxonomy for the booking core

use chrono::{DateTime, Utc};
use std::fmt;
use thiserror::Error;

use crate::model::{BookingId, BookingStatus, Currency, PaymentStatus, RoomId, ServiceId};

pub type BookingResult<T> = Result<T, BookingError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Hotel,
    Room,
    ExtraService,
    Booking,
    PaymentSession,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Entity::Hotel => "hotel",
            Entity::Room => "room",
            Entity::ExtraService => "extra service",
            Entity::Booking => "booking",
            Entity::PaymentSession => "payment session",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("{0} {1} not found")]
    NotFound(Entity, String),

    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] InvalidRequest),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl BookingError {
    pub fn not_found(entity: Entity, id: impl ToString) -> Self {
        BookingError::NotFound(entity, id.to_string())
    }

    // Errors the caller caused and can fix; used to pick a client-error response
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            BookingError::UpstreamUnavailable(_) | BookingError::Storage(_)
        )
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum ConflictError {
    #[error("room {room_id} is already booked by {conflicting:?}")]
    RoomUnavailable {
        room_id: RoomId,
        conflicting: Vec<BookingId>,
    },

    #[error("booking {0} has already been paid")]
    PaymentAlreadyCompleted(BookingId),
}

#[derive(Error, Debug, PartialEq)]
pub enum InvalidRequest {
    #[error("room {0} has no hourly rate")]
    UnsupportedBillingMode(RoomId),

    #[error("interval {start} .. {end} is not positive")]
    NonPositiveInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("service priced in {got}, room priced in {expected}")]
    CurrencyMismatch { expected: Currency, got: Currency },

    #[error("guest count {requested} outside 1..={capacity}")]
    GuestCount { requested: u32, capacity: u32 },

    #[error("service {0} requested with zero quantity")]
    ZeroQuantity(ServiceId),

    #[error("booking status cannot move from {from} to {to}")]
    IllegalStatusTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("payment status cannot move from {from} to {to}")]
    IllegalPaymentTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },

    #[error("booking {0} must be confirmed before payment")]
    BookingNotConfirmed(BookingId),

    #[error("webhook rejected: {0}")]
    Webhook(String),
}
