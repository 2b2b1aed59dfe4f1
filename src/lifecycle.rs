//! Booking lifecycle.
//!
//! Two independent state machines:
//! - status: `pending -> {confirmed, cancelled}`, `confirmed -> {cancelled, completed}`
//! - payment: `pending -> {paid, failed}`, `paid -> refunded`
//!
//! Who may ask for which transition:
//! - customers may only cancel their own bookings
//! - hotel managers may move bookings on rooms of hotels they manage
//! - admins may move any booking
//! - `paid` is only ever set by payment reconciliation
//!
//! Payment changes are applied to the booking and its payment transactions
//! together, under the booking's lock, and are validated before anything is
//! written. No transition touches the stored prices.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::availability::overlaps;
use crate::clock::Clock;
use crate::error::{BookingError, BookingResult, Entity, InvalidRequest};
use crate::locks::{KeyedGuard, KeyedLocks};
use crate::model::{
    Booking, BookingId, BookingStatus, PaymentStatus, PaymentTransaction, Principal, Role, RoomId,
};
use crate::notify::{deliver, Notification, Notifier, Template};
use crate::store::{BookingStore, CatalogStore, PaymentStore};

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Cancelled) | (Confirmed, Completed)
        )
    }
}

impl PaymentStatus {
    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Paid) | (Pending, Failed) | (Paid, Refunded)
        )
    }

    pub fn is_closed(self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Refunded)
    }

    // Transaction status that follows the booking into `self`
    fn carried_from(self) -> Option<PaymentStatus> {
        match self {
            PaymentStatus::Refunded => Some(PaymentStatus::Paid),
            PaymentStatus::Failed => Some(PaymentStatus::Pending),
            PaymentStatus::Pending | PaymentStatus::Paid => None,
        }
    }
}

/// Result of recording a provider-reported outcome for one session.
#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    /// Transaction and booking moved to the outcome.
    Applied(PaymentTransaction),
    /// The session already carries this outcome (or a later one, such as a
    /// refund after payment). Nothing written.
    AlreadyRecorded(PaymentTransaction),
    /// The session was closed (`failed`) before the outcome arrived, or the
    /// outcome contradicts what was recorded. Nothing written.
    Stale(PaymentTransaction),
}

impl PaymentOutcome {
    pub fn transaction(&self) -> &PaymentTransaction {
        match self {
            PaymentOutcome::Applied(t)
            | PaymentOutcome::AlreadyRecorded(t)
            | PaymentOutcome::Stale(t) => t,
        }
    }

    pub fn into_transaction(self) -> PaymentTransaction {
        match self {
            PaymentOutcome::Applied(t)
            | PaymentOutcome::AlreadyRecorded(t)
            | PaymentOutcome::Stale(t) => t,
        }
    }
}

pub struct BookingLifecycle {
    catalog: Arc<dyn CatalogStore>,
    bookings: Arc<dyn BookingStore>,
    payments: Arc<dyn PaymentStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks<BookingId>,
}

impl BookingLifecycle {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        bookings: Arc<dyn BookingStore>,
        payments: Arc<dyn PaymentStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            catalog,
            bookings,
            payments,
            notifier,
            clock,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn get_booking(&self, principal: &Principal, id: BookingId) -> BookingResult<Booking> {
        let booking = self.load(id).await?;
        self.authorize_view(principal, &booking).await?;
        Ok(booking)
    }

    pub async fn list_bookings(&self, principal: &Principal) -> BookingResult<Vec<Booking>> {
        match principal.role {
            Role::Customer => self.bookings.bookings_for_customer(principal.id).await,
            Role::HotelManager => {
                let hotel_ids: Vec<_> = self
                    .catalog
                    .hotels_managed_by(principal.id)
                    .await?
                    .into_iter()
                    .map(|h| h.id)
                    .collect();
                let room_ids: Vec<_> = self
                    .catalog
                    .rooms_in_hotels(&hotel_ids)
                    .await?
                    .into_iter()
                    .map(|r| r.id)
                    .collect();
                self.bookings.bookings_for_rooms(&room_ids).await
            }
            Role::Admin => self.bookings.all_bookings().await,
        }
    }

    /// Non-cancelled bookings of a room, optionally only those touching
    /// `window`. Not available to customers.
    pub async fn room_schedule(
        &self,
        principal: &Principal,
        room_id: RoomId,
        window: Option<(DateTime<Utc>, DateTime<Utc>)>,
    ) -> BookingResult<Vec<Booking>> {
        if self.catalog.room(room_id).await?.is_none() {
            return Err(BookingError::not_found(Entity::Room, room_id));
        }

        match principal.role {
            Role::Customer => {
                return Err(BookingError::Forbidden(
                    "customers cannot view room schedules".to_string(),
                ))
            }
            Role::HotelManager if !self.manages_room(principal, room_id).await? => {
                return Err(BookingError::Forbidden(format!(
                    "room {} is not in a hotel you manage",
                    room_id
                )))
            }
            _ => {}
        }

        Ok(self
            .bookings
            .bookings_for_room(room_id)
            .await?
            .into_iter()
            .filter(|b| b.status != BookingStatus::Cancelled)
            .filter(|b| match window {
                Some((start, end)) => overlaps(b.start_date, b.end_date, start, end),
                None => true,
            })
            .collect())
    }

    pub async fn transition_booking_status(
        &self,
        principal: &Principal,
        id: BookingId,
        target: BookingStatus,
        notes: Option<String>,
    ) -> BookingResult<Booking> {
        let _guard = self.locks.lock(&id).await;
        let booking = self.load(id).await?;

        match principal.role {
            Role::Customer => {
                if booking.customer_id != principal.id || target != BookingStatus::Cancelled {
                    return Err(BookingError::Forbidden(
                        "customers can only cancel their own bookings".to_string(),
                    ));
                }
            }
            Role::HotelManager => {
                if !self.manages_room(principal, booking.room_id).await? {
                    return Err(BookingError::Forbidden(format!(
                        "booking {} is not for a hotel you manage",
                        id
                    )));
                }
            }
            Role::Admin => {}
        }

        if !booking.status.can_transition_to(target) {
            return Err(InvalidRequest::IllegalStatusTransition {
                from: booking.status,
                to: target,
            }
            .into());
        }

        let updated = self
            .bookings
            .update_booking_status(id, target, notes, self.clock.now())
            .await?;

        info!(
            booking_id = %id,
            from = %booking.status,
            to = %target,
            actor = %principal.id,
            "booking status changed"
        );

        if matches!(target, BookingStatus::Confirmed | BookingStatus::Cancelled) {
            deliver(
                self.notifier.as_ref(),
                Notification {
                    template: Template::BookingStatusChanged,
                    recipient: updated.contact.email.clone(),
                    data: json!({
                        "booking_id": updated.id,
                        "status": updated.status,
                        "notes": updated.notes,
                    }),
                },
            )
            .await;
        }

        Ok(updated)
    }

    /// Manual payment corrections (refunds, marking failures). Admin only;
    /// `paid` can only come from the payment provider.
    pub async fn transition_payment_status(
        &self,
        principal: &Principal,
        id: BookingId,
        target: PaymentStatus,
    ) -> BookingResult<Booking> {
        if principal.role != Role::Admin {
            return Err(BookingError::Forbidden(
                "only admins can change payment status".to_string(),
            ));
        }
        if target == PaymentStatus::Paid {
            return Err(BookingError::Forbidden(
                "payment can only be marked paid by the payment provider".to_string(),
            ));
        }

        let _guard = self.locks.lock(&id).await;
        let booking = self.load(id).await?;
        Self::check_payment_transition(&booking, target)?;

        // transactions first: provider events are reconciled against them
        let now = self.clock.now();
        if let Some(carried) = target.carried_from() {
            for transaction in self.payments.transactions_for_booking(id).await? {
                if transaction.status == carried {
                    self.payments
                        .update_transaction_status(&transaction.session_id, target, now)
                        .await?;
                }
            }
        }

        let updated = self.bookings.update_payment_status(id, target, now).await?;
        info!(
            booking_id = %id,
            from = %booking.payment_status,
            to = %target,
            actor = %principal.id,
            "payment status changed"
        );
        Ok(updated)
    }

    /// Outcome reported by the payment provider for one checkout session
    /// (webhook or status poll). Repeating an outcome is a no-op.
    pub(crate) async fn record_payment_outcome(
        &self,
        session_id: &str,
        outcome: PaymentStatus,
    ) -> BookingResult<PaymentOutcome> {
        let booking_id = self.load_transaction(session_id).await?.booking_id;

        let _guard = self.locks.lock(&booking_id).await;
        let transaction = self.load_transaction(session_id).await?;
        let booking = self.load(booking_id).await?;

        if transaction.status != PaymentStatus::Pending {
            let already = transaction.status == outcome
                || (outcome == PaymentStatus::Paid && transaction.status == PaymentStatus::Refunded);
            if already {
                return Ok(PaymentOutcome::AlreadyRecorded(transaction));
            }
            warn!(
                %session_id,
                booking_id = %booking_id,
                recorded = %transaction.status,
                reported = %outcome,
                "provider outcome for a settled session, needs manual follow-up"
            );
            return Ok(PaymentOutcome::Stale(transaction));
        }

        if booking.payment_status != outcome {
            Self::check_payment_transition(&booking, outcome)?;
        }

        let now = self.clock.now();
        let transaction = self
            .payments
            .update_transaction_status(session_id, outcome, now)
            .await?;
        if booking.payment_status != outcome {
            self.bookings
                .update_payment_status(booking_id, outcome, now)
                .await?;
        }

        info!(
            %session_id,
            booking_id = %booking_id,
            from = %booking.payment_status,
            to = %outcome,
            "payment outcome recorded"
        );
        Ok(PaymentOutcome::Applied(transaction))
    }

    /// Exclusive access to one booking's records. Do not call other
    /// lifecycle methods for the same booking while holding it.
    pub(crate) async fn lock_booking(&self, id: BookingId) -> KeyedGuard<'_, BookingId> {
        self.locks.lock(&id).await
    }

    fn check_payment_transition(booking: &Booking, target: PaymentStatus) -> BookingResult<()> {
        if booking.payment_status.can_transition_to(target) {
            return Ok(());
        }
        warn!(
            booking_id = %booking.id,
            from = %booking.payment_status,
            to = %target,
            "rejected payment status change"
        );
        Err(InvalidRequest::IllegalPaymentTransition {
            from: booking.payment_status,
            to: target,
        }
        .into())
    }

    async fn load_transaction(&self, session_id: &str) -> BookingResult<PaymentTransaction> {
        self.payments
            .transaction_by_session(session_id)
            .await?
            .ok_or_else(|| BookingError::not_found(Entity::PaymentSession, session_id))
    }

    async fn load(&self, id: BookingId) -> BookingResult<Booking> {
        self.bookings
            .booking(id)
            .await?
            .ok_or_else(|| BookingError::not_found(Entity::Booking, id))
    }

    async fn authorize_view(&self, principal: &Principal, booking: &Booking) -> BookingResult<()> {
        let allowed = match principal.role {
            Role::Customer => booking.customer_id == principal.id,
            Role::HotelManager => self.manages_room(principal, booking.room_id).await?,
            Role::Admin => true,
        };

        if allowed {
            Ok(())
        } else {
            Err(BookingError::Forbidden(format!(
                "booking {} is not visible to you",
                booking.id
            )))
        }
    }

    async fn manages_room(&self, principal: &Principal, room_id: RoomId) -> BookingResult<bool> {
        let Some(room) = self.catalog.room(room_id).await? else {
            return Ok(false);
        };
        let Some(hotel) = self.catalog.hotel(room.hotel_id).await? else {
            return Ok(false);
        };
        Ok(hotel.manager_id == principal.id)
    }
}
