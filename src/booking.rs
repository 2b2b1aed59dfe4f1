//! Booking Orchestrator.
//!
//! `create_booking` runs its gates in order and persists nothing unless all
//! of them pass:
//! 1. the request is well formed (positive interval, guest count, quantities)
//! 2. the room exists and is bookable, requested services resolve
//! 3. the room is free for the interval
//! 4. the price can be computed
//!
//! Steps 3 and 4 and the insert run under a per-room lock, so two
//! overlapping requests for the same room cannot both succeed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::availability::AvailabilityChecker;
use crate::clock::Clock;
use crate::error::{BookingError, BookingResult, ConflictError, Entity, InvalidRequest};
use crate::locks::KeyedLocks;
use crate::model::{
    Booking, BookingServiceItem, BookingStatus, ContactInfo, Granularity, PaymentStatus,
    Principal, Room, RoomId, ServiceSelection,
};
use crate::notify::{deliver, Notification, Notifier, Template};
use crate::pricing::{price_booking, BookingQuote};
use crate::store::{BookingStore, CatalogStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub room_id: RoomId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub granularity: Granularity,
    pub guest_count: u32,
    #[serde(default)]
    pub services: Vec<ServiceSelection>,
    pub special_requests: Option<String>,
    pub contact: ContactInfo,
}

pub struct BookingOrchestrator {
    catalog: Arc<dyn CatalogStore>,
    bookings: Arc<dyn BookingStore>,
    availability: AvailabilityChecker,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    room_locks: KeyedLocks<RoomId>,
}

impl BookingOrchestrator {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        bookings: Arc<dyn BookingStore>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            availability: AvailabilityChecker::new(bookings.clone()),
            catalog,
            bookings,
            notifier,
            clock,
            room_locks: KeyedLocks::new(),
        }
    }

    pub fn availability(&self) -> &AvailabilityChecker {
        &self.availability
    }

    /// Price a prospective booking without reserving anything.
    pub async fn quote(
        &self,
        room_id: RoomId,
        granularity: Granularity,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        services: &[ServiceSelection],
    ) -> BookingResult<BookingQuote> {
        let room = self.bookable_room(room_id).await?;
        let items = self.snapshot_services(&room, services).await?;
        price_booking(&room, granularity, start, end, &items)
    }

    pub async fn create_booking(
        &self,
        customer: &Principal,
        request: BookingRequest,
    ) -> BookingResult<Booking> {
        if request.end_date <= request.start_date {
            return Err(InvalidRequest::NonPositiveInterval {
                start: request.start_date,
                end: request.end_date,
            }
            .into());
        }

        let room = self.bookable_room(request.room_id).await?;
        if request.guest_count == 0 || request.guest_count > room.capacity {
            return Err(InvalidRequest::GuestCount {
                requested: request.guest_count,
                capacity: room.capacity,
            }
            .into());
        }
        let items = self.snapshot_services(&room, &request.services).await?;

        let booking = {
            let _guard = self.room_locks.lock(&room.id).await;

            let conflicts = self
                .availability
                .check(room.id, request.start_date, request.end_date)
                .await?;
            if !conflicts.is_available {
                info!(
                    room_id = %room.id,
                    conflicting = ?conflicts.conflicting_booking_ids,
                    "booking rejected, room unavailable"
                );
                return Err(ConflictError::RoomUnavailable {
                    room_id: room.id,
                    conflicting: conflicts.conflicting_booking_ids,
                }
                .into());
            }

            let quote = price_booking(
                &room,
                request.granularity,
                request.start_date,
                request.end_date,
                &items,
            )?;

            let now = self.clock.now();
            let booking = Booking {
                id: Uuid::new_v4(),
                room_id: room.id,
                customer_id: customer.id,
                start_date: request.start_date,
                end_date: request.end_date,
                guest_count: request.guest_count,
                granularity: request.granularity,
                total_days: quote.total_days,
                total_hours: quote.total_hours,
                room_price: quote.room_price,
                services_price: quote.services_price,
                total_price: quote.total_price,
                currency: quote.currency,
                status: BookingStatus::Pending,
                payment_status: PaymentStatus::Pending,
                special_requests: request.special_requests,
                extra_services: items,
                contact: request.contact,
                notes: None,
                created_at: now,
                updated_at: now,
            };
            self.bookings.insert_booking(booking.clone()).await?;
            booking
        };

        info!(
            booking_id = %booking.id,
            room_id = %booking.room_id,
            customer_id = %booking.customer_id,
            total = %booking.total_price,
            currency = %booking.currency,
            "booking created"
        );

        self.notify_created(&room, &booking).await;
        Ok(booking)
    }

    async fn bookable_room(&self, room_id: RoomId) -> BookingResult<Room> {
        match self.catalog.room(room_id).await? {
            Some(room) if room.is_available => Ok(room),
            Some(_) => {
                debug!(room_id = %room_id, "room is not open for booking");
                Err(BookingError::not_found(Entity::Room, room_id))
            }
            None => Err(BookingError::not_found(Entity::Room, room_id)),
        }
    }

    async fn snapshot_services(
        &self,
        room: &Room,
        selections: &[ServiceSelection],
    ) -> BookingResult<Vec<BookingServiceItem>> {
        let mut items = Vec::with_capacity(selections.len());
        for selection in selections {
            if selection.quantity == 0 {
                return Err(InvalidRequest::ZeroQuantity(selection.service_id).into());
            }

            let service = self
                .catalog
                .extra_service(selection.service_id)
                .await?
                .filter(|s| s.hotel_id == room.hotel_id && s.is_available)
                .ok_or_else(|| BookingError::not_found(Entity::ExtraService, selection.service_id))?;

            if service.currency != room.currency {
                return Err(InvalidRequest::CurrencyMismatch {
                    expected: room.currency,
                    got: service.currency,
                }
                .into());
            }

            items.push(BookingServiceItem::snapshot(&service, selection.quantity));
        }
        Ok(items)
    }

    async fn notify_created(&self, room: &Room, booking: &Booking) {
        let data = json!({
            "booking_id": booking.id,
            "room": room.name,
            "start_date": booking.start_date,
            "end_date": booking.end_date,
            "guest_count": booking.guest_count,
            "total_price": booking.total_price,
            "currency": booking.currency,
            "contact_person": booking.contact.person,
            "company_name": booking.contact.company_name,
        });

        deliver(
            self.notifier.as_ref(),
            Notification {
                template: Template::BookingConfirmation,
                recipient: booking.contact.email.clone(),
                data: data.clone(),
            },
        )
        .await;

        let owner_email = match self.catalog.hotel(room.hotel_id).await {
            Ok(Some(hotel)) => hotel.contact_email,
            Ok(None) => None,
            Err(e) => {
                warn!(hotel_id = %room.hotel_id, error = %e, "could not load hotel for owner notification");
                None
            }
        };
        if let Some(recipient) = owner_email {
            deliver(
                self.notifier.as_ref(),
                Notification {
                    template: Template::OwnerNotification,
                    recipient,
                    data,
                },
            )
            .await;
        }
    }
}
