// Availability checks against existing reservations of a room

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::error::BookingResult;
use crate::model::{Availability, Booking, RoomId};
use crate::store::BookingStore;

/// Closed-interval overlap: bookings that merely touch (one ends exactly
/// when the other starts) still conflict. Same-instant turnover is not
/// offered.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start <= b_end && a_end >= b_start
}

pub struct AvailabilityChecker {
    bookings: Arc<dyn BookingStore>,
}

impl AvailabilityChecker {
    pub fn new(bookings: Arc<dyn BookingStore>) -> Self {
        Self { bookings }
    }

    // Pending or confirmed bookings of the room that overlap the interval
    pub async fn conflicts(
        &self,
        room_id: RoomId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BookingResult<Vec<Booking>> {
        let existing = self.bookings.bookings_for_room(room_id).await?;
        Ok(existing
            .into_iter()
            .filter(|b| b.blocks_room() && overlaps(b.start_date, b.end_date, start, end))
            .collect())
    }

    pub async fn check(
        &self,
        room_id: RoomId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BookingResult<Availability> {
        let conflicting_booking_ids: Vec<_> = self
            .conflicts(room_id, start, end)
            .await?
            .into_iter()
            .map(|b| b.id)
            .collect();

        debug!(
            room_id = %room_id,
            %start,
            %end,
            conflicts = conflicting_booking_ids.len(),
            "availability checked"
        );

        Ok(Availability {
            is_available: conflicting_booking_ids.is_empty(),
            conflicting_booking_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        BookingStatus, ContactInfo, Currency, Granularity, PaymentStatus,
    };
    use crate::store::InMemoryStore;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;
    use test_case::test_case;
    use uuid::Uuid;

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, d, 0, 0, 0).unwrap()
    }

    fn booking(room_id: RoomId, start: DateTime<Utc>, end: DateTime<Utc>, status: BookingStatus) -> Booking {
        Booking {
            id: Uuid::new_v4(),
            room_id,
            customer_id: Uuid::new_v4(),
            start_date: start,
            end_date: end,
            guest_count: 10,
            granularity: Granularity::Daily,
            total_days: (end - start).num_days().max(1),
            total_hours: None,
            room_price: Decimal::from(100),
            services_price: Decimal::ZERO,
            total_price: Decimal::from(100),
            currency: Currency::EUR,
            status,
            payment_status: PaymentStatus::Pending,
            special_requests: None,
            extra_services: vec![],
            contact: ContactInfo {
                person: "Ayse Demir".to_string(),
                phone: "+90 555 000 0000".to_string(),
                email: "ayse@example.com".to_string(),
                company_name: None,
            },
            notes: None,
            created_at: start - Duration::days(10),
            updated_at: start - Duration::days(10),
        }
    }

    #[test_case(day(1), day(3), day(2), day(4), true ; "partial overlap")]
    #[test_case(day(1), day(5), day(2), day(3), true ; "containment")]
    #[test_case(day(1), day(3), day(3), day(5), true ; "touching endpoints conflict")]
    #[test_case(day(1), day(3), day(4), day(5), false ; "disjoint")]
    #[test_case(day(4), day(5), day(1), day(3), false ; "disjoint reversed")]
    fn test_overlap(a0: DateTime<Utc>, a1: DateTime<Utc>, b0: DateTime<Utc>, b1: DateTime<Utc>, expected: bool) {
        assert_eq!(overlaps(a0, a1, b0, b1), expected);
        assert_eq!(overlaps(b0, b1, a0, a1), expected);
    }

    #[tokio::test]
    async fn test_only_active_bookings_block() {
        let store = Arc::new(InMemoryStore::new());
        let room_id = Uuid::new_v4();
        let pending = booking(room_id, day(1), day(3), BookingStatus::Pending);
        let confirmed = booking(room_id, day(2), day(4), BookingStatus::Confirmed);
        let cancelled = booking(room_id, day(1), day(4), BookingStatus::Cancelled);
        let completed = booking(room_id, day(1), day(4), BookingStatus::Completed);
        let other_room = booking(Uuid::new_v4(), day(1), day(4), BookingStatus::Confirmed);

        for b in [pending.clone(), confirmed.clone(), cancelled, completed, other_room] {
            store.insert_booking(b).await.unwrap();
        }

        let checker = AvailabilityChecker::new(store);
        let result = checker.check(room_id, day(2), day(3)).await.unwrap();

        assert!(!result.is_available);
        assert_eq!(result.conflicting_booking_ids, vec![pending.id, confirmed.id]);
    }

    #[tokio::test]
    async fn test_free_interval_is_available() {
        let store = Arc::new(InMemoryStore::new());
        let room_id = Uuid::new_v4();
        store
            .insert_booking(booking(room_id, day(1), day(3), BookingStatus::Confirmed))
            .await
            .unwrap();

        let checker = AvailabilityChecker::new(store);
        let result = checker.check(room_id, day(4), day(6)).await.unwrap();

        assert!(result.is_available);
        assert!(result.conflicting_booking_ids.is_empty());
    }
}
