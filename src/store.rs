// Persistence seams. The core only sees these traits; InMemoryStore backs
// tests, benchmarks and the demo binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::{BookingError, BookingResult, Entity};
use crate::model::{
    Booking, BookingId, BookingStatus, ExtraService, Hotel, HotelId, PaymentStatus,
    PaymentTransaction, Room, RoomId, ServiceId, UserId,
};

/// Read access to hotels, rooms and services. Writes belong to the
/// catalog management layer.
#[async_trait]
pub trait CatalogStore: Send + Sync + 'static {
    async fn hotel(&self, id: HotelId) -> BookingResult<Option<Hotel>>;

    async fn room(&self, id: RoomId) -> BookingResult<Option<Room>>;

    async fn extra_service(&self, id: ServiceId) -> BookingResult<Option<ExtraService>>;

    async fn hotels_managed_by(&self, manager_id: UserId) -> BookingResult<Vec<Hotel>>;

    async fn rooms_in_hotels(&self, hotel_ids: &[HotelId]) -> BookingResult<Vec<Room>>;
}

/// Booking records. Bookings are never deleted and prices are written
/// once; the update methods only touch status fields and `updated_at`.
#[async_trait]
pub trait BookingStore: Send + Sync + 'static {
    async fn insert_booking(&self, booking: Booking) -> BookingResult<()>;

    async fn booking(&self, id: BookingId) -> BookingResult<Option<Booking>>;

    async fn bookings_for_room(&self, room_id: RoomId) -> BookingResult<Vec<Booking>>;

    async fn bookings_for_rooms(&self, room_ids: &[RoomId]) -> BookingResult<Vec<Booking>>;

    async fn bookings_for_customer(&self, customer_id: UserId) -> BookingResult<Vec<Booking>>;

    async fn all_bookings(&self) -> BookingResult<Vec<Booking>>;

    async fn update_booking_status(
        &self,
        id: BookingId,
        status: BookingStatus,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> BookingResult<Booking>;

    async fn update_payment_status(
        &self,
        id: BookingId,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> BookingResult<Booking>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync + 'static {
    async fn insert_transaction(&self, transaction: PaymentTransaction) -> BookingResult<()>;

    async fn transaction_by_session(
        &self,
        session_id: &str,
    ) -> BookingResult<Option<PaymentTransaction>>;

    async fn transactions_for_booking(
        &self,
        booking_id: BookingId,
    ) -> BookingResult<Vec<PaymentTransaction>>;

    async fn update_transaction_status(
        &self,
        session_id: &str,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> BookingResult<PaymentTransaction>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    hotels: DashMap<HotelId, Hotel>,
    rooms: DashMap<RoomId, Room>,
    services: DashMap<ServiceId, ExtraService>,
    bookings: DashMap<BookingId, Booking>,
    // keyed by provider session id
    payments: DashMap<String, PaymentTransaction>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_hotel(&self, hotel: Hotel) {
        self.hotels.insert(hotel.id, hotel);
    }

    pub fn add_room(&self, room: Room) {
        self.rooms.insert(room.id, room);
    }

    pub fn add_service(&self, service: ExtraService) {
        self.services.insert(service.id, service);
    }

    pub fn set_room_available(&self, room_id: RoomId, available: bool) -> bool {
        match self.rooms.get_mut(&room_id) {
            Some(mut room) => {
                room.is_available = available;
                true
            }
            None => false,
        }
    }

    pub fn booking_count(&self) -> usize {
        self.bookings.len()
    }

    pub fn transaction_count(&self) -> usize {
        self.payments.len()
    }

    fn collect_bookings(&self, keep: impl Fn(&Booking) -> bool) -> Vec<Booking> {
        let mut found: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|b| keep(b.value()))
            .map(|b| b.value().clone())
            .collect();
        found.sort_by_key(|b| (b.start_date, b.created_at));
        found
    }
}

#[async_trait]
impl CatalogStore for InMemoryStore {
    async fn hotel(&self, id: HotelId) -> BookingResult<Option<Hotel>> {
        Ok(self.hotels.get(&id).map(|h| h.value().clone()))
    }

    async fn room(&self, id: RoomId) -> BookingResult<Option<Room>> {
        Ok(self.rooms.get(&id).map(|r| r.value().clone()))
    }

    async fn extra_service(&self, id: ServiceId) -> BookingResult<Option<ExtraService>> {
        Ok(self.services.get(&id).map(|s| s.value().clone()))
    }

    async fn hotels_managed_by(&self, manager_id: UserId) -> BookingResult<Vec<Hotel>> {
        Ok(self
            .hotels
            .iter()
            .filter(|h| h.manager_id == manager_id)
            .map(|h| h.value().clone())
            .collect())
    }

    async fn rooms_in_hotels(&self, hotel_ids: &[HotelId]) -> BookingResult<Vec<Room>> {
        Ok(self
            .rooms
            .iter()
            .filter(|r| hotel_ids.contains(&r.hotel_id))
            .map(|r| r.value().clone())
            .collect())
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn insert_booking(&self, booking: Booking) -> BookingResult<()> {
        match self.bookings.entry(booking.id) {
            Entry::Occupied(_) => Err(BookingError::Storage(format!(
                "booking {} already exists",
                booking.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(booking);
                Ok(())
            }
        }
    }

    async fn booking(&self, id: BookingId) -> BookingResult<Option<Booking>> {
        Ok(self.bookings.get(&id).map(|b| b.value().clone()))
    }

    async fn bookings_for_room(&self, room_id: RoomId) -> BookingResult<Vec<Booking>> {
        Ok(self.collect_bookings(|b| b.room_id == room_id))
    }

    async fn bookings_for_rooms(&self, room_ids: &[RoomId]) -> BookingResult<Vec<Booking>> {
        Ok(self.collect_bookings(|b| room_ids.contains(&b.room_id)))
    }

    async fn bookings_for_customer(&self, customer_id: UserId) -> BookingResult<Vec<Booking>> {
        Ok(self.collect_bookings(|b| b.customer_id == customer_id))
    }

    async fn all_bookings(&self) -> BookingResult<Vec<Booking>> {
        Ok(self.collect_bookings(|_| true))
    }

    async fn update_booking_status(
        &self,
        id: BookingId,
        status: BookingStatus,
        notes: Option<String>,
        at: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        let mut booking = self
            .bookings
            .get_mut(&id)
            .ok_or_else(|| BookingError::not_found(Entity::Booking, id))?;
        booking.status = status;
        if notes.is_some() {
            booking.notes = notes;
        }
        booking.updated_at = at;
        Ok(booking.value().clone())
    }

    async fn update_payment_status(
        &self,
        id: BookingId,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> BookingResult<Booking> {
        let mut booking = self
            .bookings
            .get_mut(&id)
            .ok_or_else(|| BookingError::not_found(Entity::Booking, id))?;
        booking.payment_status = status;
        booking.updated_at = at;
        Ok(booking.value().clone())
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert_transaction(&self, transaction: PaymentTransaction) -> BookingResult<()> {
        match self.payments.entry(transaction.session_id.clone()) {
            Entry::Occupied(_) => Err(BookingError::Storage(format!(
                "payment session {} already recorded",
                transaction.session_id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(transaction);
                Ok(())
            }
        }
    }

    async fn transaction_by_session(
        &self,
        session_id: &str,
    ) -> BookingResult<Option<PaymentTransaction>> {
        Ok(self.payments.get(session_id).map(|p| p.value().clone()))
    }

    async fn transactions_for_booking(
        &self,
        booking_id: BookingId,
    ) -> BookingResult<Vec<PaymentTransaction>> {
        let mut found: Vec<PaymentTransaction> = self
            .payments
            .iter()
            .filter(|p| p.booking_id == booking_id)
            .map(|p| p.value().clone())
            .collect();
        found.sort_by_key(|p| p.created_at);
        Ok(found)
    }

    async fn update_transaction_status(
        &self,
        session_id: &str,
        status: PaymentStatus,
        at: DateTime<Utc>,
    ) -> BookingResult<PaymentTransaction> {
        let mut transaction = self
            .payments
            .get_mut(session_id)
            .ok_or_else(|| BookingError::not_found(Entity::PaymentSession, session_id))?;
        transaction.status = status;
        transaction.updated_at = at;
        Ok(transaction.value().clone())
    }
}
