// Data model shared by the availability, pricing and lifecycle components

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type UserId = Uuid;
pub type HotelId = Uuid;
pub type RoomId = Uuid;
pub type ServiceId = Uuid;
pub type BookingId = Uuid;
pub type PaymentId = Uuid;

// Currencies a room or service can be priced in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Currency {
    USD,
    EUR,
    TRY,
}

impl Currency {
    pub const ALL: [Currency; 3] = [Currency::USD, Currency::EUR, Currency::TRY];

    pub fn code(self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::TRY => "TRY",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "TRY" => Ok(Currency::TRY),
            other => Err(format!("unsupported currency {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Customer,
    HotelManager,
    Admin,
}

// Authenticated caller, produced by the identity layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub role: Role,
}

impl Principal {
    pub fn customer(id: UserId) -> Self {
        Self {
            id,
            role: Role::Customer,
        }
    }

    pub fn manager(id: UserId) -> Self {
        Self {
            id,
            role: Role::HotelManager,
        }
    }

    pub fn admin(id: UserId) -> Self {
        Self {
            id,
            role: Role::Admin,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hotel {
    pub id: HotelId,
    pub manager_id: UserId,
    pub name: String,
    pub contact_email: Option<String>,
    pub approval_status: ApprovalStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: RoomId,
    pub hotel_id: HotelId,
    pub name: String,
    pub capacity: u32,
    pub price_per_day: Decimal,
    pub price_per_hour: Option<Decimal>,
    pub currency: Currency,
    pub approval_status: ApprovalStatus,
    pub is_available: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingUnit {
    Piece,
    Hour,
    Day,
    Person,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtraService {
    pub id: ServiceId,
    pub hotel_id: HotelId,
    pub name: String,
    pub price: Decimal,
    pub currency: Currency,
    pub unit: BillingUnit,
    pub category: String,
    pub is_available: bool,
}

// How the room part of a booking is billed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Daily,
    Hourly,
}

// A service the customer asks for, before prices are resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSelection {
    pub service_id: ServiceId,
    pub quantity: u32,
}

// Line item with the price captured when the booking was made
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingServiceItem {
    pub service_id: ServiceId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
}

impl BookingServiceItem {
    pub fn snapshot(service: &ExtraService, quantity: u32) -> Self {
        Self {
            service_id: service.id,
            name: service.name.clone(),
            quantity,
            unit_price: service.price,
            total_price: service.price * Decimal::from(quantity),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub person: String,
    pub phone: String,
    pub email: String,
    pub company_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Failed,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub room_id: RoomId,
    pub customer_id: UserId,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub guest_count: u32,
    pub granularity: Granularity,
    pub total_days: i64,
    pub total_hours: Option<i64>,
    pub room_price: Decimal,
    pub services_price: Decimal,
    pub total_price: Decimal,
    pub currency: Currency,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub special_requests: Option<String>,
    pub extra_services: Vec<BookingServiceItem>,
    pub contact: ContactInfo,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    // Pending and confirmed bookings hold the room
    pub fn blocks_room(&self) -> bool {
        matches!(
            self.status,
            BookingStatus::Pending | BookingStatus::Confirmed
        )
    }
}

// Price of a listing as seen by a particular viewer. Never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingInfo {
    pub base_price: Decimal,
    pub base_currency: Currency,
    pub display_price: Decimal,
    pub display_currency: Currency,
    pub exchange_rate: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    pub is_available: bool,
    pub conflicting_booking_ids: Vec<BookingId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: PaymentId,
    pub booking_id: BookingId,
    pub session_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub status: PaymentStatus,
    pub checkout_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
