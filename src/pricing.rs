// Pricing: booking totals in the room's currency, and display prices converted
// for a viewer through the exchange rate cache.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{BookingResult, InvalidRequest};
use crate::model::{BookingServiceItem, Currency, ExtraService, Granularity, PricingInfo, Room};
use crate::rate_cache::ExchangeRateCache;

const SECONDS_PER_HOUR: i64 = 3600;

// Currencies listings are natively priced in; used for the rate board
const LISTING_CURRENCIES: [Currency; 2] = [Currency::USD, Currency::EUR];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingQuote {
    pub total_days: i64,
    pub total_hours: Option<i64>,
    pub room_price: Decimal,
    pub services_price: Decimal,
    pub total_price: Decimal,
    pub currency: Currency,
}

/// Price a booking in the room's own currency.
///
/// Days are whole days, floored, with a minimum of one. Hourly bookings
/// bill whole hours, floored, and need the room to have an hourly rate.
/// Service items are taken at their snapshotted prices.
pub fn price_booking(
    room: &Room,
    granularity: Granularity,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    service_items: &[BookingServiceItem],
) -> BookingResult<BookingQuote> {
    let duration = end - start;
    let total_days = duration.num_days().max(1);

    let (room_price, total_hours) = match granularity {
        Granularity::Hourly => {
            let hourly_rate = room
                .price_per_hour
                .ok_or(InvalidRequest::UnsupportedBillingMode(room.id))?;
            let total_hours = (duration.num_seconds() / SECONDS_PER_HOUR).max(0);
            (hourly_rate * Decimal::from(total_hours), Some(total_hours))
        }
        Granularity::Daily => (room.price_per_day * Decimal::from(total_days), None),
    };

    let services_price: Decimal = service_items
        .iter()
        .map(|item| Decimal::from(item.quantity) * item.unit_price)
        .sum();

    Ok(BookingQuote {
        total_days,
        total_hours,
        room_price,
        services_price,
        total_price: room_price + services_price,
        currency: room.currency,
    })
}

// Two decimal places, halves away from zero (never banker's rounding)
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Build the display price from an already known rate.
pub fn convert_price(
    base_price: Decimal,
    base_currency: Currency,
    display_currency: Currency,
    rate: Decimal,
) -> PricingInfo {
    if base_currency == display_currency {
        return PricingInfo {
            base_price,
            base_currency,
            display_price: base_price,
            display_currency,
            exchange_rate: None,
        };
    }

    PricingInfo {
        base_price,
        base_currency,
        display_price: round_half_up(base_price * rate),
        display_currency,
        exchange_rate: Some(rate),
    }
}

// Currency a viewer from the given country sees prices in
pub fn display_currency_for_country(country_code: Option<&str>) -> Currency {
    match country_code.map(|c| c.trim().to_ascii_uppercase()) {
        Some(code) if code == "TR" => Currency::TRY,
        Some(code) if code == "US" || code == "CA" => Currency::USD,
        Some(code) if !code.is_empty() => Currency::EUR,
        _ => Currency::TRY,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardRate {
    pub base: Currency,
    pub target: Currency,
    pub rate: Decimal,
}

pub struct PricingCalculator {
    rates: Arc<ExchangeRateCache>,
}

impl PricingCalculator {
    pub fn new(rates: Arc<ExchangeRateCache>) -> Self {
        Self { rates }
    }

    pub fn rate_cache(&self) -> &Arc<ExchangeRateCache> {
        &self.rates
    }

    /// Never fails: an unreachable rate provider shows the price at rate 1.0.
    pub async fn display_price(
        &self,
        base_price: Decimal,
        base_currency: Currency,
        display_currency: Currency,
    ) -> PricingInfo {
        if base_currency == display_currency {
            return convert_price(base_price, base_currency, display_currency, Decimal::ONE);
        }
        let rate = self.rates.get_rate(base_currency, display_currency).await;
        convert_price(base_price, base_currency, display_currency, rate)
    }

    pub async fn price_room(&self, room: &Room, display_currency: Currency) -> PricingInfo {
        self.display_price(room.price_per_day, room.currency, display_currency)
            .await
    }

    pub async fn price_service(
        &self,
        service: &ExtraService,
        display_currency: Currency,
    ) -> PricingInfo {
        self.display_price(service.price, service.currency, display_currency)
            .await
    }

    // Rates from each listing currency into the viewer's currency, fetched concurrently
    pub async fn rate_board(&self, display_currency: Currency) -> Vec<BoardRate> {
        let lookups = LISTING_CURRENCIES
            .into_iter()
            .filter(|base| *base != display_currency)
            .map(|base| async move {
                BoardRate {
                    base,
                    target: display_currency,
                    rate: self.rates.get_rate(base, display_currency).await,
                }
            });
        join_all(lookups).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::config::RateCacheConfig;
    use crate::error::BookingError;
    use crate::model::ApprovalStatus;
    use crate::rate_provider::FixedRateProvider;
    use chrono::{Duration, TimeZone};
    use test_case::test_case;
    use uuid::Uuid;

    fn room(per_day: i64, per_hour: Option<i64>) -> Room {
        Room {
            id: Uuid::new_v4(),
            hotel_id: Uuid::new_v4(),
            name: "Anatolia Hall".to_string(),
            capacity: 40,
            price_per_day: Decimal::from(per_day),
            price_per_hour: per_hour.map(Decimal::from),
            currency: Currency::EUR,
            approval_status: ApprovalStatus::Approved,
            is_available: true,
        }
    }

    fn item(quantity: u32, unit_price: Decimal) -> BookingServiceItem {
        BookingServiceItem {
            service_id: Uuid::new_v4(),
            name: "Projector".to_string(),
            quantity,
            unit_price,
            total_price: unit_price * Decimal::from(quantity),
        }
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, hour, 0, 0).unwrap()
    }

    fn calculator(provider: FixedRateProvider) -> PricingCalculator {
        let cache = ExchangeRateCache::new(
            RateCacheConfig::default(),
            Arc::new(provider),
            Arc::new(SystemClock),
        );
        PricingCalculator::new(Arc::new(cache))
    }

    #[test]
    fn test_three_day_daily_booking() {
        let quote =
            price_booking(&room(100, None), Granularity::Daily, at(9), at(9) + Duration::days(3), &[])
                .unwrap();

        assert_eq!(quote.total_days, 3);
        assert_eq!(quote.total_hours, None);
        assert_eq!(quote.room_price, Decimal::from(300));
        assert_eq!(quote.total_price, Decimal::from(300));
        assert_eq!(quote.currency, Currency::EUR);
    }

    #[test]
    fn test_ninety_minute_hourly_booking_floors_hours() {
        let end = at(9) + Duration::minutes(90);
        let quote = price_booking(&room(400, Some(50)), Granularity::Hourly, at(9), end, &[]).unwrap();

        assert_eq!(quote.total_hours, Some(1));
        assert_eq!(quote.room_price, Decimal::from(50));
        assert_eq!(quote.total_days, 1);
    }

    #[test]
    fn test_hourly_without_rate_is_unsupported() {
        let room = room(100, None);
        let err = price_booking(&room, Granularity::Hourly, at(9), at(12), &[]).unwrap_err();

        assert!(matches!(
            err,
            BookingError::InvalidRequest(InvalidRequest::UnsupportedBillingMode(id)) if id == room.id
        ));
    }

    #[test_case(Duration::hours(5), 1 ; "partial day rounds up to one")]
    #[test_case(Duration::zero(), 1 ; "zero length coerced")]
    #[test_case(Duration::hours(-30), 1 ; "negative coerced")]
    #[test_case(Duration::hours(47), 1 ; "days are floored")]
    #[test_case(Duration::hours(48), 2 ; "whole days")]
    fn test_day_count_policy(length: Duration, expected_days: i64) {
        let quote =
            price_booking(&room(100, None), Granularity::Daily, at(9), at(9) + length, &[]).unwrap();
        assert_eq!(quote.total_days, expected_days);
        assert_eq!(quote.room_price, Decimal::from(100 * expected_days));
    }

    #[test]
    fn test_services_added_to_total() {
        let items = vec![item(2, Decimal::new(1550, 2)), item(1, Decimal::from(80))];
        let quote =
            price_booking(&room(100, None), Granularity::Daily, at(9), at(9) + Duration::days(2), &items)
                .unwrap();

        assert_eq!(quote.services_price, Decimal::from(111));
        assert_eq!(quote.total_price, quote.room_price + quote.services_price);
        assert_eq!(quote.total_price, Decimal::from(311));
    }

    #[test_case(Decimal::new(349950, 2), Decimal::new(349950, 2) ; "already two places")]
    #[test_case(Decimal::new(1005, 3), Decimal::new(101, 2) ; "half goes up")]
    #[test_case(Decimal::new(1025, 3), Decimal::new(103, 2) ; "half goes up not to even")]
    #[test_case(Decimal::new(10049, 4), Decimal::new(100, 2) ; "below half goes down")]
    fn test_round_half_up(value: Decimal, expected: Decimal) {
        assert_eq!(round_half_up(value), expected);
    }

    #[tokio::test]
    async fn test_same_currency_has_no_rate() {
        let calc = calculator(FixedRateProvider::new());
        let info = calc
            .display_price(Decimal::from(100), Currency::EUR, Currency::EUR)
            .await;

        assert_eq!(info.display_price, Decimal::from(100));
        assert_eq!(info.exchange_rate, None);
    }

    #[tokio::test]
    async fn test_conversion_uses_cached_rate() {
        let calc = calculator(
            FixedRateProvider::new().with_rate(Currency::EUR, Currency::TRY, Decimal::from(35)),
        );
        let info = calc
            .display_price(Decimal::from(100), Currency::EUR, Currency::TRY)
            .await;

        assert_eq!(info.display_price, Decimal::new(350000, 2));
        assert_eq!(info.exchange_rate, Some(Decimal::from(35)));
        assert_eq!(info.display_currency, Currency::TRY);
    }

    #[test]
    fn test_conversion_rounds_half_up() {
        let info = convert_price(
            Decimal::new(10001, 2),
            Currency::EUR,
            Currency::TRY,
            Decimal::new(34995, 3),
        );
        // 100.01 * 34.995 = 3499.84995
        assert_eq!(info.display_price, Decimal::new(349985, 2));

        let info = convert_price(Decimal::from(100), Currency::EUR, Currency::TRY, Decimal::new(34995, 3));
        assert_eq!(info.display_price, Decimal::new(349950, 2));
        assert_eq!(info.display_price.to_string(), "3499.50");
    }

    #[tokio::test]
    async fn test_unreachable_provider_shows_base_amount() {
        let calc = calculator(FixedRateProvider::new());
        let info = calc
            .display_price(Decimal::from(100), Currency::USD, Currency::TRY)
            .await;

        assert_eq!(info.display_price, Decimal::from(100));
        assert_eq!(info.exchange_rate, Some(Decimal::ONE));
    }

    #[tokio::test]
    async fn test_rate_board_skips_display_currency() {
        let calc = calculator(
            FixedRateProvider::new()
                .with_rate(Currency::USD, Currency::EUR, Decimal::new(92, 2)),
        );

        let board = calc.rate_board(Currency::EUR).await;
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].base, Currency::USD);
        assert_eq!(board[0].rate, Decimal::new(92, 2));

        assert_eq!(calc.rate_board(Currency::TRY).await.len(), 2);
    }

    #[test_case(Some("TR"), Currency::TRY)]
    #[test_case(Some("us"), Currency::USD)]
    #[test_case(Some("CA"), Currency::USD)]
    #[test_case(Some("DE"), Currency::EUR)]
    #[test_case(None, Currency::TRY)]
    fn test_display_currency_for_country(country: Option<&str>, expected: Currency) {
        assert_eq!(display_currency_for_country(country), expected);
    }
}
