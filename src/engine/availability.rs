//! Overlap-based room availability.
//!
//! Availability is never stored: it is the category's fixed capacity minus
//! the rooms held by active reservations whose stay overlaps the query.

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::{CategoryId, Reservation, ReservationId, RoomCategory, StayRange};

/// Answer to an availability query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Availability {
    pub category: CategoryId,
    pub total_rooms: u32,
    pub available_rooms: u32,
}

/// Rooms held over `range` by active reservations, skipping `exclude`.
///
/// `exclude` is the reservation being amended: its own prior claim must not
/// count against its new request.
pub fn occupied_rooms<'a>(
    reservations: impl IntoIterator<Item = &'a Reservation>,
    range: &StayRange,
    exclude: Option<ReservationId>,
) -> u32 {
    let sum: u64 = reservations
        .into_iter()
        .filter(|r| Some(r.id) != exclude)
        .filter(|r| r.is_active() && r.range.overlaps(range))
        .map(|r| r.room_count as u64)
        .sum();
    u32::try_from(sum).unwrap_or(u32::MAX)
}

/// Rooms free for `range`, floored at zero even if the category was
/// historically over-allocated.
pub fn available_rooms<'a>(
    category: &RoomCategory,
    reservations: impl IntoIterator<Item = &'a Reservation>,
    range: &StayRange,
    exclude: Option<ReservationId>,
) -> u32 {
    category
        .total_rooms
        .saturating_sub(occupied_rooms(reservations, range, exclude))
}

/// Rooms held by active reservations on a single night.
pub fn occupancy_on<'a>(
    reservations: impl IntoIterator<Item = &'a Reservation>,
    date: NaiveDate,
) -> u32 {
    reservations
        .into_iter()
        .filter(|r| r.is_active() && r.range.contains(date))
        .map(|r| r.room_count)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Amount;
    use crate::model::{BookingStatus, Guest, PaymentMethod, PriceBreakdown};
    use chrono::{TimeZone, Utc};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2031, 5, 1).unwrap() + chrono::Days::new(d as u64)
    }

    fn range(from: u32, to: u32) -> StayRange {
        StayRange::new(day(from), day(to))
    }

    fn category(total_rooms: u32) -> RoomCategory {
        RoomCategory {
            id: 1,
            hotel_id: 1,
            label: "Standard".to_string(),
            nightly_rate: Amount::from_units(100),
            total_rooms,
            max_occupancy: 2,
        }
    }

    fn booking(id: ReservationId, from: u32, to: u32, rooms: u32, status: BookingStatus) -> Reservation {
        let at = Utc.with_ymd_and_hms(2031, 1, 1, 0, 0, 0).unwrap();
        Reservation {
            id,
            reference: format!("BK-{id}"),
            category: 1,
            guest: Guest {
                id: 1,
                name: "Ana".to_string(),
                email: "ana@example.com".to_string(),
                phone: None,
            },
            range: range(from, to),
            room_count: rooms,
            guests: 1,
            status,
            payment_method: PaymentMethod::Arrival,
            price: PriceBreakdown::default(),
            invoice_number: None,
            hold_expires_at: None,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn empty_category_is_fully_available() {
        assert_eq!(available_rooms(&category(10), std::iter::empty(), &range(0, 3), None), 10);
    }

    #[test]
    fn checkout_day_is_resellable() {
        let existing = [booking(1, 0, 3, 10, BookingStatus::Paid)];
        assert_eq!(available_rooms(&category(10), &existing, &range(3, 5), None), 10);
        assert_eq!(available_rooms(&category(10), &existing, &range(2, 3), None), 0);
    }

    #[test]
    fn only_overlapping_reservations_count() {
        // A: 3 rooms [3,7) paid
        let mut existing = vec![booking(1, 3, 7, 3, BookingStatus::Paid)];
        assert_eq!(available_rooms(&category(10), &existing, &range(5, 10), None), 7);

        // B: 2 rooms [0,3); [0,5) overlaps both A and B
        existing.push(booking(2, 0, 3, 2, BookingStatus::Pending));
        assert_eq!(available_rooms(&category(10), &existing, &range(0, 5), None), 5);
        // [0,3) ends the day A starts, so only B counts
        assert_eq!(available_rooms(&category(10), &existing, &range(0, 3), None), 8);
        // [7,9) touches neither
        assert_eq!(available_rooms(&category(10), &existing, &range(7, 9), None), 10);
    }

    #[test]
    fn inactive_statuses_are_excluded() {
        let existing = [
            booking(1, 0, 5, 4, BookingStatus::Cancelled),
            booking(2, 0, 5, 4, BookingStatus::Completed),
            booking(3, 0, 5, 1, BookingStatus::Confirmed),
        ];
        assert_eq!(available_rooms(&category(10), &existing, &range(1, 2), None), 9);
    }

    #[test]
    fn over_allocation_floors_at_zero() {
        let existing = [
            booking(1, 0, 5, 8, BookingStatus::Paid),
            booking(2, 0, 5, 8, BookingStatus::Paid),
        ];
        assert_eq!(available_rooms(&category(10), &existing, &range(0, 5), None), 0);
    }

    #[test]
    fn excluded_reservation_adds_back_its_own_rooms() {
        let existing = [
            booking(1, 0, 5, 6, BookingStatus::Pending),
            booking(2, 0, 5, 3, BookingStatus::Paid),
        ];
        assert_eq!(available_rooms(&category(10), &existing, &range(0, 7), None), 1);
        assert_eq!(available_rooms(&category(10), &existing, &range(0, 7), Some(1)), 7);
    }

    #[test]
    fn occupancy_per_night() {
        let existing = [
            booking(1, 0, 3, 2, BookingStatus::Paid),
            booking(2, 2, 4, 3, BookingStatus::Pending),
            booking(3, 2, 4, 5, BookingStatus::Cancelled),
        ];
        assert_eq!(occupancy_on(&existing, day(1)), 2);
        assert_eq!(occupancy_on(&existing, day(2)), 5);
        assert_eq!(occupancy_on(&existing, day(3)), 3);
        assert_eq!(occupancy_on(&existing, day(4)), 0);
    }
}
