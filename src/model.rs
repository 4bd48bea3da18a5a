//! Core domain types for the reservation engine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::Amount;

/// Hotel identifier, owned by the catalog.
pub type HotelId = u32;

/// Room category identifier, owned by the catalog.
pub type CategoryId = u32;

/// Opaque guest identifier, owned by the identity provider.
pub type GuestId = u64;

/// Reservation identifier, assigned by the store.
pub type ReservationId = u64;

/// A bookable room class. Capacity data only: availability is always derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomCategory {
    pub id: CategoryId,
    pub hotel_id: HotelId,
    pub label: String,
    pub nightly_rate: Amount,
    pub total_rooms: u32,
    pub max_occupancy: u32,
}

/// Half-open date interval `[check_in, check_out)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StayRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl StayRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Self {
        Self {
            check_in,
            check_out,
        }
    }

    /// Number of nights; zero or negative for an empty/inverted range.
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    /// Two ranges conflict iff `a.start < b.end && a.end > b.start`.
    /// Checking out on the day another guest checks in is not a conflict.
    pub fn overlaps(&self, other: &StayRange) -> bool {
        self.check_in < other.check_out && self.check_out > other.check_in
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.check_in <= date && date < self.check_out
    }
}

/// Reservation lifecycle. Transitions are enforced in `engine::state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Paid,
    Confirmed,
    Cancelled,
    Completed,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Paid => "PAID",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        };
        f.write_str(s)
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(BookingStatus::Pending),
            "PAID" => Ok(BookingStatus::Paid),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            "COMPLETED" => Ok(BookingStatus::Completed),
            other => Err(format!("unknown booking status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Paid through the payment gateway before arrival.
    Online,
    /// Settled at the front desk.
    Arrival,
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(PaymentMethod::Online),
            "arrival" => Ok(PaymentMethod::Arrival),
            other => Err(format!("unknown payment method '{other}'")),
        }
    }
}

/// Contact details supplied by the identity collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub id: GuestId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Guest,
    Admin,
}

/// Identity performing an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: GuestId,
    pub role: Role,
}

impl Actor {
    pub fn guest(id: GuestId) -> Self {
        Self {
            id,
            role: Role::Guest,
        }
    }

    pub fn admin(id: GuestId) -> Self {
        Self {
            id,
            role: Role::Admin,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Admins act on anything, guests only on what they own.
    pub fn may_act_for(&self, owner: GuestId) -> bool {
        self.is_admin() || self.id == owner
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.role {
            Role::Guest => write!(f, "guest:{}", self.id),
            Role::Admin => write!(f, "admin:{}", self.id),
        }
    }
}

impl FromStr for Actor {
    type Err = String;

    /// Parses the `role:id` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (role, id) = s
            .trim()
            .split_once(':')
            .ok_or_else(|| format!("actor '{s}' is not of the form role:id"))?;
        let id = id
            .parse()
            .map_err(|_| format!("invalid actor id in '{s}'"))?;
        match role.to_ascii_lowercase().as_str() {
            "guest" => Ok(Actor::guest(id)),
            "admin" => Ok(Actor::admin(id)),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Price components, each rounded to cents independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base: Amount,
    pub tax: Amount,
    pub service_charge: Amount,
    pub total: Amount,
}

/// A guest's claim on `room_count` rooms of a category for a stay range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: ReservationId,
    pub reference: String,
    pub category: CategoryId,
    pub guest: Guest,
    pub range: StayRange,
    pub room_count: u32,
    pub guests: u32,
    pub status: BookingStatus,
    pub payment_method: PaymentMethod,
    pub price: PriceBreakdown,
    /// Assigned on the first transition to `Paid` only.
    pub invoice_number: Option<String>,
    /// Advisory payment window; never consulted by availability.
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reservation {
    /// Whether this reservation currently occupies capacity.
    pub fn is_active(&self) -> bool {
        self.status.holds_inventory()
    }
}

/// Input of a reservation request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReservation {
    pub category: CategoryId,
    pub range: StayRange,
    pub room_count: u32,
    pub guests: u32,
    pub payment_method: PaymentMethod,
    pub guest: Guest,
}

/// Gateway-side lifecycle of a reservation's charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SettlementStatus {
    Pending,
    Processing,
    Failed,
    Succeeded,
    Refunded,
}

impl fmt::Display for SettlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SettlementStatus::Pending => "PENDING",
            SettlementStatus::Processing => "PROCESSING",
            SettlementStatus::Failed => "FAILED",
            SettlementStatus::Succeeded => "SUCCEEDED",
            SettlementStatus::Refunded => "REFUNDED",
        };
        f.write_str(s)
    }
}

/// External payment record, one-to-one with a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub reservation: ReservationId,
    pub session_id: Option<String>,
    pub intent_id: Option<String>,
    /// Unique across settlements once the gateway assigns it.
    pub transaction_id: Option<String>,
    pub redirect_url: Option<String>,
    pub amount: Amount,
    pub currency: String,
    pub status: SettlementStatus,
    pub card_brand: Option<String>,
    pub card_last4: Option<String>,
    pub last_error: Option<String>,
    /// Gateway timestamp of the newest event applied.
    pub last_event_at: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Settlement {
    pub fn new(
        reservation: ReservationId,
        amount: Amount,
        currency: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            reservation,
            session_id: None,
            intent_id: None,
            transaction_id: None,
            redirect_url: None,
            amount,
            currency: currency.into(),
            status: SettlementStatus::Pending,
            card_brand: None,
            card_last4: None,
            last_error: None,
            last_event_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// An operation replayed through [`Engine::run`](crate::Engine::run).
#[derive(Debug, Clone)]
pub enum Command {
    /// Register catalog data for a room category.
    Category(RoomCategory),
    /// Create a new reservation.
    Reserve(NewReservation),
    /// Cancel a reservation on behalf of an actor.
    Cancel {
        reservation: ReservationId,
        actor: Actor,
    },
    /// Administrative status change.
    UpdateStatus {
        reservation: ReservationId,
        status: BookingStatus,
        actor: Actor,
    },
}
