//! Error types for reservation processing.

use chrono::NaiveDate;
use thiserror::Error;

use crate::Amount;
use crate::model::{Actor, BookingStatus, CategoryId, ReservationId};

/// Top-level error returned by [`Engine`](super::Engine) operations.
#[derive(Debug, Error)]
pub enum BookingError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory { requested: u32, available: u32 },

    #[error("invalid transition {from} -> {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("{actor} may not modify reservation {reservation}")]
    Forbidden {
        reservation: ReservationId,
        actor: Actor,
    },

    #[error("room category {0} not found")]
    CategoryNotFound(CategoryId),

    #[error("room category {0} is already registered")]
    CategoryExists(CategoryId),

    #[error("reservation {0} not found")]
    ReservationNotFound(ReservationId),

    #[error("reservation in status {0} cannot be amended")]
    NotAmendable(BookingStatus),

    #[error("no unique reference after {0} attempts")]
    ReferenceExhausted(u32),
}

impl BookingError {
    /// HTTP status a transport layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            BookingError::Validation(_) => 400,
            BookingError::InsufficientInventory { .. } => 409,
            BookingError::InvalidTransition { .. }
            | BookingError::NotAmendable(_)
            | BookingError::CategoryExists(_) => 409,
            BookingError::Forbidden { .. } => 403,
            BookingError::CategoryNotFound(_) | BookingError::ReservationNotFound(_) => 404,
            // retryable server error
            BookingError::ReferenceExhausted(_) => 500,
        }
    }
}

/// Malformed or out-of-range input. Never retried server-side.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("check-in {check_in} is before today ({today})")]
    CheckInInPast { check_in: NaiveDate, today: NaiveDate },

    #[error("check-out {check_out} must be after check-in {check_in}")]
    EmptyStay {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },

    #[error("stay of {nights} nights exceeds the maximum of {max}")]
    StayTooLong { nights: i64, max: u32 },

    #[error("room count must be at least 1")]
    NoRooms,

    #[error("guest count must be at least 1")]
    NoGuests,

    #[error("{requested} rooms exceeds category capacity of {total}")]
    ExceedsCapacity { requested: u32, total: u32 },

    #[error("{guests} guests exceed occupancy of {max} for {rooms} rooms")]
    TooManyGuests { guests: u32, rooms: u32, max: u32 },

    #[error("reservation can no longer be changed on or after check-in {0}")]
    AfterCheckIn(NaiveDate),

    #[error("price of {nights} nights for {rooms} rooms at {rate} is out of range")]
    PriceOutOfRange { rate: Amount, nights: u32, rooms: u32 },

    #[error("room category {id}: {reason}")]
    InvalidCategory { id: CategoryId, reason: &'static str },
}
