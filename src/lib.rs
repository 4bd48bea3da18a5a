pub mod amount;
pub mod clock;
pub mod config;
pub mod csv;
pub mod engine;
pub mod model;
pub mod payment;
pub mod store;

pub use amount::{Amount, Rate};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::Settings;
pub use engine::{BookingError, Engine, ValidationError};
pub use model::{
    Actor, BookingStatus, CategoryId, Command, GuestId, NewReservation, PaymentMethod,
    Reservation, ReservationId, RoomCategory, Settlement, SettlementStatus, StayRange,
};
pub use payment::{PaymentError, PaymentService, WebhookOutcome};
pub use store::Store;
