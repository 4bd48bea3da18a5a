//! Reservation engine.
//!
//! The engine owns the reservation lifecycle: create, amend, cancel and
//! administrative status changes. Every mutation runs inside one store
//! transaction that re-checks availability before writing, so concurrent
//! requests can never push a category past its capacity.
//! Also supports replaying an async stream of commands.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_stream::{Stream, StreamExt};
use tracing::{info, warn};

use crate::Amount;
use crate::clock::Clock;
use crate::config::BookingSettings;
use crate::model::{
    Actor, BookingStatus, CategoryId, Command, NewReservation, PriceBreakdown, Reservation,
    ReservationId, RoomCategory, SettlementStatus, StayRange,
};
use crate::store::{Store, Tables};

pub mod availability;
pub mod pricing;
pub mod reference;

mod state;

mod error;
pub use error::{BookingError, ValidationError};

use availability::{Availability, available_rooms};
use pricing::{PricingRates, compute_breakdown};
use reference::{CodeSource, RandomCodes, ReferenceGenerator, next_invoice_number};

/// The reservation engine.
///
/// Cheap to share behind an `Arc`; all state lives in the [`Store`].
pub struct Engine {
    store: Arc<Store>,
    settings: BookingSettings,
    references: ReferenceGenerator,
    clock: Arc<dyn Clock>,
}

/// Public API
impl Engine {
    pub fn new(store: Arc<Store>, settings: BookingSettings, clock: Arc<dyn Clock>) -> Self {
        let references = ReferenceGenerator::new(
            settings.reference_prefix.clone(),
            settings.reference_attempts,
            Arc::new(RandomCodes),
        );
        Self {
            store,
            settings,
            references,
            clock,
        }
    }

    /// Replace the random source used for booking references.
    pub fn with_code_source(mut self, source: Arc<dyn CodeSource>) -> Self {
        self.references = ReferenceGenerator::new(
            self.settings.reference_prefix.clone(),
            self.settings.reference_attempts,
            source,
        );
        self
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn settings(&self) -> &BookingSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run the engine with the given command stream
    pub async fn run(&self, mut stream: impl Stream<Item = Command> + Unpin) {
        while let Some(command) = stream.next().await {
            // a rejected command must not stop the replay; it is already logged
            let _ = self.apply(command).await;
        }
    }

    /// Apply a single command on top of the current state
    pub async fn apply(&self, command: Command) -> Result<(), BookingError> {
        match command {
            Command::Category(category) => self.register_category(category).await,
            Command::Reserve(request) => self.create_reservation(request).await.map(drop),
            Command::Cancel { reservation, actor } => {
                self.cancel_reservation(reservation, actor).await.map(drop)
            }
            Command::UpdateStatus {
                reservation,
                status,
                actor,
            } => self
                .update_status(reservation, status, actor)
                .await
                .map(drop),
        }
    }

    /// Add catalog data for a new category. Categories are immutable once
    /// registered: reservations hold capacity against them.
    pub async fn register_category(&self, category: RoomCategory) -> Result<(), BookingError> {
        let id = category.id;
        let result = match validate_category(&category) {
            Ok(()) => {
                self.store
                    .transaction(|t| {
                        if t.categories.contains_key(&id) {
                            return Err(BookingError::CategoryExists(id));
                        }
                        t.categories.insert(id, category);
                        Ok(())
                    })
                    .await
            }
            Err(e) => Err(e.into()),
        };
        Self::log_result("category", None, &result);
        result
    }

    /// Rooms free for a stay. Runs outside a write transaction: good for
    /// display, not for committing a reservation.
    pub async fn availability(
        &self,
        category: CategoryId,
        range: StayRange,
    ) -> Result<Availability, BookingError> {
        if range.nights() < 1 {
            return Err(ValidationError::EmptyStay {
                check_in: range.check_in,
                check_out: range.check_out,
            }
            .into());
        }
        self.store
            .read(|t| {
                let cat = t
                    .categories
                    .get(&category)
                    .ok_or(BookingError::CategoryNotFound(category))?;
                Ok(Availability {
                    category,
                    total_rooms: cat.total_rooms,
                    available_rooms: available_rooms(cat, t.reservations_for(category), &range, None),
                })
            })
            .await
    }

    /// Create a `Pending` reservation:
    /// - Validate dates, stay length, room and guest counts
    /// - Re-check availability inside the write transaction
    /// - Price the stay and stamp a unique reference
    pub async fn create_reservation(
        &self,
        request: NewReservation,
    ) -> Result<Reservation, BookingError> {
        let now = self.clock.now();
        let result = self
            .store
            .transaction(|t| self.insert_reservation(t, request, now))
            .await;
        Self::log_result("reserve", result.as_ref().ok().map(|r| r.id), &result);
        result
    }

    /// Change dates or room count of a `Pending` reservation. The
    /// reservation's own rooms are added back before re-checking availability.
    pub async fn amend_reservation(
        &self,
        id: ReservationId,
        actor: Actor,
        range: StayRange,
        room_count: u32,
    ) -> Result<Reservation, BookingError> {
        let now = self.clock.now();
        let result = self
            .store
            .transaction(|t| self.amend_in(t, id, actor, range, room_count, now))
            .await;
        Self::log_result("amend", Some(id), &result);
        result
    }

    /// Cancel on behalf of the owning guest or an admin, strictly before
    /// check-in and only from `Pending` or `Paid`. The rooms are free again
    /// as soon as this commits.
    pub async fn cancel_reservation(
        &self,
        id: ReservationId,
        actor: Actor,
    ) -> Result<Reservation, BookingError> {
        let now = self.clock.now();
        let result = self
            .store
            .transaction(|t| {
                let reservation = t
                    .reservations
                    .get(&id)
                    .ok_or(BookingError::ReservationNotFound(id))?;
                if !actor.may_act_for(reservation.guest.id) {
                    return Err(BookingError::Forbidden {
                        reservation: id,
                        actor,
                    });
                }
                if !reservation.status.guest_cancellable() {
                    return Err(BookingError::InvalidTransition {
                        from: reservation.status,
                        to: BookingStatus::Cancelled,
                    });
                }
                if now.date_naive() >= reservation.range.check_in {
                    return Err(ValidationError::AfterCheckIn(reservation.range.check_in).into());
                }
                self.transition_in(t, id, BookingStatus::Cancelled, now)
            })
            .await;
        Self::log_result("cancel", Some(id), &result);
        result
    }

    /// Administrative status change, validated against the transition table.
    pub async fn update_status(
        &self,
        id: ReservationId,
        status: BookingStatus,
        actor: Actor,
    ) -> Result<Reservation, BookingError> {
        let now = self.clock.now();
        let result = if actor.is_admin() {
            self.store
                .transaction(|t| self.transition_in(t, id, status, now))
                .await
        } else {
            Err(BookingError::Forbidden {
                reservation: id,
                actor,
            })
        };
        Self::log_result("status", Some(id), &result);
        result
    }

    pub async fn reservation(&self, id: ReservationId) -> Option<Reservation> {
        self.store.read(|t| t.reservations.get(&id).cloned()).await
    }

    /// All reservations ordered by id.
    pub async fn reservations(&self) -> Vec<Reservation> {
        let mut all = self
            .store
            .read(|t| t.reservations.values().cloned().collect::<Vec<_>>())
            .await;
        all.sort_by_key(|r| r.id);
        all
    }

    /// Cancel `Pending` reservations whose payment hold has expired without a
    /// successful settlement. Never called by the engine itself: an external
    /// scheduler decides when to sweep.
    pub async fn release_expired_holds(&self) -> Vec<ReservationId> {
        let now = self.clock.now();
        let released = self
            .store
            .transaction(|t| {
                let mut expired: Vec<ReservationId> = t
                    .reservations
                    .values()
                    .filter(|r| r.status == BookingStatus::Pending)
                    .filter(|r| r.hold_expires_at.is_some_and(|at| at <= now))
                    .filter(|r| {
                        t.settlements
                            .get(&r.id)
                            .is_none_or(|s| s.status != SettlementStatus::Succeeded)
                    })
                    .map(|r| r.id)
                    .collect();
                expired.sort_unstable();
                for id in &expired {
                    self.transition_in(t, *id, BookingStatus::Cancelled, now)?;
                }
                Ok::<_, BookingError>(expired)
            })
            .await
            .unwrap_or_else(|e| {
                warn!(reason = %e, "hold sweep aborted");
                Vec::new()
            });
        for id in &released {
            info!(reservation = %id, "expired hold released");
        }
        released
    }
}

/// Crate API used by payment reconciliation inside its own transactions
impl Engine {
    /// Move a reservation along the transition table. The first move to
    /// `Paid` stamps the next invoice number for the day.
    pub(crate) fn transition_in(
        &self,
        t: &mut Tables,
        id: ReservationId,
        to: BookingStatus,
        now: DateTime<Utc>,
    ) -> Result<Reservation, BookingError> {
        let reservation = t
            .reservations
            .get_mut(&id)
            .ok_or(BookingError::ReservationNotFound(id))?;
        reservation.status = reservation.status.transition(to)?;
        if to == BookingStatus::Paid && reservation.invoice_number.is_none() {
            reservation.invoice_number = Some(next_invoice_number(
                &self.settings.invoice_prefix,
                &mut t.invoice_counters,
                now.date_naive(),
            ));
        }
        reservation.updated_at = now;
        Ok(reservation.clone())
    }

    /// Refunds send a paid reservation back to `Pending` for operator
    /// follow-up. This edge is reserved to the gateway and is not part of the
    /// administrative table.
    pub(crate) fn revert_payment_in(
        &self,
        t: &mut Tables,
        id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<Option<Reservation>, BookingError> {
        let reservation = t
            .reservations
            .get_mut(&id)
            .ok_or(BookingError::ReservationNotFound(id))?;
        if reservation.status != BookingStatus::Paid {
            return Ok(None);
        }
        reservation.status = BookingStatus::Pending;
        reservation.updated_at = now;
        Ok(Some(reservation.clone()))
    }
}

/// Private API
impl Engine {
    /// Small helper to log operation results
    fn log_result<T>(op: &str, id: Option<ReservationId>, result: &Result<T, BookingError>) {
        match (result, id) {
            (Ok(_), Some(id)) => info!(reservation = %id, "{op} applied"),
            (Ok(_), None) => info!("{op} applied"),
            (Err(e), Some(id)) => info!(reservation = %id, reason = %e, "{op} skipped"),
            (Err(e), None) => info!(reason = %e, "{op} skipped"),
        }
    }

    fn insert_reservation(
        &self,
        t: &mut Tables,
        request: NewReservation,
        now: DateTime<Utc>,
    ) -> Result<Reservation, BookingError> {
        let category = t
            .categories
            .get(&request.category)
            .ok_or(BookingError::CategoryNotFound(request.category))?;

        let nights = self.validate_stay(
            category,
            &request.range,
            request.room_count,
            request.guests,
            now,
        )?;

        let available = available_rooms(
            category,
            t.reservations_for(category.id),
            &request.range,
            None,
        );
        if request.room_count > available {
            return Err(BookingError::InsufficientInventory {
                requested: request.room_count,
                available,
            });
        }

        let price = self.price(category, nights, request.room_count)?;
        let reference = self.references.generate(&t.references)?;
        let id = t.next_reservation_id();

        let reservation = Reservation {
            id,
            reference: reference.clone(),
            category: request.category,
            guest: request.guest,
            range: request.range,
            room_count: request.room_count,
            guests: request.guests,
            status: BookingStatus::Pending,
            payment_method: request.payment_method,
            price,
            invoice_number: None,
            hold_expires_at: None,
            created_at: now,
            updated_at: now,
        };
        t.references.insert(reference);
        t.reservations.insert(id, reservation.clone());
        Ok(reservation)
    }

    fn amend_in(
        &self,
        t: &mut Tables,
        id: ReservationId,
        actor: Actor,
        range: StayRange,
        room_count: u32,
        now: DateTime<Utc>,
    ) -> Result<Reservation, BookingError> {
        let current = t
            .reservations
            .get(&id)
            .ok_or(BookingError::ReservationNotFound(id))?;
        if !actor.may_act_for(current.guest.id) {
            return Err(BookingError::Forbidden {
                reservation: id,
                actor,
            });
        }
        let session_open = t
            .settlements
            .get(&id)
            .is_some_and(|s| s.status.blocks_new_session());
        if current.status != BookingStatus::Pending || session_open {
            return Err(BookingError::NotAmendable(current.status));
        }
        let category = t
            .categories
            .get(&current.category)
            .ok_or(BookingError::CategoryNotFound(current.category))?;

        let nights = self.validate_stay(category, &range, room_count, current.guests, now)?;
        let available = available_rooms(category, t.reservations_for(category.id), &range, Some(id));
        if room_count > available {
            return Err(BookingError::InsufficientInventory {
                requested: room_count,
                available,
            });
        }
        let price = self.price(category, nights, room_count)?;

        let reservation = t
            .reservations
            .get_mut(&id)
            .ok_or(BookingError::ReservationNotFound(id))?;
        reservation.range = range;
        reservation.room_count = room_count;
        reservation.price = price;
        reservation.updated_at = now;
        Ok(reservation.clone())
    }

    /// Returns the number of nights on success.
    fn validate_stay(
        &self,
        category: &RoomCategory,
        range: &StayRange,
        room_count: u32,
        guests: u32,
        now: DateTime<Utc>,
    ) -> Result<u32, ValidationError> {
        let today = now.date_naive();
        if range.check_in < today {
            return Err(ValidationError::CheckInInPast {
                check_in: range.check_in,
                today,
            });
        }
        let nights = range.nights();
        if nights < 1 {
            return Err(ValidationError::EmptyStay {
                check_in: range.check_in,
                check_out: range.check_out,
            });
        }
        if nights > self.settings.max_stay_nights as i64 {
            return Err(ValidationError::StayTooLong {
                nights,
                max: self.settings.max_stay_nights,
            });
        }
        if room_count == 0 {
            return Err(ValidationError::NoRooms);
        }
        if guests == 0 {
            return Err(ValidationError::NoGuests);
        }
        if room_count > category.total_rooms {
            return Err(ValidationError::ExceedsCapacity {
                requested: room_count,
                total: category.total_rooms,
            });
        }
        let max = category.max_occupancy.saturating_mul(room_count);
        if guests > max {
            return Err(ValidationError::TooManyGuests {
                guests,
                rooms: room_count,
                max,
            });
        }
        Ok(nights as u32)
    }

    fn price(
        &self,
        category: &RoomCategory,
        nights: u32,
        rooms: u32,
    ) -> Result<PriceBreakdown, ValidationError> {
        let rates = PricingRates {
            tax: self.settings.tax_rate,
            service: self.settings.service_rate,
        };
        compute_breakdown(category.nightly_rate, nights, rooms, rates).ok_or(
            ValidationError::PriceOutOfRange {
                rate: category.nightly_rate,
                nights,
                rooms,
            },
        )
    }
}

fn validate_category(category: &RoomCategory) -> Result<(), ValidationError> {
    let invalid = |reason| ValidationError::InvalidCategory {
        id: category.id,
        reason,
    };
    if category.nightly_rate < Amount::from_cents(1) {
        return Err(invalid("nightly rate must be at least 0.01"));
    }
    if category.total_rooms == 0 {
        return Err(invalid("total rooms must be at least 1"));
    }
    if category.max_occupancy == 0 {
        return Err(invalid("max occupancy must be at least 1"));
    }
    Ok(())
}
