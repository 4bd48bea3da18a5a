//! Payment reconciliation.
//!
//! Opens hosted-checkout sessions for online reservations and applies the
//! gateway's signed, asynchronously delivered events to settlements and
//! reservations. Events are idempotent by id and ordered by settlement rank,
//! so redelivery and out-of-order arrival converge to the same state.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::PaymentSettings;
use crate::engine::{BookingError, Engine};
use crate::model::{
    Actor, BookingStatus, PaymentMethod, ReservationId, Settlement, SettlementStatus,
};
use crate::store::Tables;

pub mod gateway;
pub mod webhook;

use gateway::{CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway};
use webhook::{EventKind, GatewayEvent, WebhookError, verify_signature};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error("reservation {0} is not paid online")]
    NotOnline(ReservationId),

    #[error("reservation {0} is already paid")]
    AlreadyPaid(ReservationId),

    #[error("a payment session for reservation {0} is being opened")]
    SessionInProgress(ReservationId),

    #[error("transaction {transaction} already belongs to reservation {owner}")]
    DuplicateTransaction {
        transaction: String,
        owner: ReservationId,
    },
}

impl PaymentError {
    pub fn status_code(&self) -> u16 {
        match self {
            PaymentError::Booking(e) => e.status_code(),
            PaymentError::Gateway(e) => e.status_code(),
            PaymentError::Webhook(e) => e.status_code(),
            PaymentError::NotOnline(_) => 400,
            PaymentError::AlreadyPaid(_)
            | PaymentError::SessionInProgress(_)
            | PaymentError::DuplicateTransaction { .. } => 409,
        }
    }
}

/// Result of applying one gateway event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied,
    /// Event id already reconciled.
    Duplicate,
    /// Would move the settlement backwards, or carries older data.
    Stale,
    /// Unhandled type, unknown reservation or superseded session.
    Ignored,
}

enum SessionStart {
    Existing(String),
    Open(CheckoutRequest),
}

pub struct PaymentService {
    engine: Arc<Engine>,
    gateway: Arc<dyn PaymentGateway>,
    settings: PaymentSettings,
}

impl PaymentService {
    pub fn new(
        engine: Arc<Engine>,
        gateway: Arc<dyn PaymentGateway>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            engine,
            gateway,
            settings,
        }
    }

    pub async fn settlement(&self, reservation: ReservationId) -> Option<Settlement> {
        self.engine
            .store()
            .read(|t| t.settlements.get(&reservation).cloned())
            .await
    }

    /// Open a checkout session and return its redirect URL.
    ///
    /// A session already in `Processing` is returned as is. `Failed` or
    /// `Refunded` settlements are replaced by a fresh one. The gateway is
    /// called outside the store lock; a currency rejection is retried once
    /// with the fallback currency.
    #[instrument(skip_all, fields(reservation = %reservation, actor = %actor))]
    pub async fn create_session(
        &self,
        reservation: ReservationId,
        actor: Actor,
    ) -> Result<String, PaymentError> {
        let now = self.engine.now();
        let hold = TimeDelta::seconds(self.engine.settings().hold_window.as_secs() as i64);

        let start = self
            .engine
            .store()
            .transaction(|t| self.reserve_session(t, reservation, actor, now, hold))
            .await?;
        let request = match start {
            SessionStart::Existing(url) => {
                info!("session already open");
                return Ok(url);
            }
            SessionStart::Open(request) => request,
        };

        let result = self.open_with_fallback(request).await;

        let now = self.engine.now();
        let url = self
            .engine
            .store()
            .transaction(|t| -> Result<Result<String, GatewayError>, PaymentError> {
                let settlement = t
                    .settlements
                    .get_mut(&reservation)
                    .ok_or(BookingError::ReservationNotFound(reservation))?;
                settlement.updated_at = now;
                match result {
                    Ok((session, currency)) => {
                        settlement.session_id = Some(session.session_id);
                        settlement.intent_id = session.intent_id;
                        settlement.redirect_url = Some(session.redirect_url.clone());
                        settlement.currency = currency;
                        if settlement.status.can_advance_to(SettlementStatus::Processing) {
                            settlement.status = SettlementStatus::Processing;
                        }
                        Ok(Ok(session.redirect_url))
                    }
                    Err(e) => {
                        // an event may have settled it while the gateway was called
                        if settlement.status.can_advance_to(SettlementStatus::Failed) {
                            settlement.status = SettlementStatus::Failed;
                            settlement.last_error = Some(e.to_string());
                        }
                        // commit the failure, then report it
                        Ok(Err(e))
                    }
                }
            })
            .await?;

        match url {
            Ok(url) => {
                info!("checkout session opened");
                Ok(url)
            }
            Err(e) => {
                warn!(reason = %e, "checkout session failed");
                Err(e.into())
            }
        }
    }

    /// Verify and apply a signed webhook delivery.
    #[instrument(skip_all)]
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, PaymentError> {
        if !self.settings.webhook_configured() {
            warn!("webhook received but no secret is configured");
            return Err(WebhookError::NotConfigured.into());
        }
        let now = self.engine.now().timestamp();
        if let Err(e) = verify_signature(
            payload,
            signature,
            &self.settings.webhook_secret,
            self.settings.webhook_tolerance_seconds,
            now,
        ) {
            warn!(reason = %e, bytes = payload.len(), "webhook rejected");
            return Err(e.into());
        }
        let event = GatewayEvent::parse(payload).inspect_err(|e| {
            warn!(reason = %e, "webhook payload rejected");
        })?;
        self.apply_event(event).await
    }

    /// Apply an already verified event inside one transaction.
    #[instrument(skip(self, event), fields(event = %event.id, kind = %event.event_type))]
    pub async fn apply_event(&self, event: GatewayEvent) -> Result<WebhookOutcome, PaymentError> {
        let now = self.engine.now();
        let result = self
            .engine
            .store()
            .transaction(|t| self.reconcile(t, &event, now))
            .await;
        match &result {
            Ok(WebhookOutcome::Applied) => {
                info!(reservation = %event.data.reservation_id, "event applied")
            }
            Ok(WebhookOutcome::Stale) => {
                warn!(reservation = %event.data.reservation_id, "stale event dropped")
            }
            Ok(outcome) => info!(?outcome, "event not applied"),
            Err(e) => warn!(reason = %e, "event failed"),
        }
        result
    }
}

/// Private API
impl PaymentService {
    fn reserve_session(
        &self,
        t: &mut Tables,
        id: ReservationId,
        actor: Actor,
        now: DateTime<Utc>,
        hold: TimeDelta,
    ) -> Result<SessionStart, PaymentError> {
        let reservation = t
            .reservations
            .get(&id)
            .ok_or(BookingError::ReservationNotFound(id))?;
        if !actor.may_act_for(reservation.guest.id) {
            return Err(BookingError::Forbidden {
                reservation: id,
                actor,
            }
            .into());
        }
        if reservation.payment_method != PaymentMethod::Online {
            return Err(PaymentError::NotOnline(id));
        }
        match reservation.status {
            BookingStatus::Pending => {}
            BookingStatus::Paid => return Err(PaymentError::AlreadyPaid(id)),
            // settled off-gateway or closed
            from @ (BookingStatus::Confirmed
            | BookingStatus::Completed
            | BookingStatus::Cancelled) => {
                return Err(BookingError::InvalidTransition {
                    from,
                    to: BookingStatus::Paid,
                }
                .into());
            }
        }

        if let Some(existing) = t.settlements.get(&id) {
            match existing.status {
                SettlementStatus::Processing => {
                    if let Some(url) = &existing.redirect_url {
                        return Ok(SessionStart::Existing(url.clone()));
                    }
                    return Err(PaymentError::SessionInProgress(id));
                }
                SettlementStatus::Pending => return Err(PaymentError::SessionInProgress(id)),
                SettlementStatus::Succeeded => return Err(PaymentError::AlreadyPaid(id)),
                SettlementStatus::Failed | SettlementStatus::Refunded => {}
            }
        }

        let request = CheckoutRequest {
            reservation: id,
            reference: reservation.reference.clone(),
            amount: reservation.price.total,
            currency: self.settings.currency.clone(),
            customer_email: reservation.guest.email.clone(),
            success_url: self.settings.success_url.clone(),
            cancel_url: self.settings.cancel_url.clone(),
        };
        t.settlements.insert(
            id,
            Settlement::new(id, request.amount, request.currency.clone(), now),
        );
        if let Some(reservation) = t.reservations.get_mut(&id) {
            reservation.hold_expires_at = Some(now + hold);
            reservation.updated_at = now;
        }
        Ok(SessionStart::Open(request))
    }

    async fn open_with_fallback(
        &self,
        request: CheckoutRequest,
    ) -> Result<(CheckoutSession, String), GatewayError> {
        let currency = request.currency.clone();
        match self.gateway.create_checkout_session(request.clone()).await {
            Ok(session) => Ok((session, currency)),
            Err(GatewayError::UnsupportedCurrency(rejected)) => {
                let fallback = match &self.settings.fallback_currency {
                    Some(f) if !f.eq_ignore_ascii_case(&rejected) => f.clone(),
                    _ => return Err(GatewayError::UnsupportedCurrency(rejected)),
                };
                warn!(rejected = %rejected, fallback = %fallback, "retrying with fallback currency");
                let retry = CheckoutRequest {
                    currency: fallback.clone(),
                    ..request
                };
                let session = self.gateway.create_checkout_session(retry).await?;
                Ok((session, fallback))
            }
            Err(e) => Err(e),
        }
    }

    fn reconcile(
        &self,
        t: &mut Tables,
        event: &GatewayEvent,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome, PaymentError> {
        if t.processed_events.contains(&event.id) {
            return Ok(WebhookOutcome::Duplicate);
        }
        let outcome = self.reconcile_new(t, event, now)?;
        t.processed_events.insert(event.id.clone());
        Ok(outcome)
    }

    fn reconcile_new(
        &self,
        t: &mut Tables,
        event: &GatewayEvent,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome, PaymentError> {
        let target = match event.kind() {
            EventKind::Succeeded => SettlementStatus::Succeeded,
            EventKind::Failed => SettlementStatus::Failed,
            EventKind::Refunded => SettlementStatus::Refunded,
            EventKind::Other => return Ok(WebhookOutcome::Ignored),
        };
        let id = event.data.reservation_id;
        let Some(settlement) = t.settlements.get(&id) else {
            warn!(reservation = %id, "event for unknown settlement");
            return Ok(WebhookOutcome::Ignored);
        };
        if superseded(settlement.session_id.as_deref(), event.data.session_id.as_deref())
            || superseded(settlement.intent_id.as_deref(), event.data.intent_id.as_deref())
        {
            return Ok(WebhookOutcome::Ignored);
        }

        let newer = settlement.last_event_at.is_none_or(|at| event.created > at);
        let advance = settlement.status.can_advance_to(target);
        if !advance && !(settlement.status == target && newer) {
            return Ok(WebhookOutcome::Stale);
        }

        if let Some(txn) = &event.data.transaction_id {
            match t.transaction_ids.get(txn) {
                Some(&owner) if owner != id => {
                    return Err(PaymentError::DuplicateTransaction {
                        transaction: txn.clone(),
                        owner,
                    });
                }
                _ => {
                    t.transaction_ids.insert(txn.clone(), id);
                }
            }
        }

        if let Some(settlement) = t.settlements.get_mut(&id) {
            apply_metadata(settlement, event, now);
            if advance {
                settlement.status = target;
            }
        }
        if !advance {
            return Ok(WebhookOutcome::Applied);
        }

        match target {
            SettlementStatus::Succeeded => self.mark_paid(t, id, now)?,
            SettlementStatus::Refunded => {
                if self.engine.revert_payment_in(t, id, now)?.is_some() {
                    info!(reservation = %id, "refunded reservation back to pending");
                }
            }
            _ => {}
        }
        Ok(WebhookOutcome::Applied)
    }

    fn mark_paid(
        &self,
        t: &mut Tables,
        id: ReservationId,
        now: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        let status = t
            .reservations
            .get(&id)
            .map(|r| r.status)
            .ok_or(BookingError::ReservationNotFound(id))?;
        match status {
            BookingStatus::Pending => {
                self.engine.transition_in(t, id, BookingStatus::Paid, now)?;
                if let Some(reservation) = t.reservations.get_mut(&id) {
                    reservation.hold_expires_at = None;
                }
            }
            BookingStatus::Cancelled => {
                warn!(reservation = %id, "payment succeeded for a cancelled reservation");
            }
            // already past payment: redelivery or a late duplicate charge
            BookingStatus::Paid | BookingStatus::Confirmed | BookingStatus::Completed => {}
        }
        Ok(())
    }
}

/// An event naming a different session than the current one belongs to an
/// earlier, replaced attempt.
fn superseded(current: Option<&str>, seen: Option<&str>) -> bool {
    matches!((current, seen), (Some(current), Some(seen)) if current != seen)
}

fn apply_metadata(settlement: &mut Settlement, event: &GatewayEvent, now: DateTime<Utc>) {
    let data = &event.data;
    if let Some(txn) = &data.transaction_id {
        settlement.transaction_id = Some(txn.clone());
    }
    if let Some(amount) = data.amount {
        settlement.amount = amount;
    }
    if let Some(currency) = &data.currency {
        settlement.currency = currency.clone();
    }
    if let Some(brand) = &data.card_brand {
        settlement.card_brand = Some(brand.clone());
    }
    if let Some(last4) = &data.card_last4 {
        settlement.card_last4 = Some(last4.clone());
    }
    if event.kind() == EventKind::Failed {
        settlement.last_error = data.message.clone().or(Some("payment failed".to_string()));
    }
    settlement.last_event_at = Some(
        settlement
            .last_event_at
            .map_or(event.created, |at| at.max(event.created)),
    );
    settlement.updated_at = now;
}
