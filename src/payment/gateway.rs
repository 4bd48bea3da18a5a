//! Payment gateway abstraction.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use thiserror::Error;
use tracing::info;

use crate::Amount;
use crate::model::ReservationId;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("currency '{0}' is not supported by the gateway")]
    UnsupportedCurrency(String),

    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    #[error("gateway rejected the session: {0}")]
    Rejected(String),

    #[error("payment gateway is not configured")]
    NotConfigured,
}

impl GatewayError {
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::NotConfigured => 503,
            GatewayError::UnsupportedCurrency(_)
            | GatewayError::Unavailable(_)
            | GatewayError::Rejected(_) => 502,
        }
    }
}

/// What the gateway needs to open a hosted checkout for one reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    /// Echoed back in webhook events as correlation metadata.
    pub reservation: ReservationId,
    pub reference: String,
    pub amount: Amount,
    pub currency: String,
    pub customer_email: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub intent_id: Option<String>,
    pub redirect_url: String,
}

/// Hosted-checkout payment processor.
pub trait PaymentGateway: Send + Sync {
    fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<CheckoutSession>> + Send>>;
}

/// In-memory gateway that accepts a fixed set of currencies.
///
/// Records every request it sees; a failure can be queued for the next call.
#[derive(Debug)]
pub struct MockGateway {
    currencies: Vec<String>,
    counter: AtomicU64,
    requests: Mutex<Vec<CheckoutRequest>>,
    next_failure: Mutex<Option<GatewayError>>,
}

impl MockGateway {
    pub fn new<I, S>(currencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            currencies: currencies.into_iter().map(Into::into).collect(),
            counter: AtomicU64::new(0),
            requests: Mutex::new(Vec::new()),
            next_failure: Mutex::new(None),
        }
    }

    /// Make the next call fail with `error`.
    pub fn fail_next(&self, error: GatewayError) {
        *self
            .next_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(error);
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn respond(&self, request: &CheckoutRequest) -> GatewayResult<CheckoutSession> {
        if let Some(error) = self
            .next_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            return Err(error);
        }
        if !self
            .currencies
            .iter()
            .any(|c| c.eq_ignore_ascii_case(&request.currency))
        {
            return Err(GatewayError::UnsupportedCurrency(request.currency.clone()));
        }
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(CheckoutSession {
            session_id: format!("cs_mock_{n}"),
            intent_id: Some(format!("pi_mock_{n}")),
            redirect_url: format!("https://checkout.mock/pay/cs_mock_{n}"),
        })
    }
}

impl PaymentGateway for MockGateway {
    fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Pin<Box<dyn Future<Output = GatewayResult<CheckoutSession>> + Send>> {
        let result = self.respond(&request);
        if let Ok(session) = &result {
            info!(
                reservation = %request.reservation,
                amount = request.amount.cents(),
                currency = %request.currency,
                session = %session.session_id,
                "mock checkout session created"
            );
        }
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        Box::pin(async move { result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(currency: &str) -> CheckoutRequest {
        CheckoutRequest {
            reservation: 1,
            reference: "BK-TEST0001".to_string(),
            amount: Amount::from_units(726),
            currency: currency.to_string(),
            customer_email: "guest@example.com".to_string(),
            success_url: "https://hotel.test/ok".to_string(),
            cancel_url: "https://hotel.test/cancel".to_string(),
        }
    }

    #[tokio::test]
    async fn mock_issues_distinct_sessions() {
        let gateway = MockGateway::new(["usd"]);
        let a = gateway.create_checkout_session(request("usd")).await.unwrap();
        let b = gateway.create_checkout_session(request("USD")).await.unwrap();
        assert_ne!(a.session_id, b.session_id);
        assert!(a.redirect_url.ends_with(&a.session_id));
        assert_eq!(gateway.requests().len(), 2);
    }

    #[tokio::test]
    async fn mock_rejects_unknown_currency() {
        let gateway = MockGateway::new(["usd"]);
        let result = gateway.create_checkout_session(request("mxn")).await;
        assert_eq!(result, Err(GatewayError::UnsupportedCurrency("mxn".to_string())));
    }

    #[tokio::test]
    async fn queued_failure_applies_once() {
        let gateway = MockGateway::new(["usd"]);
        gateway.fail_next(GatewayError::Unavailable("timeout".to_string()));
        assert!(gateway.create_checkout_session(request("usd")).await.is_err());
        assert!(gateway.create_checkout_session(request("usd")).await.is_ok());
    }

    #[test]
    fn status_codes() {
        assert_eq!(GatewayError::NotConfigured.status_code(), 503);
        assert_eq!(GatewayError::Rejected("card".into()).status_code(), 502);
    }
}
