//! Commission and subscription checkout
//!
//! The engine only prepares the charge: a hosted checkout session is opened
//! with the payment provider and a pending transaction is recorded. Whatever
//! the provider does afterwards never touches request or offer state.
use crate::directory::{self, Directory};
use crate::error::{MarketError, MarketResult};
use crate::model::Settlement;
use crate::negotiation::{accepted_offer, require_request};
use crate::store::{self, Store};
use crate::types::{Amount, Role, TimeStamp};
use crate::utils;
use chrono::Utc;
use std::sync::Arc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentKind {
    #[n(0)]
    Subscription,
    #[n(1)]
    Commission,
}

impl PaymentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentKind::Subscription => "subscription",
            PaymentKind::Commission => "commission",
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Paid,
    #[n(2)]
    Failed,
    #[n(3)]
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub amount: Amount,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

/// Hosted-checkout provider.
pub trait PaymentGateway: Send + Sync {
    fn create_session(&self, request: &CheckoutRequest) -> anyhow::Result<CheckoutSession>;
    fn session_status(&self, session_id: &str) -> anyhow::Result<PaymentStatus>;
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct PaymentTransaction {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub user_id: String,
    #[n(2)]
    pub session_id: String,
    #[n(3)]
    pub amount: Amount,
    #[n(4)]
    pub currency: String,
    #[n(5)]
    pub kind: PaymentKind,
    #[n(6)]
    pub status: PaymentStatus,
    #[n(7)]
    pub metadata: Vec<(String, String)>,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
    #[n(9)]
    pub updated_at: TimeStamp<Utc>,
}

/// Deployment settings for checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingSettings {
    pub currency: String,
    pub subscription_price: Amount,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            currency: "eur".to_string(),
            subscription_price: Amount::from_minor(499),
        }
    }
}

#[derive(Clone)]
pub struct BillingService {
    store: Store,
    directory: Arc<dyn Directory>,
    gateway: Arc<dyn PaymentGateway>,
    settings: BillingSettings,
}

impl BillingService {
    pub fn new(
        store: Store,
        directory: Arc<dyn Directory>,
        gateway: Arc<dyn PaymentGateway>,
        settings: BillingSettings,
    ) -> Self {
        Self {
            store,
            directory,
            gateway,
            settings,
        }
    }

    /// Open a checkout session for the commission owed on `request_id`.
    pub fn checkout_commission(
        &self,
        request_id: &str,
        actor: &str,
        origin_url: &str,
    ) -> MarketResult<(CheckoutSession, PaymentTransaction)> {
        let request = require_request(&self.store, request_id)?;
        let settlement: Settlement =
            store::get(&self.store.settlements, request_id)?.ok_or_else(|| {
                MarketError::InvalidState(format!(
                    "request {request_id} has no accepted offer to bill"
                ))
            })?;

        let is_carrier = accepted_offer(&self.store, &request)?
            .is_some_and(|offer| offer.transporter_id == actor);
        if request.client_id != actor && !is_carrier {
            return Err(MarketError::Forbidden(format!(
                "no permission to pay the commission of request {request_id}"
            )));
        }

        // one live charge per settlement; failed or expired sessions may be retried
        if let Some(open) = self.commission_in_flight(request_id)? {
            return Err(MarketError::Conflict(format!(
                "commission of request {request_id} already has {:?} session {}",
                open.status, open.session_id
            )));
        }

        let metadata = vec![
            ("request_id".to_string(), request_id.to_string()),
            ("payment_type".to_string(), PaymentKind::Commission.as_str().to_string()),
            ("user_id".to_string(), actor.to_string()),
        ];
        self.open_checkout(
            actor,
            settlement.commission,
            PaymentKind::Commission,
            origin_url,
            metadata,
        )
    }

    fn commission_in_flight(&self, request_id: &str) -> MarketResult<Option<PaymentTransaction>> {
        let payments: Vec<PaymentTransaction> = store::scan(&self.store.payments)?;
        Ok(payments.into_iter().find(|p| {
            p.kind == PaymentKind::Commission
                && matches!(p.status, PaymentStatus::Pending | PaymentStatus::Paid)
                && p.metadata
                    .iter()
                    .any(|(k, v)| k == "request_id" && v == request_id)
        }))
    }

    /// Monthly subscription checkout. Transporters only.
    pub fn checkout_subscription(
        &self,
        actor: &str,
        origin_url: &str,
    ) -> MarketResult<(CheckoutSession, PaymentTransaction)> {
        let user = directory::require_role(
            self.directory.as_ref(),
            actor,
            Role::Transporter,
            "subscribe",
        )?;
        let metadata = vec![
            ("payment_type".to_string(), PaymentKind::Subscription.as_str().to_string()),
            ("user_id".to_string(), user.id.clone()),
        ];
        self.open_checkout(
            &user.id,
            self.settings.subscription_price,
            PaymentKind::Subscription,
            origin_url,
            metadata,
        )
    }

    fn open_checkout(
        &self,
        user_id: &str,
        amount: Amount,
        kind: PaymentKind,
        origin_url: &str,
        metadata: Vec<(String, String)>,
    ) -> MarketResult<(CheckoutSession, PaymentTransaction)> {
        let origin = origin_url.trim_end_matches('/');
        let checkout = CheckoutRequest {
            amount,
            currency: self.settings.currency.clone(),
            success_url: format!("{origin}/payment/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{origin}/payment/cancel"),
            metadata: metadata.clone(),
        };

        let session = self.gateway.create_session(&checkout).map_err(|e| {
            tracing::error!(
                user_id,
                kind = kind.as_str(),
                error = %e,
                "checkout session creation failed"
            );
            MarketError::Payment(e.to_string())
        })?;

        let now = TimeStamp::new();
        let transaction = PaymentTransaction {
            id: utils::new_id("pay_")?,
            user_id: user_id.to_string(),
            session_id: session.session_id.clone(),
            amount,
            currency: self.settings.currency.clone(),
            kind,
            status: PaymentStatus::Pending,
            metadata,
            created_at: now.clone(),
            updated_at: now,
        };
        store::put(&self.store.payments, &transaction.session_id, &transaction)?;
        tracing::info!(
            user_id,
            session_id = %transaction.session_id,
            amount = %amount,
            kind = kind.as_str(),
            "checkout session opened"
        );

        Ok((session, transaction))
    }

    /// Ask the provider for the current status and store it.
    pub fn refresh_payment(
        &self,
        session_id: &str,
        actor: &str,
    ) -> MarketResult<PaymentTransaction> {
        let transaction = self.transaction(session_id)?;
        if transaction.user_id != actor {
            return Err(MarketError::Forbidden(format!(
                "payment session {session_id} belongs to another user"
            )));
        }
        let status = self
            .gateway
            .session_status(session_id)
            .map_err(|e| MarketError::Payment(e.to_string()))?;
        self.apply_status(transaction, status)
    }

    /// Status pushed by the provider.
    pub fn apply_webhook(
        &self,
        session_id: &str,
        status: PaymentStatus,
    ) -> MarketResult<PaymentTransaction> {
        let transaction = self.transaction(session_id)?;
        self.apply_status(transaction, status)
    }

    fn apply_status(
        &self,
        mut transaction: PaymentTransaction,
        status: PaymentStatus,
    ) -> MarketResult<PaymentTransaction> {
        // paid is final; late or replayed updates must not undo it
        if transaction.status == PaymentStatus::Paid || transaction.status == status {
            return Ok(transaction);
        }
        transaction.status = status;
        transaction.updated_at = TimeStamp::new();
        store::put(&self.store.payments, &transaction.session_id, &transaction)?;
        tracing::info!(session_id = %transaction.session_id, ?status, "payment status updated");

        Ok(transaction)
    }

    pub fn transaction(&self, session_id: &str) -> MarketResult<PaymentTransaction> {
        store::get(&self.store.payments, session_id)?
            .ok_or_else(|| MarketError::NotFound(format!("payment session {session_id}")))
    }

    /// Newest first.
    pub fn payments_for(&self, user_id: &str) -> MarketResult<Vec<PaymentTransaction>> {
        let mut payments: Vec<PaymentTransaction> = store::scan(&self.store.payments)?;
        payments.retain(|p| p.user_id == user_id);
        payments.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(payments)
    }
}
