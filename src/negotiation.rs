//! Request and offer lifecycle
//!
//! ```text
//! Request: open ──▶ negotiating ──▶ accepted ──▶ in_transit ──▶ completed
//!          (any state) ──cancel_request()──▶ cancelled
//! Offer:   pending ──▶ accepted | rejected
//! ```
//!
//! Acceptance lives in [`crate::resolution`]; everything else that moves a
//! request or an offer goes through [`NegotiationService`].
use crate::directory::{self, Directory};
use crate::error::{MarketError, MarketResult};
use crate::model::{Offer, OfferKind, OfferStatus, Request, RequestDraft, RequestStatus};
use crate::notify::{self, NotificationKind, Notifier};
use crate::store::{self, Store};
use crate::types::{Amount, Role, TimeStamp};
use crate::utils;
use sled::Transactional;
use sled::transaction::{ConflictableTransactionResult, TransactionalTree, abort};
use std::sync::Arc;

/// How `update_request_status` treats the requested transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransitionPolicy {
    /// Any status may be set by an authorized actor.
    #[default]
    Permissive,
    /// Only transitions allowed by [`RequestStatus::can_advance_to`].
    Strict,
}

impl std::str::FromStr for TransitionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "permissive" => Ok(TransitionPolicy::Permissive),
            "strict" => Ok(TransitionPolicy::Strict),
            other => Err(format!(
                "invalid transition policy '{other}'. Expected: permissive or strict"
            )),
        }
    }
}

#[derive(Clone)]
pub struct NegotiationService {
    store: Store,
    directory: Arc<dyn Directory>,
    notifier: Arc<dyn Notifier>,
    policy: TransitionPolicy,
}

/// The offer currently holding `accepted` for `request`, if any.
pub(crate) fn accepted_offer(store: &Store, request: &Request) -> MarketResult<Option<Offer>> {
    for offer_id in &request.offer_ids {
        let offer: Option<Offer> = store::get(&store.offers, offer_id)?;
        if let Some(offer) = offer.filter(|o| o.status == OfferStatus::Accepted) {
            return Ok(Some(offer));
        }
    }
    Ok(None)
}

fn tx_accepted_offer(
    offers: &TransactionalTree,
    request: &Request,
) -> ConflictableTransactionResult<Option<Offer>, MarketError> {
    for offer_id in &request.offer_ids {
        let offer: Option<Offer> = store::tx_get(offers, offer_id)?;
        if let Some(offer) = offer.filter(|o| o.status == OfferStatus::Accepted) {
            return Ok(Some(offer));
        }
    }
    Ok(None)
}

pub(crate) fn require_request(store: &Store, request_id: &str) -> MarketResult<Request> {
    store::get(&store.requests, request_id)?
        .ok_or_else(|| MarketError::NotFound(format!("request {request_id}")))
}

fn require_text(field: &str, value: &str) -> MarketResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(MarketError::InvalidArgument(format!("{field} must not be blank")));
    }
    Ok(value.to_string())
}

impl NegotiationService {
    pub fn new(
        store: Store,
        directory: Arc<dyn Directory>,
        notifier: Arc<dyn Notifier>,
        policy: TransitionPolicy,
    ) -> Self {
        Self {
            store,
            directory,
            notifier,
            policy,
        }
    }

    /// Post a new transport request. Only clients may do this.
    pub fn create_request(&self, actor: &str, draft: RequestDraft) -> MarketResult<Request> {
        let client = directory::require_role(
            self.directory.as_ref(),
            actor,
            Role::Client,
            "create requests",
        )?;

        if !draft.offered_price.is_positive() {
            return Err(MarketError::InvalidArgument(
                "offered price must be positive".into(),
            ));
        }

        let request = Request {
            id: utils::new_id("req_")?,
            client_id: client.id,
            client_name: client.name,
            title: require_text("title", &draft.title)?,
            description: draft.description.trim().to_string(),
            origin: require_text("origin", &draft.origin)?,
            destination: require_text("destination", &draft.destination)?,
            cargo_type: require_text("cargo type", &draft.cargo_type)?,
            offered_price: draft.offered_price,
            status: RequestStatus::Open,
            created_at: TimeStamp::new(),
            offer_ids: vec![],
        };
        store::put(&self.store.requests, &request.id, &request)?;
        tracing::info!(request_id = %request.id, client_id = %request.client_id, "request created");

        Ok(request)
    }

    pub fn request(&self, request_id: &str) -> MarketResult<Request> {
        require_request(&self.store, request_id)
    }

    /// All requests, optionally narrowed to one status, newest first.
    pub fn list_requests(&self, status: Option<RequestStatus>) -> MarketResult<Vec<Request>> {
        let mut requests: Vec<Request> = store::scan(&self.store.requests)?;
        if let Some(status) = status {
            requests.retain(|r| r.status == status);
        }
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    pub fn requests_for_client(&self, client_id: &str) -> MarketResult<Vec<Request>> {
        let mut requests: Vec<Request> = store::scan(&self.store.requests)?;
        requests.retain(|r| r.client_id == client_id);
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(requests)
    }

    pub fn offer(&self, offer_id: &str) -> MarketResult<Offer> {
        store::get(&self.store.offers, offer_id)?
            .ok_or_else(|| MarketError::NotFound(format!("offer {offer_id}")))
    }

    pub fn offers_for_request(&self, request_id: &str) -> MarketResult<Vec<Offer>> {
        let request = require_request(&self.store, request_id)?;
        let mut offers = Vec::with_capacity(request.offer_ids.len());
        for offer_id in &request.offer_ids {
            if let Some(offer) = store::get::<Offer>(&self.store.offers, offer_id)? {
                offers.push(offer);
            }
        }
        offers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(offers)
    }

    pub fn offers_by_transporter(&self, transporter_id: &str) -> MarketResult<Vec<Offer>> {
        let mut offers: Vec<Offer> = store::scan(&self.store.offers)?;
        offers.retain(|o| o.transporter_id == transporter_id);
        offers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(offers)
    }

    /// Bid on a request that is still open or negotiating.
    pub fn submit_offer(
        &self,
        request_id: &str,
        bidder: &str,
        price: Amount,
        message: Option<String>,
        kind: OfferKind,
    ) -> MarketResult<Offer> {
        let transporter = directory::require_role(
            self.directory.as_ref(),
            bidder,
            Role::Transporter,
            "submit offers",
        )?;
        if !price.is_positive() {
            return Err(MarketError::InvalidArgument("offer price must be positive".into()));
        }

        let offer = Offer {
            id: utils::new_id("offer_")?,
            request_id: request_id.to_string(),
            transporter_id: transporter.id,
            transporter_name: transporter.name,
            price,
            message: message.map(|m| m.trim().to_string()).filter(|m| !m.is_empty()),
            kind,
            status: OfferStatus::Pending,
            created_at: TimeStamp::new(),
        };

        // the offer and the request's offer index move together, so an offer can
        // never land on a request that was resolved in between
        let request = (&self.store.requests, &self.store.offers).transaction(
            |(requests, offers)| -> ConflictableTransactionResult<Request, MarketError> {
                let Some(mut request) = store::tx_get::<Request>(requests, request_id)? else {
                    return abort(MarketError::NotFound(format!("request {request_id}")));
                };
                if !request.status.is_negotiable() {
                    return abort(MarketError::InvalidState(format!(
                        "request {request_id} is {} and no longer takes offers",
                        request.status.as_str()
                    )));
                }

                request.offer_ids.push(offer.id.clone());
                if request.status == RequestStatus::Open {
                    request.status = RequestStatus::Negotiating;
                }
                store::tx_put(requests, &request.id, &request)?;
                store::tx_put(offers, &offer.id, &offer)?;

                Ok(request)
            },
        )?;

        tracing::info!(
            request_id,
            offer_id = %offer.id,
            transporter_id = %offer.transporter_id,
            price = %offer.price,
            "offer submitted"
        );
        self.notifier.notify(
            &request.client_id,
            NotificationKind::NewOffer,
            "Nueva oferta",
            &format!(
                "{} ofrece {} por \"{}\"",
                offer.transporter_name, offer.price, request.title
            ),
            notify::request_link(&request.id),
        );

        Ok(offer)
    }

    /// Turn down a single pending offer. Rejecting twice is a no-op.
    pub fn reject_offer(&self, offer_id: &str, actor: &str) -> MarketResult<Offer> {
        let (offer, changed) = (&self.store.requests, &self.store.offers).transaction(
            |(requests, offers)| -> ConflictableTransactionResult<(Offer, bool), MarketError> {
                let Some(mut offer) = store::tx_get::<Offer>(offers, offer_id)? else {
                    return abort(MarketError::NotFound(format!("offer {offer_id}")));
                };
                let Some(request) = store::tx_get::<Request>(requests, &offer.request_id)? else {
                    return abort(MarketError::NotFound(format!("request {}", offer.request_id)));
                };
                if request.client_id != actor {
                    return abort(MarketError::Forbidden(
                        "only the client who posted the request may reject offers".into(),
                    ));
                }

                let status = offer.status;
                match status {
                    OfferStatus::Rejected => Ok((offer, false)),
                    OfferStatus::Accepted => abort(MarketError::InvalidState(format!(
                        "offer {offer_id} has already been accepted"
                    ))),
                    OfferStatus::Pending => {
                        offer.status = OfferStatus::Rejected;
                        store::tx_put(offers, &offer.id, &offer)?;
                        Ok((offer, true))
                    }
                }
            },
        )?;

        if changed {
            tracing::info!(offer_id, request_id = %offer.request_id, "offer rejected");
            self.notifier.notify(
                &offer.transporter_id,
                NotificationKind::OfferRejected,
                "Oferta rechazada",
                &format!("Tu oferta de {} ha sido rechazada", offer.price),
                notify::request_link(&offer.request_id),
            );
        }

        Ok(offer)
    }

    /// Move a request to `new_status`. Allowed for the owning client and the
    /// transporter holding the accepted offer.
    pub fn update_request_status(
        &self,
        request_id: &str,
        actor: &str,
        new_status: RequestStatus,
    ) -> MarketResult<Request> {
        let policy = self.policy;
        let (request, carrier) = (&self.store.requests, &self.store.offers).transaction(
            |(requests, offers)| -> store::TxResult<(Request, Option<Offer>)> {
                let Some(mut request) = store::tx_get::<Request>(requests, request_id)? else {
                    return abort(MarketError::NotFound(format!("request {request_id}")));
                };
                let carrier = tx_accepted_offer(offers, &request)?;
                let is_carrier = carrier.as_ref().is_some_and(|o| o.transporter_id == actor);
                if request.client_id != actor && !is_carrier {
                    return abort(MarketError::Forbidden(format!(
                        "no permission to update request {request_id}"
                    )));
                }
                let strict = policy == TransitionPolicy::Strict;
                if strict && !request.status.can_advance_to(new_status) {
                    return abort(MarketError::InvalidState(format!(
                        "cannot move request from {} to {}",
                        request.status.as_str(),
                        new_status.as_str()
                    )));
                }

                request.status = new_status;
                store::tx_put(requests, &request.id, &request)?;

                Ok((request, carrier))
            },
        )?;

        tracing::info!(request_id, actor, status = new_status.as_str(), "request status updated");

        let counterparty = if request.client_id == actor {
            carrier.map(|o| o.transporter_id)
        } else {
            Some(request.client_id.clone())
        };
        if let Some(recipient) = counterparty {
            self.notifier.notify(
                &recipient,
                NotificationKind::StatusChanged,
                "Estado actualizado",
                &format!("\"{}\" ahora está {}", request.title, new_status.as_str()),
                notify::request_link(&request.id),
            );
        }

        Ok(request)
    }

    /// Soft-delete: the request is marked cancelled whatever its current state.
    pub fn cancel_request(&self, request_id: &str, actor: &str) -> MarketResult<Request> {
        let request = self.store.requests.transaction(
            |requests| -> ConflictableTransactionResult<Request, MarketError> {
                let Some(mut request) = store::tx_get::<Request>(requests, request_id)? else {
                    return abort(MarketError::NotFound(format!("request {request_id}")));
                };
                if request.client_id != actor {
                    return abort(MarketError::Forbidden(
                        "only the client who posted the request may cancel it".into(),
                    ));
                }
                request.status = RequestStatus::Cancelled;
                store::tx_put(requests, &request.id, &request)?;
                Ok(request)
            },
        )?;

        tracing::info!(request_id, "request cancelled");

        let mut notified: Vec<String> = Vec::new();
        for offer in self.offers_for_request(request_id)? {
            if offer.status == OfferStatus::Rejected || notified.contains(&offer.transporter_id) {
                continue;
            }
            self.notifier.notify(
                &offer.transporter_id,
                NotificationKind::StatusChanged,
                "Solicitud cancelada",
                &format!("El cliente ha cancelado \"{}\"", request.title),
                notify::request_link(&request.id),
            );
            notified.push(offer.transporter_id);
        }

        Ok(request)
    }
}
