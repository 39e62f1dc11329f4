//! Offer acceptance
//!
//! Accepting an offer touches the request, every offer on it and the
//! settlement tree. All of it runs in one sled transaction: if two clients race
//! to accept different offers on the same request, sled re-runs the loser's
//! closure, which then finds the request already `accepted` and aborts with
//! `Conflict`.
use crate::error::{MarketError, MarketResult};
use crate::model::{COMMISSION_RATE, Offer, OfferStatus, Request, RequestStatus, Settlement};
use crate::notify::{self, NotificationKind, Notifier};
use crate::store::{self, Store};
use crate::types::TimeStamp;
use sled::Transactional;
use sled::transaction::abort;
use std::sync::Arc;

/// Everything that changed when an offer was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub request: Request,
    pub accepted: Offer,
    /// Offers that were still pending and got rejected by this acceptance.
    pub rejected: Vec<Offer>,
    pub settlement: Settlement,
}

#[derive(Clone)]
pub struct OfferResolution {
    store: Store,
    notifier: Arc<dyn Notifier>,
}

impl OfferResolution {
    pub fn new(store: Store, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub fn accept_offer(&self, offer_id: &str, actor: &str) -> MarketResult<Resolution> {
        let store = &self.store;
        let resolution = (&store.requests, &store.offers, &store.settlements).transaction(
            |(requests, offers, settlements)| -> store::TxResult<Resolution> {
                let Some(mut accepted) = store::tx_get::<Offer>(offers, offer_id)? else {
                    return abort(MarketError::NotFound(format!("offer {offer_id}")));
                };
                let request_id = accepted.request_id.clone();
                let Some(mut request) = store::tx_get::<Request>(requests, &request_id)? else {
                    return abort(MarketError::NotFound(format!("request {request_id}")));
                };
                if request.client_id != actor {
                    return abort(MarketError::Forbidden(
                        "only the client who posted the request may accept offers".into(),
                    ));
                }
                if request.status.is_resolved() {
                    return abort(MarketError::Conflict(format!(
                        "request {} already has an accepted offer",
                        request.id
                    )));
                }
                if request.status == RequestStatus::Cancelled {
                    return abort(MarketError::InvalidState(format!(
                        "request {} has been cancelled",
                        request.id
                    )));
                }
                if accepted.status != OfferStatus::Pending {
                    return abort(MarketError::InvalidState(format!(
                        "offer {offer_id} is no longer pending"
                    )));
                }
                if settlements.get(request.id.as_bytes())?.is_some() {
                    return abort(MarketError::Conflict(format!(
                        "request {} has already been settled",
                        request.id
                    )));
                }

                let mut rejected = Vec::new();
                for other_id in request.offer_ids.iter().filter(|id| id.as_str() != offer_id) {
                    let Some(mut other) = store::tx_get::<Offer>(offers, other_id)? else {
                        continue;
                    };
                    if other.status == OfferStatus::Pending {
                        other.status = OfferStatus::Rejected;
                        store::tx_put(offers, &other.id, &other)?;
                        rejected.push(other);
                    }
                }

                accepted.status = OfferStatus::Accepted;
                store::tx_put(offers, &accepted.id, &accepted)?;

                request.status = RequestStatus::Accepted;
                store::tx_put(requests, &request.id, &request)?;

                let settlement = Settlement {
                    request_id: request.id.clone(),
                    offer_id: accepted.id.clone(),
                    client_id: request.client_id.clone(),
                    transporter_id: accepted.transporter_id.clone(),
                    gross: accepted.price,
                    commission: accepted.price.share(COMMISSION_RATE),
                    created_at: TimeStamp::new(),
                };
                store::tx_put(settlements, &settlement.request_id, &settlement)?;

                Ok(Resolution {
                    request,
                    accepted,
                    rejected,
                    settlement,
                })
            },
        )?;

        tracing::info!(
            request_id = %resolution.request.id,
            offer_id,
            transporter_id = %resolution.accepted.transporter_id,
            gross = %resolution.settlement.gross,
            commission = %resolution.settlement.commission,
            rejected = resolution.rejected.len(),
            "offer accepted"
        );

        let link = notify::request_link(&resolution.request.id);
        self.notifier.notify(
            &resolution.accepted.transporter_id,
            NotificationKind::OfferAccepted,
            "Oferta aceptada",
            &format!(
                "Tu oferta de {} para \"{}\" ha sido aceptada",
                resolution.accepted.price, resolution.request.title
            ),
            link.clone(),
        );
        for offer in &resolution.rejected {
            if offer.transporter_id == resolution.accepted.transporter_id {
                continue;
            }
            self.notifier.notify(
                &offer.transporter_id,
                NotificationKind::OfferRejected,
                "Oferta rechazada",
                &format!("\"{}\" se ha adjudicado a otra oferta", resolution.request.title),
                link.clone(),
            );
        }

        Ok(resolution)
    }

    pub fn settlement(&self, request_id: &str) -> MarketResult<Option<Settlement>> {
        store::get(&self.store.settlements, request_id)
    }
}
