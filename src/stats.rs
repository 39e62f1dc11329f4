//! Per-user dashboard counters
use crate::directory::{self, Directory};
use crate::error::MarketResult;
use crate::model::{Offer, OfferStatus, Request, RequestStatus};
use crate::store::{self, Store};
use crate::types::{Role, has_role};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    pub total_requests: usize,
    pub active_requests: usize,
    pub completed_requests: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransporterStats {
    pub total_offers: usize,
    pub accepted_offers: usize,
    pub pending_offers: usize,
}

/// Sections are present only for the roles the user holds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dashboard {
    pub client: Option<ClientStats>,
    pub transporter: Option<TransporterStats>,
}

#[derive(Clone)]
pub struct Stats {
    store: Store,
    directory: Arc<dyn Directory>,
}

impl Stats {
    pub fn new(store: Store, directory: Arc<dyn Directory>) -> Self {
        Self { store, directory }
    }

    pub fn dashboard(&self, actor: &str) -> MarketResult<Dashboard> {
        let user = directory::require_user(self.directory.as_ref(), actor)?;
        let mut dashboard = Dashboard::default();

        if has_role(&user, Role::Client) {
            let requests: Vec<Request> = store::scan(&self.store.requests)?;
            let mine = requests.iter().filter(|r| r.client_id == user.id);
            let mut stats = ClientStats::default();
            for request in mine {
                stats.total_requests += 1;
                if request.status.is_active() {
                    stats.active_requests += 1;
                }
                if request.status == RequestStatus::Completed {
                    stats.completed_requests += 1;
                }
            }
            dashboard.client = Some(stats);
        }

        if has_role(&user, Role::Transporter) {
            let offers: Vec<Offer> = store::scan(&self.store.offers)?;
            let mut stats = TransporterStats::default();
            for offer in offers.iter().filter(|o| o.transporter_id == user.id) {
                stats.total_offers += 1;
                match offer.status {
                    OfferStatus::Accepted => stats.accepted_offers += 1,
                    OfferStatus::Pending => stats.pending_offers += 1,
                    OfferStatus::Rejected => {}
                }
            }
            dashboard.transporter = Some(stats);
        }

        Ok(dashboard)
    }
}
