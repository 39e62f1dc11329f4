//! Service layer API for the marketplace
//!
//! [`Marketplace`] wires every component over one [`Store`] and the injected
//! collaborators. The calling layer authenticates users and passes their ids in
//! as `actor`.
use crate::billing::{BillingService, BillingSettings, PaymentGateway};
use crate::chat::ChatMediator;
use crate::config::Config;
use crate::directory::{Directory, StoredDirectory};
use crate::negotiation::{NegotiationService, TransitionPolicy};
use crate::notify::{NotificationOutbox, Notifier};
use crate::rating::RatingAggregator;
use crate::resolution::OfferResolution;
use crate::stats::Stats;
use crate::store::Store;
use std::sync::Arc;

/// External systems the marketplace talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn Directory>,
    pub notifier: Arc<dyn Notifier>,
    pub gateway: Arc<dyn PaymentGateway>,
}

#[derive(Clone)]
pub struct Marketplace {
    store: Store,
    negotiation: NegotiationService,
    resolution: OfferResolution,
    chat: ChatMediator,
    ratings: RatingAggregator,
    billing: BillingService,
    stats: Stats,
}

impl Marketplace {
    pub fn new(
        store: Store,
        collaborators: Collaborators,
        policy: TransitionPolicy,
        billing: BillingSettings,
    ) -> Self {
        let Collaborators {
            directory,
            notifier,
            gateway,
        } = collaborators;

        Self {
            negotiation: NegotiationService::new(
                store.clone(),
                directory.clone(),
                notifier.clone(),
                policy,
            ),
            resolution: OfferResolution::new(store.clone(), notifier.clone()),
            chat: ChatMediator::new(store.clone(), directory.clone(), notifier.clone()),
            ratings: RatingAggregator::new(store.clone(), directory.clone(), notifier),
            billing: BillingService::new(store.clone(), directory.clone(), gateway, billing),
            stats: Stats::new(store.clone(), directory),
            store,
        }
    }

    /// Use the sled-backed directory and notification outbox.
    pub fn with_stored_collaborators(
        store: Store,
        gateway: Arc<dyn PaymentGateway>,
        config: &Config,
    ) -> Self {
        let collaborators = Collaborators {
            directory: Arc::new(StoredDirectory::new(store.clone())),
            notifier: Arc::new(NotificationOutbox::new(store.clone())),
            gateway,
        };
        Self::new(store, collaborators, config.transition_policy, config.billing())
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn negotiation(&self) -> &NegotiationService {
        &self.negotiation
    }

    pub fn resolution(&self) -> &OfferResolution {
        &self.resolution
    }

    pub fn chat(&self) -> &ChatMediator {
        &self.chat
    }

    pub fn ratings(&self) -> &RatingAggregator {
        &self.ratings
    }

    pub fn billing(&self) -> &BillingService {
        &self.billing
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }
}
