//! Ratings and the per-user reputation aggregate
use crate::directory::{self, Directory};
use crate::error::{MarketError, MarketResult};
use crate::model::{Rating, RequestStatus, Reputation};
use crate::negotiation::{accepted_offer, require_request};
use crate::notify::{self, NotificationKind, Notifier};
use crate::store::{self, Store};
use crate::types::TimeStamp;
use crate::utils;
use rust_decimal::{Decimal, RoundingStrategy};
use sled::Transactional;
use sled::transaction::{ConflictableTransactionResult, abort};
use std::collections::BTreeSet;
use std::sync::Arc;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 5;

#[derive(Clone)]
pub struct RatingAggregator {
    store: Store,
    directory: Arc<dyn Directory>,
    notifier: Arc<dyn Notifier>,
}

/// Arithmetic mean of `scores`, half-to-even at two decimals.
pub fn mean_score(scores: &[u8]) -> Decimal {
    if scores.is_empty() {
        return Decimal::ZERO;
    }
    let total: u64 = scores.iter().map(|s| u64::from(*s)).sum();
    (Decimal::from(total) / Decimal::from(scores.len() as u64))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointNearestEven)
}

impl RatingAggregator {
    pub fn new(store: Store, directory: Arc<dyn Directory>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            directory,
            notifier,
        }
    }

    /// Rate the counterpart of a completed negotiation. Only the request's
    /// client and its accepted transporter may rate, each the other, once.
    pub fn submit_rating(
        &self,
        rater: &str,
        ratee: &str,
        request_id: &str,
        score: u8,
        comment: Option<String>,
    ) -> MarketResult<Rating> {
        let rater = directory::require_user(self.directory.as_ref(), rater)?;
        let request = require_request(&self.store, request_id)?;
        let carrier = accepted_offer(&self.store, &request)?
            .map(|offer| offer.transporter_id)
            .ok_or_else(|| {
                MarketError::InvalidState(format!(
                    "request {request_id} never had an accepted transporter"
                ))
            })?;

        let client = request.client_id.as_str();
        let is_pair = rater.id != ratee
            && ((rater.id == client && ratee == carrier)
                || (rater.id == carrier && ratee == client));
        if !is_pair {
            return Err(MarketError::Forbidden(format!(
                "only the client and the transporter of request {request_id} may rate each other"
            )));
        }
        if request.status != RequestStatus::Completed {
            return Err(MarketError::InvalidState(format!(
                "request {request_id} is {} and cannot be rated yet",
                request.status.as_str()
            )));
        }

        let claim = store::compound_key(&rater.id, request_id);

        if self.store.rating_claims.contains_key(claim.as_bytes())? {
            return Err(MarketError::Conflict(format!(
                "request {request_id} has already been rated by this user"
            )));
        }
        if !(MIN_SCORE..=MAX_SCORE).contains(&score) {
            return Err(MarketError::InvalidArgument(format!(
                "score must be between {MIN_SCORE} and {MAX_SCORE}, got {score}"
            )));
        }

        let rating = Rating {
            id: utils::new_id("rate_")?,
            rater_id: rater.id.clone(),
            rater_name: rater.name.clone(),
            ratee_id: ratee.to_string(),
            request_id: request_id.to_string(),
            score,
            comment: comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            created_at: TimeStamp::new(),
        };

        // the claim check above is advisory; this is the one that holds under races
        (&self.store.rating_claims, &self.store.ratings).transaction(
            |(claims, ratings)| -> ConflictableTransactionResult<(), MarketError> {
                if claims.get(claim.as_bytes())?.is_some() {
                    return abort(MarketError::Conflict(format!(
                        "request {request_id} has already been rated by this user"
                    )));
                }
                claims.insert(claim.as_bytes(), rating.id.as_bytes())?;
                store::tx_put(ratings, &store::compound_key(ratee, &rating.id), &rating)?;
                Ok(())
            },
        )?;

        tracing::info!(
            rating_id = %rating.id,
            rater_id = %rating.rater_id,
            ratee_id = ratee,
            request_id,
            score,
            "rating stored"
        );

        // the rating stands even if the aggregate lags behind; it is recomputed in full next time
        if let Err(e) = self.recompute_reputation(ratee) {
            tracing::warn!(
                ratee_id = ratee,
                error = %e,
                "reputation recompute failed, left for reconciliation"
            );
        }

        self.notifier.notify(
            ratee,
            NotificationKind::NewRating,
            "Nueva valoración",
            &format!("{} te ha valorado con {} estrellas", rating.rater_name, rating.score),
            notify::request_link(request_id),
        );

        Ok(rating)
    }

    /// Rebuild `user_id`'s aggregate from every rating they have received.
    pub fn recompute_reputation(&self, user_id: &str) -> MarketResult<Reputation> {
        let ratings: Vec<Rating> = store::scan_prefix(&self.store.ratings, user_id)?;
        let scores: Vec<u8> = ratings.iter().map(|r| r.score).collect();

        let reputation = Reputation {
            average: mean_score(&scores),
            count: scores.len() as u64,
        };
        store::put(&self.store.reputations, user_id, &reputation)?;
        tracing::debug!(
            user_id,
            average = %reputation.average,
            count = reputation.count,
            "reputation recomputed"
        );

        Ok(reputation)
    }

    /// Recompute every rated user. Returns how many aggregates were rebuilt.
    pub fn reconcile_all(&self) -> MarketResult<usize> {
        let mut ratees = BTreeSet::new();
        for key in self.store.ratings.iter().keys() {
            let key = key?;
            let key = String::from_utf8_lossy(&key);
            if let Some((ratee, _)) = key.split_once('/') {
                ratees.insert(ratee.to_string());
            }
        }

        for ratee in &ratees {
            self.recompute_reputation(ratee)?;
        }
        tracing::info!(users = ratees.len(), "reputations reconciled");

        Ok(ratees.len())
    }

    pub fn reputation(&self, user_id: &str) -> MarketResult<Reputation> {
        Ok(store::get(&self.store.reputations, user_id)?.unwrap_or_default())
    }

    /// Newest first.
    pub fn ratings_for(&self, user_id: &str) -> MarketResult<Vec<Rating>> {
        let mut ratings: Vec<Rating> = store::scan_prefix(&self.store.ratings, user_id)?;
        ratings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(ratings)
    }
}
