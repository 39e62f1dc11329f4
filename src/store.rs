//! Persistence over sled trees, one tree per record collection
use crate::error::{MarketError, MarketResult};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionalTree,
};
use sled::{Db, Tree};
use std::path::Path;
use std::sync::Arc;

/// Handle to the marketplace database. Cloning shares the same underlying db.
#[derive(Clone)]
pub struct Store {
    instance: Arc<Db>,
    pub(crate) requests: Tree,
    pub(crate) offers: Tree,
    pub(crate) settlements: Tree,
    // rater/request -> rating id, guards one rating per pair
    pub(crate) rating_claims: Tree,
    // ratee/rating id -> rating
    pub(crate) ratings: Tree,
    pub(crate) reputations: Tree,
    // request/message id -> message
    pub(crate) messages: Tree,
    pub(crate) users: Tree,
    pub(crate) notifications: Tree,
    pub(crate) payments: Tree,
}

impl Store {
    pub fn new(instance: Arc<Db>) -> MarketResult<Self> {
        Ok(Self {
            requests: instance.open_tree("requests")?,
            offers: instance.open_tree("offers")?,
            settlements: instance.open_tree("settlements")?,
            rating_claims: instance.open_tree("rating_claims")?,
            ratings: instance.open_tree("ratings")?,
            reputations: instance.open_tree("reputations")?,
            messages: instance.open_tree("messages")?,
            users: instance.open_tree("users")?,
            notifications: instance.open_tree("notifications")?,
            payments: instance.open_tree("payments")?,
            instance,
        })
    }

    pub fn open(path: impl AsRef<Path>) -> MarketResult<Self> {
        let db = sled::open(path)?;
        tracing::debug!(recovered = db.was_recovered(), "database opened");
        Self::new(Arc::new(db))
    }

    /// Flush pending writes. Call before shutdown.
    pub fn flush(&self) -> MarketResult<()> {
        let bytes = self.instance.flush()?;
        tracing::debug!(bytes, "database flushed");
        Ok(())
    }
}

pub(crate) fn compound_key(head: &str, tail: &str) -> String {
    format!("{head}/{tail}")
}

pub(crate) fn encode<T: minicbor::Encode<()>>(value: &T) -> MarketResult<Vec<u8>> {
    Ok(minicbor::to_vec(value)?)
}

pub(crate) fn decode<T>(bytes: &[u8]) -> MarketResult<T>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    Ok(minicbor::decode(bytes)?)
}

pub(crate) fn get<T>(tree: &Tree, key: &str) -> MarketResult<Option<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    tree.get(key.as_bytes())?
        .map(|raw| decode(&raw))
        .transpose()
}

pub(crate) fn put<T: minicbor::Encode<()>>(tree: &Tree, key: &str, value: &T) -> MarketResult<()> {
    tree.insert(key.as_bytes(), encode(value)?)?;
    Ok(())
}

/// Decode every record in the tree, in key order.
pub(crate) fn scan<T>(tree: &Tree) -> MarketResult<Vec<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    tree.iter()
        .values()
        .map(|raw| decode(&raw?))
        .collect()
}

pub(crate) fn scan_prefix<T>(tree: &Tree, prefix: &str) -> MarketResult<Vec<T>>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    tree.scan_prefix(format!("{prefix}/").as_bytes())
        .values()
        .map(|raw| decode(&raw?))
        .collect()
}

// transactional counterparts; decode/encode failures abort the transaction

pub(crate) type TxResult<T> = ConflictableTransactionResult<T, MarketError>;

pub(crate) fn tx_get<T>(
    tree: &TransactionalTree,
    key: &str,
) -> ConflictableTransactionResult<Option<T>, MarketError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tree.get(key.as_bytes())? {
        Some(raw) => decode(&raw)
            .map(Some)
            .map_err(ConflictableTransactionError::Abort),
        None => Ok(None),
    }
}

pub(crate) fn tx_put<T: minicbor::Encode<()>>(
    tree: &TransactionalTree,
    key: &str,
    value: &T,
) -> ConflictableTransactionResult<(), MarketError> {
    let bytes = encode(value).map_err(ConflictableTransactionError::Abort)?;
    tree.insert(key.as_bytes(), bytes)?;
    Ok(())
}
