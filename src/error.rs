use sled::transaction::TransactionError;

pub type MarketResult<T> = Result<T, MarketError>;

#[derive(thiserror::Error, Debug)]
pub enum MarketError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Operation not allowed in the current state: {0}")]
    InvalidState(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("Failed to encode or decode a record: {0}")]
    Codec(String),
    #[error("Payment provider failure: {0}")]
    Payment(String),
}

impl MarketError {
    /// Stable code for the calling layer to map onto its own transport.
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::NotFound(_) => "NOT_FOUND",
            MarketError::Forbidden(_) => "FORBIDDEN",
            MarketError::InvalidState(_) => "INVALID_STATE",
            MarketError::InvalidArgument(_) => "INVALID_ARGUMENT",
            MarketError::Conflict(_) => "CONFLICT",
            MarketError::Storage(_) => "STORAGE_ERROR",
            MarketError::Codec(_) => "CODEC_ERROR",
            MarketError::Payment(_) => "PAYMENT_ERROR",
        }
    }

    /// Domain failures are the caller's to render; the rest are infrastructure.
    pub fn is_domain(&self) -> bool {
        !matches!(
            self,
            MarketError::Storage(_) | MarketError::Codec(_) | MarketError::Payment(_)
        )
    }
}

impl From<TransactionError<MarketError>> for MarketError {
    fn from(value: TransactionError<MarketError>) -> Self {
        match value {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => MarketError::Storage(err),
        }
    }
}

impl From<minicbor::decode::Error> for MarketError {
    fn from(value: minicbor::decode::Error) -> Self {
        MarketError::Codec(value.to_string())
    }
}

impl<E: std::fmt::Display> From<minicbor::encode::Error<E>> for MarketError {
    fn from(value: minicbor::encode::Error<E>) -> Self {
        MarketError::Codec(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aborted_transactions_surface_the_domain_error() {
        let err: MarketError =
            TransactionError::Abort(MarketError::Conflict("already accepted".into())).into();

        assert!(matches!(err, MarketError::Conflict(_)));
        assert_eq!(err.code(), "CONFLICT");
        assert!(err.is_domain());
    }
}
