//! Negotiation records as they are persisted
use crate::types::{Amount, TimeStamp};
use chrono::Utc;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Fraction of the accepted offer price owed to the platform.
pub const COMMISSION_RATE: Decimal = Decimal::from_parts(10, 0, 0, false, 2);

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestStatus {
    #[n(0)]
    Open,
    #[n(1)]
    Negotiating,
    #[n(2)]
    Accepted,
    #[n(3)]
    InTransit,
    #[n(4)]
    Completed,
    #[n(5)]
    Cancelled,
}

impl RequestStatus {
    /// Offers are only taken while the request is still being negotiated.
    pub fn is_negotiable(&self) -> bool {
        matches!(self, RequestStatus::Open | RequestStatus::Negotiating)
    }

    /// An offer has already been accepted for this request.
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            RequestStatus::Accepted | RequestStatus::InTransit | RequestStatus::Completed
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Cancelled)
    }

    /// Counts towards the "active" dashboard figure.
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Transition table applied under the strict
    /// [`TransitionPolicy`](crate::negotiation::TransitionPolicy).
    ///
    /// ```text
    /// open ──▶ negotiating ──▶ accepted ──▶ in_transit ──▶ completed
    ///   └──────────┴──────────────┴─────────────┴──▶ cancelled
    /// ```
    pub fn can_advance_to(&self, next: RequestStatus) -> bool {
        use RequestStatus::*;
        match (self, next) {
            (Open, Negotiating) => true,
            (Negotiating, Accepted) => true,
            (Accepted, InTransit) => true,
            (InTransit, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Open => "open",
            RequestStatus::Negotiating => "negotiating",
            RequestStatus::Accepted => "accepted",
            RequestStatus::InTransit => "in_transit",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(RequestStatus::Open),
            "negotiating" => Ok(RequestStatus::Negotiating),
            "accepted" => Ok(RequestStatus::Accepted),
            "in_transit" => Ok(RequestStatus::InTransit),
            "completed" => Ok(RequestStatus::Completed),
            "cancelled" => Ok(RequestStatus::Cancelled),
            other => Err(format!("unknown request status '{other}'")),
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OfferStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Accepted,
    #[n(2)]
    Rejected,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OfferKind {
    #[default]
    #[n(0)]
    Offer,
    #[n(1)]
    CounterOffer,
}

/// Fields a client supplies when posting a request.
#[derive(Debug, Clone, Default)]
pub struct RequestDraft {
    pub title: String,
    pub description: String,
    pub origin: String,
    pub destination: String,
    pub cargo_type: String,
    pub offered_price: Amount,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Request {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub client_id: String,
    #[n(2)]
    pub client_name: String,
    #[n(3)]
    pub title: String,
    #[n(4)]
    pub description: String,
    #[n(5)]
    pub origin: String,
    #[n(6)]
    pub destination: String,
    #[n(7)]
    pub cargo_type: String,
    #[n(8)]
    pub offered_price: Amount,
    #[n(9)]
    pub status: RequestStatus,
    #[n(10)]
    pub created_at: TimeStamp<Utc>,
    // ids of every offer submitted against this request, in submission order
    #[n(11)]
    pub offer_ids: Vec<String>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub request_id: String,
    #[n(2)]
    pub transporter_id: String,
    #[n(3)]
    pub transporter_name: String,
    #[n(4)]
    pub price: Amount,
    #[n(5)]
    pub message: Option<String>,
    #[n(6)]
    pub kind: OfferKind,
    #[n(7)]
    pub status: OfferStatus,
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
}

/// Commission owed on an accepted offer. Written once, never updated.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    #[n(0)]
    pub request_id: String,
    #[n(1)]
    pub offer_id: String,
    #[n(2)]
    pub client_id: String,
    #[n(3)]
    pub transporter_id: String,
    #[n(4)]
    pub gross: Amount,
    #[n(5)]
    pub commission: Amount,
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Rating {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub rater_id: String,
    #[n(2)]
    pub rater_name: String,
    #[n(3)]
    pub ratee_id: String,
    #[n(4)]
    pub request_id: String,
    #[n(5)]
    pub score: u8,
    #[n(6)]
    pub comment: Option<String>,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
}

/// Aggregate over every rating a user has received.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reputation {
    pub average: Decimal,
    pub count: u64,
}

impl<C> minicbor::Encode<C> for Reputation {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        e.array(2)?
            .str(&self.average.to_string())?
            .u64(self.count)?
            .ok()
    }
}

impl<'b, C> minicbor::Decode<'b, C> for Reputation {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        d.array()?;
        let average = Decimal::from_str(d.str()?)
            .map_err(|_| minicbor::decode::Error::message("failed to parse rating average"))?;
        let count = d.u64()?;

        Ok(Reputation { average, count })
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub request_id: String,
    #[n(2)]
    pub sender_id: String,
    #[n(3)]
    pub receiver_id: String,
    #[n(4)]
    pub content: String,
    // only kept when the filter altered the text
    #[n(5)]
    pub original_content: Option<String>,
    #[n(6)]
    pub redacted: bool,
    #[n(7)]
    pub redaction_reason: Option<String>,
    #[n(8)]
    pub read: bool,
    #[n(9)]
    pub created_at: TimeStamp<Utc>,
}

/// What participants get back when reading a conversation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    pub id: String,
    pub request_id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub redacted: bool,
    pub redaction_reason: Option<String>,
    pub read: bool,
    pub created_at: TimeStamp<Utc>,
}

impl From<ChatMessage> for MessageView {
    fn from(message: ChatMessage) -> Self {
        Self {
            id: message.id,
            request_id: message.request_id,
            sender_id: message.sender_id,
            receiver_id: message.receiver_id,
            content: message.content,
            redacted: message.redacted,
            redaction_reason: message.redaction_reason,
            read: message.read,
            created_at: message.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commission_rate_is_ten_percent() {
        assert_eq!(COMMISSION_RATE, Decimal::new(10, 2));
    }

    #[test]
    fn strict_table_only_moves_forward() {
        use RequestStatus::*;

        assert!(Open.can_advance_to(Negotiating));
        assert!(Accepted.can_advance_to(InTransit));
        assert!(InTransit.can_advance_to(Completed));
        assert!(Negotiating.can_advance_to(Cancelled));
        assert!(!Open.can_advance_to(Completed));
        assert!(!Completed.can_advance_to(Cancelled));
        assert!(!Cancelled.can_advance_to(Open));
    }

    #[test]
    fn status_names_parse_back() {
        for status in [
            RequestStatus::Open,
            RequestStatus::Negotiating,
            RequestStatus::Accepted,
            RequestStatus::InTransit,
            RequestStatus::Completed,
            RequestStatus::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<RequestStatus>(), Ok(status));
        }
        assert!("abierto".parse::<RequestStatus>().is_err());
    }
}
