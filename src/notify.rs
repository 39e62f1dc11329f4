//! Notification emission
use crate::error::{MarketError, MarketResult};
use crate::store::{self, Store};
use crate::types::TimeStamp;
use crate::utils;
use chrono::Utc;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    #[n(0)]
    NewOffer,
    #[n(1)]
    OfferAccepted,
    #[n(2)]
    OfferRejected,
    #[n(3)]
    StatusChanged,
    #[n(4)]
    NewMessage,
    #[n(5)]
    NewRating,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub recipient_id: String,
    #[n(2)]
    pub kind: NotificationKind,
    #[n(3)]
    pub title: String,
    #[n(4)]
    pub body: String,
    #[n(5)]
    pub link: Option<String>,
    #[n(6)]
    pub read: bool,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
}

/// Fire-and-forget delivery. Implementations log their own failures; the
/// engine never waits on or rolls back because of a notification.
pub trait Notifier: Send + Sync {
    fn notify(
        &self,
        recipient_id: &str,
        kind: NotificationKind,
        title: &str,
        body: &str,
        link: Option<String>,
    );
}

pub(crate) fn request_link(request_id: &str) -> Option<String> {
    Some(format!("/requests/{request_id}"))
}

/// Notifier that keeps notifications in the `notifications` tree, keyed by recipient.
#[derive(Clone)]
pub struct NotificationOutbox {
    store: Store,
}

impl NotificationOutbox {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    fn push(
        &self,
        recipient_id: &str,
        kind: NotificationKind,
        title: &str,
        body: &str,
        link: Option<String>,
    ) -> MarketResult<Notification> {
        let notification = Notification {
            id: utils::new_id("note_")?,
            recipient_id: recipient_id.to_string(),
            kind,
            title: title.to_string(),
            body: body.to_string(),
            link,
            read: false,
            created_at: TimeStamp::new(),
        };
        let key = store::compound_key(recipient_id, &notification.id);
        store::put(&self.store.notifications, &key, &notification)?;

        Ok(notification)
    }

    /// Newest first.
    pub fn for_recipient(&self, recipient_id: &str) -> MarketResult<Vec<Notification>> {
        let mut notifications: Vec<Notification> =
            store::scan_prefix(&self.store.notifications, recipient_id)?;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    pub fn mark_read(&self, recipient_id: &str, notification_id: &str) -> MarketResult<()> {
        let key = store::compound_key(recipient_id, notification_id);
        let mut notification: Notification = store::get(&self.store.notifications, &key)?
            .ok_or_else(|| MarketError::NotFound(format!("notification {notification_id}")))?;
        notification.read = true;
        store::put(&self.store.notifications, &key, &notification)
    }
}

impl Notifier for NotificationOutbox {
    fn notify(
        &self,
        recipient_id: &str,
        kind: NotificationKind,
        title: &str,
        body: &str,
        link: Option<String>,
    ) {
        match self.push(recipient_id, kind, title, body, link) {
            Ok(notification) => tracing::debug!(
                recipient_id,
                notification_id = %notification.id,
                ?kind,
                "notification stored"
            ),
            Err(e) => {
                tracing::warn!(recipient_id, ?kind, error = %e, "failed to store notification")
            }
        }
    }
}
