//! Chat between the client and the transporter of a request
use crate::directory::{self, Directory};
use crate::error::{MarketError, MarketResult};
use crate::filter;
use crate::model::{ChatMessage, MessageView};
use crate::negotiation::{accepted_offer, require_request};
use crate::notify::{self, NotificationKind, Notifier};
use crate::store::{self, Store};
use crate::types::{Role, TimeStamp};
use crate::utils;
use std::sync::Arc;

/// Characters of message text carried in the notification preview.
pub const PREVIEW_BUDGET: usize = 50;

/// A stored message plus the warning to show the sender, if anything was hidden.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message: MessageView,
    pub warning: Option<String>,
}

#[derive(Clone)]
pub struct ChatMediator {
    store: Store,
    directory: Arc<dyn Directory>,
    notifier: Arc<dyn Notifier>,
}

impl ChatMediator {
    pub fn new(store: Store, directory: Arc<dyn Directory>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            directory,
            notifier,
        }
    }

    /// Only the client and the accepted transporter may write, and only once
    /// an offer has been accepted.
    pub fn send_message(
        &self,
        request_id: &str,
        sender: &str,
        content: &str,
    ) -> MarketResult<SentMessage> {
        if content.trim().is_empty() {
            return Err(MarketError::InvalidArgument("message must not be blank".into()));
        }
        let request = require_request(&self.store, request_id)?;
        let carrier = accepted_offer(&self.store, &request)?.map(|offer| offer.transporter_id);

        let receiver_id = match carrier {
            Some(carrier) if request.client_id == sender => carrier,
            Some(carrier) if carrier == sender => request.client_id.clone(),
            None if request.client_id == sender => {
                return Err(MarketError::InvalidState(format!(
                    "request {request_id} has no accepted transporter to talk to yet"
                )));
            }
            _ => {
                return Err(MarketError::Forbidden(format!(
                    "no access to the conversation of request {request_id}"
                )));
            }
        };

        let outcome = filter::filter(content);
        let message = ChatMessage {
            id: utils::new_id("msg_")?,
            request_id: request_id.to_string(),
            sender_id: sender.to_string(),
            receiver_id,
            content: outcome.text.clone(),
            original_content: outcome.redacted.then(|| content.to_string()),
            redacted: outcome.redacted,
            redaction_reason: outcome.reason(),
            read: false,
            created_at: TimeStamp::new(),
        };
        let key = store::compound_key(request_id, &message.id);
        store::put(&self.store.messages, &key, &message)?;

        if outcome.redacted {
            tracing::info!(
                request_id,
                message_id = %message.id,
                sender,
                categories = ?outcome.categories,
                "contact details removed from message"
            );
        } else {
            tracing::debug!(request_id, message_id = %message.id, sender, "message stored");
        }

        self.notifier.notify(
            &message.receiver_id,
            NotificationKind::NewMessage,
            "Nuevo mensaje",
            &utils::preview(&message.content, PREVIEW_BUDGET),
            notify::request_link(request_id),
        );

        Ok(SentMessage {
            message: message.into(),
            warning: outcome.warning(),
        })
    }

    fn conversation(&self, request_id: &str) -> MarketResult<Vec<ChatMessage>> {
        let mut messages: Vec<ChatMessage> = store::scan_prefix(&self.store.messages, request_id)?;
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(messages)
    }

    /// Oldest first. Marks everything addressed to `actor` as read.
    pub fn list_messages(&self, request_id: &str, actor: &str) -> MarketResult<Vec<MessageView>> {
        let request = require_request(&self.store, request_id)?;
        let is_carrier = accepted_offer(&self.store, &request)?
            .is_some_and(|offer| offer.transporter_id == actor);
        if request.client_id != actor && !is_carrier {
            return Err(MarketError::Forbidden(format!(
                "no access to the conversation of request {request_id}"
            )));
        }

        let mut views = Vec::new();
        for mut message in self.conversation(request_id)? {
            if message.receiver_id == actor && !message.read {
                message.read = true;
                let key = store::compound_key(request_id, &message.id);
                store::put(&self.store.messages, &key, &message)?;
            }
            views.push(MessageView::from(message));
        }

        Ok(views)
    }

    /// Full records including pre-filter text. Administrators only.
    pub fn audit_messages(&self, request_id: &str, actor: &str) -> MarketResult<Vec<ChatMessage>> {
        directory::require_role(
            self.directory.as_ref(),
            actor,
            Role::Admin,
            "audit conversations",
        )?;
        require_request(&self.store, request_id)?;

        let messages = self.conversation(request_id)?;
        tracing::info!(request_id, actor, count = messages.len(), "conversation audited");
        Ok(messages)
    }

    pub fn unread_count(&self, user_id: &str) -> MarketResult<usize> {
        let messages: Vec<ChatMessage> = store::scan(&self.store.messages)?;
        Ok(messages
            .iter()
            .filter(|m| m.receiver_id == user_id && !m.read)
            .count())
    }
}
