use crate::access;
use crate::auth::Session;
use crate::error::{AppError, AppResult};
use crate::model::{Message, Notification, NotificationKind, User};
use crate::store::{transaction, Collection, Store, StoreExt};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutgoingMessage {
    pub recipient_id: String,
    #[serde(alias = "body")]
    pub content: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Inbox<T> {
    pub items: Vec<T>,
    pub unread: usize,
}

/// Stores one notification per recipient. Callers run it inside their own
/// transaction so the notification lands together with what triggered it.
pub(crate) fn notify(
    tx: &mut dyn Store,
    recipients: &[String],
    kind: NotificationKind,
    title: &str,
    body: &str,
) -> AppResult<usize> {
    let now = Utc::now();
    for recipient in recipients {
        let n = Notification {
            id: Uuid::new_v4().to_string(),
            recipient_id: recipient.clone(),
            title: title.to_string(),
            body: body.to_string(),
            kind,
            timestamp: now,
            read: false,
        };
        tx.save(Collection::Notifications, &n)?;
    }
    Ok(recipients.len())
}

pub fn send_messages(
    store: &mut dyn Store,
    session: &Session,
    batch: Vec<OutgoingMessage>,
) -> AppResult<Vec<Message>> {
    access::require_admin(session)?;
    if batch.is_empty() {
        return Err(AppError::validation("messages must not be empty"));
    }
    for (i, m) in batch.iter().enumerate() {
        if m.content.trim().is_empty() {
            return Err(AppError::validation_with(
                "message content must not be empty",
                serde_json::json!({ "index": i }),
            ));
        }
        if store.load::<User>(Collection::Users, &m.recipient_id)?.is_none() {
            return Err(AppError::NotFound(format!(
                "recipient {} not found",
                m.recipient_id
            )));
        }
    }

    let now = Utc::now();
    let messages: Vec<Message> = batch
        .into_iter()
        .map(|m| Message {
            id: Uuid::new_v4().to_string(),
            recipient_id: m.recipient_id,
            from: session.full_name.clone(),
            body: m.content.trim().to_string(),
            timestamp: now,
            read: false,
        })
        .collect();

    transaction(store, &[Collection::Messages], |tx| {
        for m in &messages {
            tx.save(Collection::Messages, m)?;
        }
        Ok(())
    })?;
    info!(count = messages.len(), from = %session.user_id, "messages sent");
    Ok(messages)
}

pub fn list_messages(store: &dyn Store, session: &Session) -> AppResult<Inbox<Message>> {
    let mut items: Vec<Message> =
        store.load_by_index(Collection::Messages, "by-recipient", &session.user_id)?;
    items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let unread = items.iter().filter(|m| !m.read).count();
    Ok(Inbox { items, unread })
}

pub fn mark_message_read(store: &mut dyn Store, session: &Session, id: &str) -> AppResult<Message> {
    let Some(mut m) = store.load::<Message>(Collection::Messages, id)? else {
        return Err(AppError::not_found("message"));
    };
    if m.recipient_id != session.user_id {
        return Err(AppError::forbidden("not your message"));
    }
    if !m.read {
        m.read = true;
        store.save(Collection::Messages, &m)?;
    }
    Ok(m)
}

pub fn list_notifications(store: &dyn Store, session: &Session) -> AppResult<Inbox<Notification>> {
    let mut items: Vec<Notification> =
        store.load_by_index(Collection::Notifications, "by-recipient", &session.user_id)?;
    items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    let unread = items.iter().filter(|n| !n.read).count();
    Ok(Inbox { items, unread })
}

fn own_notification(store: &dyn Store, session: &Session, id: &str) -> AppResult<Notification> {
    let Some(n) = store.load::<Notification>(Collection::Notifications, id)? else {
        return Err(AppError::not_found("notification"));
    };
    if n.recipient_id != session.user_id {
        return Err(AppError::forbidden("not your notification"));
    }
    Ok(n)
}

pub fn mark_notification_read(
    store: &mut dyn Store,
    session: &Session,
    id: &str,
) -> AppResult<Notification> {
    let mut n = own_notification(store, session, id)?;
    if !n.read {
        n.read = true;
        store.save(Collection::Notifications, &n)?;
    }
    Ok(n)
}

pub fn delete_notification(store: &mut dyn Store, session: &Session, id: &str) -> AppResult<()> {
    own_notification(store, session, id)?;
    store.delete(Collection::Notifications, id)?;
    Ok(())
}
