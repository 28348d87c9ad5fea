use crate::ipc::helpers::{authed, params, required_str, respond, respond_as, take};
use crate::ipc::types::{AppState, Request};
use crate::messaging::{self, OutgoingMessage};
use serde::Deserialize;
use serde_json::json;

#[derive(Deserialize)]
struct SendParams {
    messages: Vec<OutgoingMessage>,
}

fn handle_messages_send(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let p: SendParams = take!(params(req));
    respond_as(
        req,
        "messages",
        messaging::send_messages(store, &session, p.messages),
    )
}

fn handle_messages_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    respond(req, messaging::list_messages(store, &session))
}

fn handle_messages_mark_read(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "messageId"));
    respond_as(
        req,
        "message",
        messaging::mark_message_read(store, &session, &id),
    )
}

fn handle_notifications_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    respond(req, messaging::list_notifications(store, &session))
}

fn handle_notifications_mark_read(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "notificationId"));
    respond_as(
        req,
        "notification",
        messaging::mark_notification_read(store, &session, &id),
    )
}

fn handle_notifications_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "notificationId"));
    respond(
        req,
        messaging::delete_notification(store, &session, &id).map(|_| json!({ "ok": true })),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "messages.send" => Some(handle_messages_send(state, req)),
        "messages.list" => Some(handle_messages_list(state, req)),
        "messages.markRead" => Some(handle_messages_mark_read(state, req)),
        "notifications.list" => Some(handle_notifications_list(state, req)),
        "notifications.markRead" => Some(handle_notifications_mark_read(state, req)),
        "notifications.delete" => Some(handle_notifications_delete(state, req)),
        _ => None,
    }
}
