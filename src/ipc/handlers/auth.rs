use crate::auth::{self, LoginParams, RegisterParams};
use crate::ipc::error::err;
use crate::ipc::helpers::{authed, fail, params, required_str, respond, respond_as, take};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_register(state: &mut AppState, req: &Request) -> serde_json::Value {
    let input: RegisterParams = take!(params(req));
    let signer = &state.signer;
    let Some(store) = state.store.as_deref_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    // Admin callers may create further admins; anyone else registers themselves.
    let caller = match req.token.as_deref().filter(|t| !t.trim().is_empty()) {
        Some(token) => match auth::authenticate(&*store, signer, token) {
            Ok(s) => Some(s),
            Err(e) => return fail(req, e),
        },
        None => None,
    };
    respond(req, auth::register(store, signer, caller.as_ref(), input))
}

fn handle_login(state: &mut AppState, req: &Request) -> serde_json::Value {
    let input: LoginParams = take!(params(req));
    let signer = &state.signer;
    let Some(store) = state.store.as_deref_mut() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    respond(req, auth::login(store, signer, input))
}

fn handle_logout(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    respond(req, auth::logout(store, &session).map(|_| json!({ "ok": true })))
}

fn handle_me(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    respond_as(req, "user", auth::me(store, &session))
}

fn handle_users_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    respond_as(req, "users", auth::list_users(store, &session))
}

fn handle_users_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let user_id = take!(required_str(req, "userId"));
    respond(
        req,
        auth::delete_user(store, &session, &user_id).map(|_| json!({ "ok": true })),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "auth.register" => Some(handle_register(state, req)),
        "auth.login" => Some(handle_login(state, req)),
        "auth.logout" => Some(handle_logout(state, req)),
        "auth.me" => Some(handle_me(state, req)),
        "users.list" => Some(handle_users_list(state, req)),
        "users.delete" => Some(handle_users_delete(state, req)),
        _ => None,
    }
}
