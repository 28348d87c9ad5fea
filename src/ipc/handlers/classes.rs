use crate::curriculum::chapters::{self, ChapterInput, ChapterOrder, ChapterPatch};
use crate::curriculum::classes::{self, ClassInput, ClassPatch};
use crate::ipc::helpers::{
    authed, optional_str, params, required_str, respond, respond_as, take,
};
use crate::ipc::types::{AppState, Request};
use serde::Deserialize;
use serde_json::json;

fn handle_classes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    respond_as(req, "classes", classes::list(store, &session))
}

fn handle_classes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let input: ClassInput = take!(params(req));
    respond_as(req, "class", classes::create(store, &session, input))
}

fn handle_classes_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let class_id = take!(required_str(req, "classId"));
    respond_as(req, "class", classes::get(store, &session, &class_id))
}

fn handle_classes_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let class_id = take!(required_str(req, "classId"));
    let patch: ClassPatch = take!(params(req));
    respond_as(req, "class", classes::update(store, &session, &class_id, patch))
}

fn handle_classes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let class_id = take!(required_str(req, "classId"));
    respond(
        req,
        classes::delete(store, &session, &class_id).map(|_| json!({ "ok": true })),
    )
}

fn handle_classes_enroll(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let class_id = take!(required_str(req, "classId"));
    let user_id = optional_str(req, "userId");
    respond_as(
        req,
        "enrollment",
        classes::enroll(store, &session, &class_id, user_id.as_deref()),
    )
}

fn handle_classes_unenroll(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let class_id = take!(required_str(req, "classId"));
    let user_id = optional_str(req, "userId");
    respond(
        req,
        classes::unenroll(store, &session, &class_id, user_id.as_deref())
            .map(|_| json!({ "ok": true })),
    )
}

fn handle_chapters_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let class_id = take!(required_str(req, "classId"));
    respond_as(req, "chapters", chapters::list(store, &session, &class_id))
}

fn handle_chapters_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let class_id = take!(required_str(req, "classId"));
    let input: ChapterInput = take!(params(req));
    respond_as(req, "chapter", chapters::create(store, &session, &class_id, input))
}

fn handle_chapters_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let chapter_id = take!(required_str(req, "chapterId"));
    respond_as(req, "chapter", chapters::get(store, &session, &chapter_id))
}

fn handle_chapters_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let chapter_id = take!(required_str(req, "chapterId"));
    let patch: ChapterPatch = take!(params(req));
    respond_as(req, "chapter", chapters::update(store, &session, &chapter_id, patch))
}

fn handle_chapters_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let chapter_id = take!(required_str(req, "chapterId"));
    respond(
        req,
        chapters::delete(store, &session, &chapter_id).map(|_| json!({ "ok": true })),
    )
}

#[derive(Deserialize)]
struct ReorderParams {
    orders: Vec<ChapterOrder>,
}

fn handle_chapters_reorder(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let class_id = take!(required_str(req, "classId"));
    let p: ReorderParams = take!(params(req));
    respond_as(
        req,
        "chapters",
        chapters::reorder(store, &session, &class_id, p.orders),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "classes.list" => Some(handle_classes_list(state, req)),
        "classes.create" => Some(handle_classes_create(state, req)),
        "classes.get" => Some(handle_classes_get(state, req)),
        "classes.update" => Some(handle_classes_update(state, req)),
        "classes.delete" => Some(handle_classes_delete(state, req)),
        "classes.enroll" => Some(handle_classes_enroll(state, req)),
        "classes.unenroll" => Some(handle_classes_unenroll(state, req)),
        "chapters.list" => Some(handle_chapters_list(state, req)),
        "chapters.create" => Some(handle_chapters_create(state, req)),
        "chapters.get" => Some(handle_chapters_get(state, req)),
        "chapters.update" => Some(handle_chapters_update(state, req)),
        "chapters.delete" => Some(handle_chapters_delete(state, req)),
        "chapters.reorder" => Some(handle_chapters_reorder(state, req)),
        _ => None,
    }
}
