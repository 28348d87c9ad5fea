use crate::analytics;
use crate::ipc::helpers::{authed, optional_str, respond, respond_as, take};
use crate::ipc::types::{AppState, Request};

fn handle_stats_admin(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    respond(req, analytics::admin_stats(store, &session))
}

fn handle_stats_student(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let student_id = optional_str(req, "studentId");
    respond(
        req,
        analytics::student_stats(store, &session, student_id.as_deref()),
    )
}

fn handle_stats_students(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    respond_as(req, "students", analytics::students_overview(store, &session))
}

fn handle_stats_feedback(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    respond(req, analytics::feedback_stats(store, &session))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "stats.admin" => Some(handle_stats_admin(state, req)),
        "stats.student" => Some(handle_stats_student(state, req)),
        "stats.students" => Some(handle_stats_students(state, req)),
        "stats.feedback" => Some(handle_stats_feedback(state, req)),
        _ => None,
    }
}
