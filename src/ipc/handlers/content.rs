use crate::curriculum::exercises::{self, ExerciseInput, ExercisePatch};
use crate::curriculum::quizzes::{self, QuizInput, QuizPatch};
use crate::curriculum::ContentFilter;
use crate::error::AppResult;
use crate::ipc::helpers::{authed, params, required_str, respond, respond_as, take};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_exercises_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let filter: ContentFilter = take!(params(req));
    respond_as(req, "exercises", exercises::list(store, &session, &filter))
}

fn handle_exercises_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let input: ExerciseInput = take!(params(req));
    respond_as(req, "exercise", exercises::create(store, &session, input))
}

fn handle_exercises_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "exerciseId"));
    respond_as(req, "exercise", exercises::get(store, &session, &id))
}

fn handle_exercises_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "exerciseId"));
    let patch: ExercisePatch = take!(params(req));
    respond_as(req, "exercise", exercises::update(store, &session, &id, patch))
}

fn handle_exercises_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "exerciseId"));
    respond(
        req,
        exercises::delete(store, &session, &id).map(|_| json!({ "ok": true })),
    )
}

fn handle_exercises_remove_problem(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "exerciseId"));
    let problem_id = take!(required_str(req, "problemId"));
    respond_as(
        req,
        "exercise",
        exercises::remove_problem(store, &session, &id, &problem_id),
    )
}

fn handle_exercises_remove_sub_problem(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "exerciseId"));
    let problem_id = take!(required_str(req, "problemId"));
    let sub_id = take!(required_str(req, "subProblemId"));
    respond_as(
        req,
        "exercise",
        exercises::remove_sub_problem(store, &session, &id, &problem_id, &sub_id),
    )
}

fn handle_quizzes_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let filter: ContentFilter = take!(params(req));
    let listed: AppResult<Vec<serde_json::Value>> = quizzes::list(store, &session, &filter)
        .and_then(|rows| rows.iter().map(|q| quizzes::present(q, &session)).collect());
    respond_as(req, "quizzes", listed)
}

fn handle_quizzes_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let input: QuizInput = take!(params(req));
    respond_as(req, "quiz", quizzes::create(store, &session, input))
}

fn handle_quizzes_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "quizId"));
    respond_as(
        req,
        "quiz",
        quizzes::get(store, &session, &id).and_then(|q| quizzes::present(&q, &session)),
    )
}

fn handle_quizzes_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "quizId"));
    let patch: QuizPatch = take!(params(req));
    respond_as(req, "quiz", quizzes::update(store, &session, &id, patch))
}

fn handle_quizzes_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "quizId"));
    respond(
        req,
        quizzes::delete(store, &session, &id).map(|_| json!({ "ok": true })),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exercises.list" => Some(handle_exercises_list(state, req)),
        "exercises.create" => Some(handle_exercises_create(state, req)),
        "exercises.get" => Some(handle_exercises_get(state, req)),
        "exercises.update" => Some(handle_exercises_update(state, req)),
        "exercises.delete" => Some(handle_exercises_delete(state, req)),
        "exercises.removeProblem" => Some(handle_exercises_remove_problem(state, req)),
        "exercises.removeSubProblem" => Some(handle_exercises_remove_sub_problem(state, req)),
        "quizzes.list" => Some(handle_quizzes_list(state, req)),
        "quizzes.create" => Some(handle_quizzes_create(state, req)),
        "quizzes.get" => Some(handle_quizzes_get(state, req)),
        "quizzes.update" => Some(handle_quizzes_update(state, req)),
        "quizzes.delete" => Some(handle_quizzes_delete(state, req)),
        _ => None,
    }
}
