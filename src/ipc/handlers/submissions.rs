use crate::grading::{self, FeedbackInput, ProgressDraft, QuizAttempt};
use crate::ipc::helpers::{authed, optional_str, params, required_str, respond_as, take};
use crate::ipc::types::{AppState, Request};
use crate::model::Solution;
use serde::Deserialize;

#[derive(Deserialize)]
struct SolutionsParams {
    solutions: Vec<Solution>,
}

fn handle_exercises_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "exerciseId"));
    let p: SolutionsParams = take!(params(req));
    respond_as(
        req,
        "submission",
        grading::submit_solutions(store, &session, &id, p.solutions),
    )
}

fn handle_exercises_solutions(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "exerciseId"));
    respond_as(
        req,
        "submissions",
        grading::exercise_solutions(store, &session, &id),
    )
}

fn handle_quizzes_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "quizId"));
    let attempt: QuizAttempt = take!(params(req));
    respond_as(
        req,
        "submission",
        grading::submit_quiz(store, &session, &id, attempt),
    )
}

fn handle_quizzes_results(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "quizId"));
    respond_as(req, "submissions", grading::quiz_results(store, &session, &id))
}

fn handle_progress_save(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "quizId"));
    let draft: ProgressDraft = take!(params(req));
    respond_as(
        req,
        "progress",
        grading::save_progress(store, &session, &id, draft),
    )
}

fn handle_feedback_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "exerciseId"));
    let input: FeedbackInput = take!(params(req));
    respond_as(
        req,
        "feedback",
        grading::submit_feedback(store, &session, &id, input),
    )
}

fn handle_feedback_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let (store, session) = take!(authed(state, req));
    let id = take!(required_str(req, "exerciseId"));
    let student_id = optional_str(req, "studentId");
    respond_as(
        req,
        "feedback",
        grading::get_feedback(store, &session, &id, student_id.as_deref()),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "exercises.submitSolutions" => Some(handle_exercises_submit(state, req)),
        "exercises.solutions" => Some(handle_exercises_solutions(state, req)),
        "quizzes.submit" => Some(handle_quizzes_submit(state, req)),
        "quizzes.results" => Some(handle_quizzes_results(state, req)),
        "progress.save" => Some(handle_progress_save(state, req)),
        "feedback.submit" => Some(handle_feedback_submit(state, req)),
        "feedback.get" => Some(handle_feedback_get(state, req)),
        _ => None,
    }
}
