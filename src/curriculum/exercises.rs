use super::{
    audience, classes, optional_text, purge_exercise_records, required_text, visible_to,
    ContentFilter, CONTENT_DELETE_SCOPE,
};
use crate::access::{self, Level, Resource};
use crate::auth::Session;
use crate::error::{AppError, AppResult};
use crate::messaging;
use crate::model::{Exercise, NotificationKind, Problem, Progress, SubProblem};
use crate::store::{transaction, Collection, Store, StoreExt};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

/// Sub-problems are labelled `a` through `z`.
pub const MAX_SUB_PROBLEMS: usize = 26;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubProblemInput {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemInput {
    #[serde(default)]
    pub id: Option<String>,
    pub text: String,
    #[serde(default, alias = "subQuestions")]
    pub sub_problems: Vec<SubProblemInput>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExerciseInput {
    #[serde(default)]
    pub class_id: Option<String>,
    pub grade_level: String,
    pub chapter: String,
    #[serde(default)]
    pub statement: Option<String>,
    #[serde(alias = "questions")]
    pub problems: Vec<ProblemInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExercisePatch {
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde(default)]
    pub statement: Option<String>,
    #[serde(default, alias = "questions")]
    pub problems: Option<Vec<ProblemInput>>,
}

pub fn sub_problem_label(position: usize) -> AppResult<String> {
    if position >= MAX_SUB_PROBLEMS {
        return Err(AppError::validation_with(
            format!("at most {} sub-problems per problem", MAX_SUB_PROBLEMS),
            json!({ "position": position }),
        ));
    }
    Ok(char::from(b'a' + position as u8).to_string())
}

/// Numbers problems 1..N and labels sub-problems a, b, c... by position.
fn renumber(problems: &mut [Problem]) -> AppResult<()> {
    for (i, p) in problems.iter_mut().enumerate() {
        p.number = i as u32 + 1;
        for (j, s) in p.sub_problems.iter_mut().enumerate() {
            s.label = sub_problem_label(j)?;
        }
    }
    Ok(())
}

fn node_id(requested: Option<String>, taken: &mut HashSet<String>) -> String {
    if let Some(id) = requested.map(|s| s.trim().to_string()) {
        if !id.is_empty() && taken.insert(id.clone()) {
            return id;
        }
    }
    let id = Uuid::new_v4().to_string();
    taken.insert(id.clone());
    id
}

pub(crate) fn build_problems(inputs: Vec<ProblemInput>) -> AppResult<Vec<Problem>> {
    if inputs.is_empty() {
        return Err(AppError::validation_with(
            "an exercise needs at least one problem",
            json!({ "field": "problems" }),
        ));
    }
    let mut taken = HashSet::new();
    let mut problems = Vec::with_capacity(inputs.len());
    for (i, p) in inputs.into_iter().enumerate() {
        let text = required_text(&p.text, &format!("problems[{i}].text"))?;
        if p.sub_problems.len() > MAX_SUB_PROBLEMS {
            return Err(AppError::validation_with(
                format!("at most {} sub-problems per problem", MAX_SUB_PROBLEMS),
                json!({ "field": format!("problems[{i}].subProblems"), "count": p.sub_problems.len() }),
            ));
        }
        let id = node_id(p.id, &mut taken);
        let mut subs = Vec::with_capacity(p.sub_problems.len());
        for (j, s) in p.sub_problems.into_iter().enumerate() {
            subs.push(SubProblem {
                id: node_id(s.id, &mut taken),
                label: String::new(),
                text: required_text(&s.text, &format!("problems[{i}].subProblems[{j}].text"))?,
            });
        }
        problems.push(Problem {
            id,
            number: 0,
            text,
            sub_problems: subs,
        });
    }
    renumber(&mut problems)?;
    Ok(problems)
}

fn resource(e: &Exercise) -> Resource<'_> {
    Resource {
        kind: "exercise",
        owner_id: &e.created_by,
        class_id: e.class_id.as_deref(),
        grade_level: Some(&e.grade_level),
    }
}

pub(crate) fn authorize(
    store: &dyn Store,
    session: &Session,
    id: &str,
    level: Level,
) -> AppResult<Exercise> {
    let exercise = store
        .load::<Exercise>(Collection::Exercises, id)?
        .ok_or_else(|| AppError::not_found("exercise"))?;
    access::check(store, session, &resource(&exercise), level)?;
    Ok(exercise)
}

pub fn create(store: &mut dyn Store, session: &Session, input: ExerciseInput) -> AppResult<Exercise> {
    access::require_author(session)?;
    let class_id = optional_text(input.class_id);
    if let Some(class_id) = class_id.as_deref() {
        classes::authorize(store, session, class_id, Level::Write)?;
    }
    let now = Utc::now();
    let exercise = Exercise {
        id: Uuid::new_v4().to_string(),
        created_by: session.user_id.clone(),
        class_id,
        grade_level: required_text(&input.grade_level, "gradeLevel")?,
        chapter: required_text(&input.chapter, "chapter")?,
        statement: optional_text(input.statement),
        problems: build_problems(input.problems)?,
        created_at: now,
        updated_at: now,
    };

    let recipients = audience(store, exercise.class_id.as_deref(), &exercise.grade_level)?;
    let body = format!("A new exercise is available in {}", exercise.chapter);
    transaction(store, &[Collection::Exercises, Collection::Notifications], |tx| {
        tx.save(Collection::Exercises, &exercise)?;
        messaging::notify(tx, &recipients, NotificationKind::Exercise, "New exercise", &body)?;
        Ok(())
    })?;
    info!(
        exercise_id = %exercise.id,
        problems = exercise.problems.len(),
        notified = recipients.len(),
        "exercise created"
    );
    Ok(exercise)
}

pub fn list(store: &dyn Store, session: &Session, filter: &ContentFilter) -> AppResult<Vec<Exercise>> {
    let mut out = Vec::new();
    for e in store.load_all::<Exercise>(Collection::Exercises)? {
        if !filter.accepts(&e.grade_level, &e.chapter, e.class_id.as_deref()) {
            continue;
        }
        if visible_to(store, session, &e.created_by, e.class_id.as_deref(), &e.grade_level)? {
            out.push(e);
        }
    }
    debug!(count = out.len(), "exercises listed");
    Ok(out)
}

pub fn get(store: &dyn Store, session: &Session, id: &str) -> AppResult<Exercise> {
    authorize(store, session, id, Level::Read)
}

pub fn update(
    store: &mut dyn Store,
    session: &Session,
    id: &str,
    patch: ExercisePatch,
) -> AppResult<Exercise> {
    let mut exercise = authorize(store, session, id, Level::Write)?;
    if let Some(g) = patch.grade_level {
        exercise.grade_level = required_text(&g, "gradeLevel")?;
    }
    if let Some(c) = patch.chapter {
        exercise.chapter = required_text(&c, "chapter")?;
    }
    if patch.statement.is_some() {
        exercise.statement = optional_text(patch.statement);
    }
    if let Some(problems) = patch.problems {
        exercise.problems = build_problems(problems)?;
    }
    exercise.updated_at = Utc::now();
    transaction(store, &[Collection::Exercises, Collection::Progress], |tx| {
        save_pruned(tx, &exercise)
    })?;
    info!(exercise_id = %exercise.id, "exercise updated");
    Ok(exercise)
}

pub fn delete(store: &mut dyn Store, session: &Session, id: &str) -> AppResult<()> {
    let exercise = authorize(store, session, id, Level::Write)?;
    transaction(store, &CONTENT_DELETE_SCOPE, |tx| {
        purge_exercise_records(tx, &exercise.id)?;
        tx.delete(Collection::Exercises, &exercise.id)?;
        Ok(())
    })?;
    info!(exercise_id = %exercise.id, "exercise deleted");
    Ok(())
}

/// Saves the exercise and drops feedback that points at nodes it no longer has.
fn save_pruned(tx: &mut dyn Store, exercise: &Exercise) -> AppResult<()> {
    tx.save(Collection::Exercises, exercise)?;
    let progress: Vec<Progress> = tx.load_by_index(Collection::Progress, "by-exercise", &exercise.id)?;
    for mut p in progress {
        let before = p.exercise_feedback.len();
        p.exercise_feedback
            .retain(|f| exercise.has_node(&f.question_id, f.sub_question_id.as_deref()));
        if p.exercise_feedback.len() != before {
            tx.save(Collection::Progress, &p)?;
        }
    }
    Ok(())
}

pub fn remove_problem(
    store: &mut dyn Store,
    session: &Session,
    exercise_id: &str,
    problem_id: &str,
) -> AppResult<Exercise> {
    let mut exercise = authorize(store, session, exercise_id, Level::Write)?;
    let Some(pos) = exercise.problems.iter().position(|p| p.id == problem_id) else {
        return Err(AppError::not_found("problem"));
    };
    if exercise.problems.len() == 1 {
        return Err(AppError::validation("an exercise needs at least one problem"));
    }
    exercise.problems.remove(pos);
    renumber(&mut exercise.problems)?;
    exercise.updated_at = Utc::now();

    transaction(store, &[Collection::Exercises, Collection::Progress], |tx| {
        save_pruned(tx, &exercise)
    })?;
    info!(exercise_id = %exercise.id, problem_id, "problem removed");
    Ok(exercise)
}

pub fn remove_sub_problem(
    store: &mut dyn Store,
    session: &Session,
    exercise_id: &str,
    problem_id: &str,
    sub_problem_id: &str,
) -> AppResult<Exercise> {
    let mut exercise = authorize(store, session, exercise_id, Level::Write)?;
    let Some(problem) = exercise.problems.iter_mut().find(|p| p.id == problem_id) else {
        return Err(AppError::not_found("problem"));
    };
    let Some(pos) = problem.sub_problems.iter().position(|s| s.id == sub_problem_id) else {
        return Err(AppError::not_found("sub-problem"));
    };
    problem.sub_problems.remove(pos);
    renumber(&mut exercise.problems)?;
    exercise.updated_at = Utc::now();

    transaction(store, &[Collection::Exercises, Collection::Progress], |tx| {
        save_pruned(tx, &exercise)
    })?;
    info!(exercise_id = %exercise.id, problem_id, sub_problem_id, "sub-problem removed");
    Ok(exercise)
}
