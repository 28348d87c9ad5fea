use super::{
    audience, classes, optional_text, purge_quiz_records, required_text, visible_to,
    ContentFilter, CONTENT_DELETE_SCOPE,
};
use crate::access::{self, Level, Resource};
use crate::auth::Session;
use crate::error::{AppError, AppResult};
use crate::messaging;
use crate::model::{Answer, NotificationKind, Question, QuestionType, Quiz, Role};
use crate::store::{transaction, Collection, Store, StoreError, StoreExt};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionInput {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    pub text: String,
    pub answer: Answer,
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizInput {
    #[serde(default)]
    pub class_id: Option<String>,
    pub title: String,
    pub grade_level: String,
    #[serde(alias = "subject")]
    pub chapter: String,
    pub questions: Vec<QuestionInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default, alias = "subject")]
    pub chapter: Option<String>,
    #[serde(default)]
    pub questions: Option<Vec<QuestionInput>>,
}

/// Number of `[...]` blanks with non-empty content in a question text.
pub fn blank_count(text: &str) -> usize {
    let mut count = 0;
    let mut rest = text;
    while let Some(open) = rest.find('[') {
        let after = &rest[open + 1..];
        let Some(close) = after.find(']') else {
            break;
        };
        if !after[..close].trim().is_empty() {
            count += 1;
        }
        rest = &after[close + 1..];
    }
    count
}

fn field_err(i: usize, field: &str, message: impl Into<String>) -> AppError {
    AppError::validation_with(message, json!({ "field": format!("questions[{i}].{field}") }))
}

fn build_question(i: usize, q: QuestionInput, taken: &mut HashSet<String>) -> AppResult<Question> {
    let text = required_text(&q.text, &format!("questions[{i}].text"))?;
    let (answer, options) = match q.kind {
        QuestionType::Mcq => {
            let options: Vec<String> = q
                .options
                .unwrap_or_default()
                .into_iter()
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
            if options.len() < 2 {
                return Err(field_err(i, "options", "mcq needs at least 2 options"));
            }
            let Answer::One(answer) = q.answer else {
                return Err(field_err(i, "answer", "mcq answer must be a single option"));
            };
            let answer = answer.trim().to_string();
            if !options.contains(&answer) {
                return Err(field_err(i, "answer", "mcq answer must be one of the options"));
            }
            (Answer::One(answer), Some(options))
        }
        QuestionType::Truefalse => {
            let Answer::One(answer) = q.answer else {
                return Err(field_err(i, "answer", "true/false answer must be a single value"));
            };
            let answer = answer.trim().to_lowercase();
            if answer != "true" && answer != "false" {
                return Err(field_err(i, "answer", "true/false answer must be true or false"));
            }
            (Answer::One(answer), None)
        }
        QuestionType::Fillblank => {
            let blanks = blank_count(&text);
            if blanks == 0 {
                return Err(field_err(i, "text", "fill-in-blank text needs at least one [blank]"));
            }
            let given = q.answer.as_list().len();
            if given != blanks {
                return Err(AppError::validation_with(
                    "fill-in-blank needs one answer per blank",
                    json!({ "field": format!("questions[{i}].answer"), "blanks": blanks, "answers": given }),
                ));
            }
            if q.answer.as_list().iter().any(|a| a.trim().is_empty()) {
                return Err(field_err(i, "answer", "fill-in-blank answers must not be empty"));
            }
            (q.answer, None)
        }
    };

    let id = match q.id.map(|s| s.trim().to_string()) {
        Some(id) if !id.is_empty() && taken.insert(id.clone()) => id,
        _ => {
            let id = Uuid::new_v4().to_string();
            taken.insert(id.clone());
            id
        }
    };
    Ok(Question {
        id,
        kind: q.kind,
        text,
        answer,
        options,
    })
}

pub(crate) fn build_questions(inputs: Vec<QuestionInput>) -> AppResult<Vec<Question>> {
    if inputs.is_empty() {
        return Err(AppError::validation_with(
            "a quiz needs at least one question",
            json!({ "field": "questions" }),
        ));
    }
    let mut taken = HashSet::new();
    inputs
        .into_iter()
        .enumerate()
        .map(|(i, q)| build_question(i, q, &mut taken))
        .collect()
}

fn resource(q: &Quiz) -> Resource<'_> {
    Resource {
        kind: "quiz",
        owner_id: &q.created_by,
        class_id: q.class_id.as_deref(),
        grade_level: Some(&q.grade_level),
    }
}

pub(crate) fn authorize(
    store: &dyn Store,
    session: &Session,
    id: &str,
    level: Level,
) -> AppResult<Quiz> {
    let quiz = store
        .load::<Quiz>(Collection::Quizzes, id)?
        .ok_or_else(|| AppError::not_found("quiz"))?;
    access::check(store, session, &resource(&quiz), level)?;
    Ok(quiz)
}

/// Serializes a quiz for `session`; students never see the answer key.
pub fn present(quiz: &Quiz, session: &Session) -> AppResult<Value> {
    let mut v = serde_json::to_value(quiz).map_err(StoreError::from)?;
    if session.role == Role::Student {
        if let Some(questions) = v.get_mut("questions").and_then(|q| q.as_array_mut()) {
            for q in questions {
                if let Some(obj) = q.as_object_mut() {
                    obj.remove("answer");
                }
            }
        }
    }
    Ok(v)
}

pub fn create(store: &mut dyn Store, session: &Session, input: QuizInput) -> AppResult<Quiz> {
    access::require_author(session)?;
    let class_id = optional_text(input.class_id);
    if let Some(class_id) = class_id.as_deref() {
        classes::authorize(store, session, class_id, Level::Write)?;
    }
    let now = Utc::now();
    let quiz = Quiz {
        id: Uuid::new_v4().to_string(),
        created_by: session.user_id.clone(),
        class_id,
        title: required_text(&input.title, "title")?,
        grade_level: required_text(&input.grade_level, "gradeLevel")?,
        chapter: required_text(&input.chapter, "chapter")?,
        questions: build_questions(input.questions)?,
        created_at: now,
        updated_at: now,
    };

    let recipients = audience(store, quiz.class_id.as_deref(), &quiz.grade_level)?;
    let body = format!("{} is now available", quiz.title);
    transaction(store, &[Collection::Quizzes, Collection::Notifications], |tx| {
        tx.save(Collection::Quizzes, &quiz)?;
        messaging::notify(tx, &recipients, NotificationKind::Quiz, "New quiz", &body)?;
        Ok(())
    })?;
    info!(
        quiz_id = %quiz.id,
        questions = quiz.questions.len(),
        notified = recipients.len(),
        "quiz created"
    );
    Ok(quiz)
}

pub fn list(store: &dyn Store, session: &Session, filter: &ContentFilter) -> AppResult<Vec<Quiz>> {
    let mut out = Vec::new();
    for q in store.load_all::<Quiz>(Collection::Quizzes)? {
        if !filter.accepts(&q.grade_level, &q.chapter, q.class_id.as_deref()) {
            continue;
        }
        if visible_to(store, session, &q.created_by, q.class_id.as_deref(), &q.grade_level)? {
            out.push(q);
        }
    }
    debug!(count = out.len(), "quizzes listed");
    Ok(out)
}

pub fn get(store: &dyn Store, session: &Session, id: &str) -> AppResult<Quiz> {
    authorize(store, session, id, Level::Read)
}

pub fn update(store: &mut dyn Store, session: &Session, id: &str, patch: QuizPatch) -> AppResult<Quiz> {
    let mut quiz = authorize(store, session, id, Level::Write)?;
    if let Some(t) = patch.title {
        quiz.title = required_text(&t, "title")?;
    }
    if let Some(g) = patch.grade_level {
        quiz.grade_level = required_text(&g, "gradeLevel")?;
    }
    if let Some(c) = patch.chapter {
        quiz.chapter = required_text(&c, "chapter")?;
    }
    if let Some(questions) = patch.questions {
        quiz.questions = build_questions(questions)?;
    }
    quiz.updated_at = Utc::now();
    store.save(Collection::Quizzes, &quiz)?;
    info!(quiz_id = %quiz.id, "quiz updated");
    Ok(quiz)
}

pub fn delete(store: &mut dyn Store, session: &Session, id: &str) -> AppResult<()> {
    let quiz = authorize(store, session, id, Level::Write)?;
    transaction(store, &CONTENT_DELETE_SCOPE, |tx| {
        purge_quiz_records(tx, &quiz.id)?;
        tx.delete(Collection::Quizzes, &quiz.id)?;
        Ok(())
    })?;
    info!(quiz_id = %quiz.id, "quiz deleted");
    Ok(())
}
