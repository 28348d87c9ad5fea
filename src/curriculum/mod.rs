//! Authored content: classes, their chapters, exercises and quizzes.

pub mod chapters;
pub mod classes;
pub mod exercises;
pub mod quizzes;

use crate::access;
use crate::auth::Session;
use crate::error::{AppError, AppResult};
use crate::model::{Enrollment, ExerciseSubmission, Progress, QuizSubmission, Role, User};
use crate::store::{Collection, Store, StoreExt};
use serde::Deserialize;

/// Filters shared by the exercise and quiz listings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFilter {
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde(default)]
    pub class_id: Option<String>,
}

impl ContentFilter {
    pub(crate) fn accepts(&self, grade_level: &str, chapter: &str, class_id: Option<&str>) -> bool {
        let grade_ok = self
            .grade_level
            .as_deref()
            .map(|g| g.eq_ignore_ascii_case(grade_level))
            .unwrap_or(true);
        let chapter_ok = self
            .chapter
            .as_deref()
            .map(|c| c.eq_ignore_ascii_case(chapter))
            .unwrap_or(true);
        let class_ok = self
            .class_id
            .as_deref()
            .map(|k| class_id == Some(k))
            .unwrap_or(true);
        grade_ok && chapter_ok && class_ok
    }
}

pub(crate) fn required_text(value: &str, field: &str) -> AppResult<String> {
    let v = value.trim();
    if v.is_empty() {
        return Err(AppError::validation_with(
            format!("{field} must not be empty"),
            serde_json::json!({ "field": field }),
        ));
    }
    Ok(v.to_string())
}

pub(crate) fn optional_text(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Whether `session` may see an exercise or quiz in a listing.
pub(crate) fn visible_to(
    store: &dyn Store,
    session: &Session,
    created_by: &str,
    class_id: Option<&str>,
    grade_level: &str,
) -> AppResult<bool> {
    let resource = access::Resource {
        kind: "item",
        owner_id: created_by,
        class_id,
        grade_level: Some(grade_level),
    };
    match access::check(store, session, &resource, access::Level::Read) {
        Ok(()) => Ok(true),
        Err(AppError::Authorization(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Students who should hear about new content: members of the class when it
/// is class-bound, otherwise every student of the grade level.
pub(crate) fn audience(
    store: &dyn Store,
    class_id: Option<&str>,
    grade_level: &str,
) -> AppResult<Vec<String>> {
    match class_id {
        Some(class_id) => {
            let rows: Vec<Enrollment> =
                store.load_by_index(Collection::Enrollments, "by-class", class_id)?;
            Ok(rows.into_iter().map(|e| e.user_id).collect())
        }
        None => {
            let students: Vec<User> =
                store.load_by_index(Collection::Users, "by-role", Role::Student.as_str())?;
            Ok(students
                .into_iter()
                .filter(|u| {
                    u.grade_level
                        .as_deref()
                        .map(|g| g.eq_ignore_ascii_case(grade_level))
                        .unwrap_or(false)
                })
                .map(|u| u.id)
                .collect())
        }
    }
}

/// Deletes an exercise's submissions and progress records. Must run inside a
/// transaction scoped to both collections.
pub(crate) fn purge_exercise_records(tx: &mut dyn Store, exercise_id: &str) -> AppResult<()> {
    let subs: Vec<ExerciseSubmission> =
        tx.load_by_index(Collection::ExerciseSubmissions, "by-exercise", exercise_id)?;
    for s in subs {
        tx.delete(Collection::ExerciseSubmissions, &s.id)?;
    }
    let progress: Vec<Progress> = tx.load_by_index(Collection::Progress, "by-exercise", exercise_id)?;
    for p in progress {
        tx.delete(Collection::Progress, &p.id)?;
    }
    Ok(())
}

pub(crate) fn purge_quiz_records(tx: &mut dyn Store, quiz_id: &str) -> AppResult<()> {
    let subs: Vec<QuizSubmission> = tx.load_by_index(Collection::QuizSubmissions, "by-quiz", quiz_id)?;
    for s in subs {
        tx.delete(Collection::QuizSubmissions, &s.id)?;
    }
    let progress: Vec<Progress> = tx.load_by_index(Collection::Progress, "by-quiz", quiz_id)?;
    for p in progress {
        tx.delete(Collection::Progress, &p.id)?;
    }
    Ok(())
}

/// Every collection an exercise or quiz delete touches.
pub(crate) const CONTENT_DELETE_SCOPE: [Collection; 5] = [
    Collection::Exercises,
    Collection::Quizzes,
    Collection::ExerciseSubmissions,
    Collection::QuizSubmissions,
    Collection::Progress,
];

#[cfg(test)]
pub(crate) mod testutil {
    use crate::auth::{self, RegisterParams, Session, TokenSigner};
    use crate::model::Role;
    use crate::store::memory::MemoryStore;

    pub fn signer() -> TokenSigner {
        TokenSigner::new("test-secret", 7)
    }

    pub fn user(store: &mut MemoryStore, name: &str, role: Role, grade: Option<&str>) -> Session {
        let signer = signer();
        let admin = Session {
            session_id: "bootstrap".into(),
            user_id: "bootstrap".into(),
            role: Role::Admin,
            full_name: "bootstrap".into(),
            grade_level: None,
            expires_at: chrono::Utc::now(),
        };
        let out = auth::register(
            store,
            &signer,
            Some(&admin),
            RegisterParams {
                email: format!("{name}@school.org"),
                password: "secret1".into(),
                full_name: name.into(),
                role,
                grade_level: grade.map(|g| g.to_string()),
            },
        )
        .expect("register");
        auth::authenticate(store, &signer, &out.token).expect("session")
    }
}
