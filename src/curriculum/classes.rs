use super::{optional_text, purge_exercise_records, purge_quiz_records, required_text};
use crate::access::{self, Level, Resource};
use crate::auth::Session;
use crate::error::{AppError, AppResult};
use crate::model::{Chapter, Class, Enrollment, Exercise, Quiz, Role, User, UserProfile};
use crate::store::{transaction, Collection, Store, StoreExt};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSummary {
    #[serde(flatten)]
    pub class: Class,
    pub enrollment_count: usize,
    pub chapter_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDetail {
    #[serde(flatten)]
    pub class: Class,
    pub chapters: Vec<Chapter>,
    pub students: Vec<UserProfile>,
}

fn resource(class: &Class) -> Resource<'_> {
    Resource {
        kind: "class",
        owner_id: &class.teacher_id,
        class_id: Some(&class.id),
        grade_level: None,
    }
}

pub(crate) fn load_class(store: &dyn Store, id: &str) -> AppResult<Class> {
    store
        .load::<Class>(Collection::Classes, id)?
        .ok_or_else(|| AppError::not_found("class"))
}

/// Loads a class and checks `level` access to it.
pub(crate) fn authorize(
    store: &dyn Store,
    session: &Session,
    id: &str,
    level: Level,
) -> AppResult<Class> {
    let class = load_class(store, id)?;
    access::check(store, session, &resource(&class), level)?;
    Ok(class)
}

pub fn create(store: &mut dyn Store, session: &Session, input: ClassInput) -> AppResult<Class> {
    access::require_author(session)?;
    let now = Utc::now();
    let class = Class {
        id: Uuid::new_v4().to_string(),
        name: required_text(&input.name, "name")?,
        description: optional_text(input.description),
        teacher_id: session.user_id.clone(),
        created_at: now,
        updated_at: now,
    };
    store.save(Collection::Classes, &class)?;
    info!(class_id = %class.id, teacher_id = %class.teacher_id, "class created");
    Ok(class)
}

pub fn list(store: &dyn Store, session: &Session) -> AppResult<Vec<ClassSummary>> {
    let classes: Vec<Class> = match session.role {
        Role::Admin => store.load_all(Collection::Classes)?,
        Role::Teacher => store.load_by_index(Collection::Classes, "by-teacher", &session.user_id)?,
        Role::Student => {
            let links: Vec<Enrollment> =
                store.load_by_index(Collection::Enrollments, "by-user", &session.user_id)?;
            let mut out = Vec::with_capacity(links.len());
            for link in links {
                if let Some(c) = store.load::<Class>(Collection::Classes, &link.class_id)? {
                    out.push(c);
                }
            }
            out
        }
    };

    let mut rows = Vec::with_capacity(classes.len());
    for class in classes {
        let enrollment_count = store
            .get_all_by_index(Collection::Enrollments, "by-class", &class.id)?
            .len();
        let chapter_count = store
            .get_all_by_index(Collection::Chapters, "by-class", &class.id)?
            .len();
        rows.push(ClassSummary {
            class,
            enrollment_count,
            chapter_count,
        });
    }
    rows.sort_by(|a, b| a.class.name.to_lowercase().cmp(&b.class.name.to_lowercase()));
    debug!(count = rows.len(), "classes listed");
    Ok(rows)
}

pub fn get(store: &dyn Store, session: &Session, id: &str) -> AppResult<ClassDetail> {
    let class = authorize(store, session, id, Level::Read)?;
    let chapters = super::chapters::ordered(store, &class.id)?;

    let mut students = Vec::new();
    if session.role != Role::Student {
        let links: Vec<Enrollment> =
            store.load_by_index(Collection::Enrollments, "by-class", &class.id)?;
        for link in links {
            if let Some(u) = store.load::<User>(Collection::Users, &link.user_id)? {
                students.push(UserProfile::from(&u));
            }
        }
    }
    Ok(ClassDetail {
        class,
        chapters,
        students,
    })
}

pub fn update(
    store: &mut dyn Store,
    session: &Session,
    id: &str,
    patch: ClassPatch,
) -> AppResult<Class> {
    let mut class = authorize(store, session, id, Level::Write)?;
    if let Some(name) = patch.name {
        class.name = required_text(&name, "name")?;
    }
    if patch.description.is_some() {
        class.description = optional_text(patch.description);
    }
    class.updated_at = Utc::now();
    store.save(Collection::Classes, &class)?;
    info!(class_id = %class.id, "class updated");
    Ok(class)
}

/// Removes the class with its chapters, enrollments and class-bound content.
pub fn delete(store: &mut dyn Store, session: &Session, id: &str) -> AppResult<()> {
    let class = authorize(store, session, id, Level::Write)?;

    let scope = [
        Collection::Classes,
        Collection::Chapters,
        Collection::Enrollments,
        Collection::Exercises,
        Collection::Quizzes,
        Collection::ExerciseSubmissions,
        Collection::QuizSubmissions,
        Collection::Progress,
    ];
    transaction(store, &scope, |tx| {
        for ch in tx.load_by_index::<Chapter>(Collection::Chapters, "by-class", &class.id)? {
            tx.delete(Collection::Chapters, &ch.id)?;
        }
        for e in tx.load_by_index::<Enrollment>(Collection::Enrollments, "by-class", &class.id)? {
            tx.delete(Collection::Enrollments, &e.id)?;
        }
        for ex in tx.load_by_index::<Exercise>(Collection::Exercises, "by-class", &class.id)? {
            purge_exercise_records(tx, &ex.id)?;
            tx.delete(Collection::Exercises, &ex.id)?;
        }
        for q in tx.load_by_index::<Quiz>(Collection::Quizzes, "by-class", &class.id)? {
            purge_quiz_records(tx, &q.id)?;
            tx.delete(Collection::Quizzes, &q.id)?;
        }
        tx.delete(Collection::Classes, &class.id)?;
        Ok(())
    })?;
    info!(class_id = %class.id, "class deleted");
    Ok(())
}

/// Enrolls the caller, or `user_id` when the caller owns the class.
pub fn enroll(
    store: &mut dyn Store,
    session: &Session,
    class_id: &str,
    user_id: Option<&str>,
) -> AppResult<Enrollment> {
    let class = load_class(store, class_id)?;
    let target = match user_id.filter(|u| *u != session.user_id) {
        Some(other) => {
            access::check(store, session, &resource(&class), Level::Write)?;
            other.to_string()
        }
        None => {
            access::require_student(session)?;
            session.user_id.clone()
        }
    };
    let student = store
        .load::<User>(Collection::Users, &target)?
        .ok_or_else(|| AppError::not_found("user"))?;
    if student.role != Role::Student {
        return Err(AppError::validation("only students can be enrolled"));
    }
    if access::is_enrolled(store, &target, &class.id)? {
        return Err(AppError::validation_with(
            "already enrolled",
            serde_json::json!({ "classId": class.id, "userId": target }),
        ));
    }

    let enrollment = Enrollment {
        id: Uuid::new_v4().to_string(),
        user_id: target,
        class_id: class.id.clone(),
        created_at: Utc::now(),
    };
    store.save(Collection::Enrollments, &enrollment)?;
    info!(class_id = %class.id, user_id = %enrollment.user_id, "enrolled");
    Ok(enrollment)
}

pub fn unenroll(
    store: &mut dyn Store,
    session: &Session,
    class_id: &str,
    user_id: Option<&str>,
) -> AppResult<()> {
    let class = load_class(store, class_id)?;
    let target = match user_id.filter(|u| *u != session.user_id) {
        Some(other) => {
            access::check(store, session, &resource(&class), Level::Write)?;
            other.to_string()
        }
        None => session.user_id.clone(),
    };
    let links: Vec<Enrollment> = store.load_by_index(Collection::Enrollments, "by-user", &target)?;
    let Some(link) = links.into_iter().find(|e| e.class_id == class.id) else {
        return Err(AppError::not_found("enrollment"));
    };
    store.delete(Collection::Enrollments, &link.id)?;
    info!(class_id = %class.id, user_id = %target, "unenrolled");
    Ok(())
}
