use crate::auth::Session;
use crate::error::{AppError, AppResult};
use crate::model::{Class, Enrollment, Role};
use crate::store::{Collection, Store, StoreExt};

/// What the access check needs to know about the thing being touched.
#[derive(Debug, Clone, Copy)]
pub struct Resource<'a> {
    pub kind: &'static str,
    pub owner_id: &'a str,
    pub class_id: Option<&'a str>,
    pub grade_level: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Read,
    Write,
}

pub fn is_enrolled(store: &dyn Store, user_id: &str, class_id: &str) -> AppResult<bool> {
    let rows: Vec<Enrollment> = store.load_by_index(Collection::Enrollments, "by-user", user_id)?;
    Ok(rows.iter().any(|e| e.class_id == class_id))
}

fn grade_matches(session: &Session, grade_level: Option<&str>) -> bool {
    match (session.grade_level.as_deref(), grade_level) {
        (Some(mine), Some(theirs)) => mine.eq_ignore_ascii_case(theirs),
        _ => true,
    }
}

/// Admins pass, teachers pass for what they created or what belongs to a
/// class they teach, students may only read what their enrollment or grade
/// level exposes.
pub fn check(
    store: &dyn Store,
    session: &Session,
    resource: &Resource<'_>,
    level: Level,
) -> AppResult<()> {
    match session.role {
        Role::Admin => Ok(()),
        Role::Teacher => {
            if resource.owner_id == session.user_id {
                return Ok(());
            }
            if let Some(class_id) = resource.class_id {
                let class: Option<Class> = store.load(Collection::Classes, class_id)?;
                if class.map(|c| c.teacher_id == session.user_id).unwrap_or(false) {
                    return Ok(());
                }
            }
            Err(AppError::forbidden(format!(
                "not authorized to access this {}",
                resource.kind
            )))
        }
        Role::Student => {
            if level == Level::Write {
                return Err(AppError::forbidden(format!(
                    "students cannot modify this {}",
                    resource.kind
                )));
            }
            let allowed = match resource.class_id {
                Some(class_id) => is_enrolled(store, &session.user_id, class_id)?,
                None => grade_matches(session, resource.grade_level),
            };
            if allowed {
                Ok(())
            } else {
                Err(AppError::forbidden(format!(
                    "not authorized to access this {}",
                    resource.kind
                )))
            }
        }
    }
}

pub fn require_author(session: &Session) -> AppResult<()> {
    if session.role.can_author() {
        Ok(())
    } else {
        Err(AppError::forbidden("teacher or admin role required"))
    }
}

pub fn require_admin(session: &Session) -> AppResult<()> {
    if session.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden("admin only"))
    }
}

pub fn require_student(session: &Session) -> AppResult<()> {
    if session.role == Role::Student {
        Ok(())
    } else {
        Err(AppError::forbidden("student role required"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;
    use chrono::Utc;
    use serde_json::json;

    fn session(user: &str, role: Role, grade: Option<&str>) -> Session {
        Session {
            session_id: format!("s-{user}"),
            user_id: user.to_string(),
            role,
            full_name: user.to_string(),
            grade_level: grade.map(|g| g.to_string()),
            expires_at: Utc::now(),
        }
    }

    fn seeded() -> MemoryStore {
        let mut s = MemoryStore::new();
        let now = Utc::now().to_rfc3339();
        s.put(
            Collection::Classes,
            json!({ "id": "k1", "name": "TRC", "teacherId": "t1", "createdAt": now, "updatedAt": now }),
        )
        .expect("class");
        s.put(
            Collection::Enrollments,
            json!({ "id": "e1", "userId": "s1", "classId": "k1", "createdAt": now }),
        )
        .expect("enrollment");
        s
    }

    #[test]
    fn teachers_reach_owned_items_and_items_of_their_classes() {
        let store = seeded();
        let t1 = session("t1", Role::Teacher, None);
        let t2 = session("t2", Role::Teacher, None);
        let quiz = Resource {
            kind: "quiz",
            owner_id: "t9",
            class_id: Some("k1"),
            grade_level: None,
        };
        assert!(check(&store, &t1, &quiz, Level::Write).is_ok());
        let e = check(&store, &t2, &quiz, Level::Read).expect_err("not owner");
        assert_eq!(e.status(), 403);
        assert!(check(&store, &session("a", Role::Admin, None), &quiz, Level::Write).is_ok());
    }

    #[test]
    fn students_read_through_enrollment_or_grade_and_never_write() {
        let store = seeded();
        let s1 = session("s1", Role::Student, Some("6"));
        let s2 = session("s2", Role::Student, Some("7"));
        let bound = Resource {
            kind: "exercise",
            owner_id: "t1",
            class_id: Some("k1"),
            grade_level: Some("6"),
        };
        let loose = Resource {
            class_id: None,
            ..bound
        };
        assert!(check(&store, &s1, &bound, Level::Read).is_ok());
        assert!(check(&store, &s2, &bound, Level::Read).is_err());
        assert!(check(&store, &s1, &loose, Level::Read).is_ok());
        assert!(check(&store, &s2, &loose, Level::Read).is_err());
        assert!(check(&store, &s1, &bound, Level::Write).is_err());
    }
}
