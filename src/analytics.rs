//! Dashboard statistics, reduced from progress and submission records with
//! the pure functions in [`crate::calc`].

use crate::access;
use crate::auth::Session;
use crate::calc::{self, ChapterDistribution, DifficultyDistribution};
use crate::curriculum::visible_to;
use crate::error::{AppError, AppResult};
use crate::model::{
    Class, Difficulty, Enrollment, Exercise, ExerciseSubmission, Progress, ProgressStatus, Quiz,
    QuizSubmission, Role, User,
};
use crate::store::{Collection, Store, StoreExt};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

const SUCCESS_SCORE: u32 = 80;
const FAIL_SCORE: u32 = 50;
const RECENT_ACTIVITY: usize = 5;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_students: usize,
    pub active_quizzes: usize,
    pub active_exercises: usize,
    pub completion_rate: u32,
    pub average_score: u32,
    pub total_time_spent: u64,
    pub weekly_active_users: usize,
    pub monthly_growth: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentActivity {
    pub kind: &'static str,
    pub item_id: String,
    pub title: String,
    pub score: u32,
    pub status: ProgressStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub quiz_id: String,
    pub title: String,
    pub chapter: String,
    pub score: u32,
    pub time_spent: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    pub student_id: String,
    pub completed_quizzes: usize,
    pub total_quizzes: usize,
    pub completion_rate: u32,
    pub average_score: u32,
    pub successful_quizzes: usize,
    pub failed_quizzes: usize,
    pub in_progress_quizzes: usize,
    pub total_time_spent: u64,
    pub recent_activity: Vec<RecentActivity>,
    pub quiz_results: Vec<QuizResult>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackRow {
    pub exercise_id: String,
    pub chapter: String,
    pub question_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_question_id: Option<String>,
    pub difficulty: Difficulty,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentOverview {
    pub id: String,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<String>,
    pub completion_rate: u32,
    pub average_score: u32,
    pub time_spent: u64,
    pub completed_exercises: usize,
    pub feedback: Vec<FeedbackRow>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackStats {
    pub overall: DifficultyDistribution,
    pub chapters: Vec<ChapterDistribution>,
}

fn quiz_progress(rows: &[Progress]) -> Vec<&Progress> {
    rows.iter().filter(|p| p.quiz_id.is_some()).collect()
}

/// Percent change between two windows, 0 when the earlier one is empty.
pub fn growth(current: usize, previous: usize) -> f64 {
    if previous == 0 {
        return 0.0;
    }
    let change = 100.0 * (current as f64 - previous as f64) / previous as f64;
    calc::round_off_1_decimal(change)
}

pub fn admin_stats(store: &dyn Store, session: &Session) -> AppResult<AdminStats> {
    access::require_admin(session)?;
    let now = Utc::now();
    let students: Vec<User> =
        store.load_by_index(Collection::Users, "by-role", Role::Student.as_str())?;
    let progress: Vec<Progress> = store.load_all(Collection::Progress)?;
    let quiz_rows = quiz_progress(&progress);

    let week_ago = now - Duration::days(7);
    let mut active: HashSet<&str> = progress
        .iter()
        .filter(|p| p.completed_at >= week_ago)
        .map(|p| p.student_id.as_str())
        .collect();
    let quiz_subs: Vec<QuizSubmission> = store.load_all(Collection::QuizSubmissions)?;
    let exercise_subs: Vec<ExerciseSubmission> = store.load_all(Collection::ExerciseSubmissions)?;
    active.extend(
        quiz_subs
            .iter()
            .filter(|s| s.created_at >= week_ago)
            .map(|s| s.student_id.as_str()),
    );
    active.extend(
        exercise_subs
            .iter()
            .filter(|s| s.created_at >= week_ago)
            .map(|s| s.student_id.as_str()),
    );

    let month_ago = now - Duration::days(30);
    let two_months_ago = now - Duration::days(60);
    let recent = students.iter().filter(|u| u.created_at >= month_ago).count();
    let earlier = students
        .iter()
        .filter(|u| u.created_at >= two_months_ago && u.created_at < month_ago)
        .count();

    Ok(AdminStats {
        total_students: students.len(),
        active_quizzes: store.get_all(Collection::Quizzes)?.len(),
        active_exercises: store.get_all(Collection::Exercises)?.len(),
        completion_rate: calc::completion_rate(quiz_rows.iter().copied()),
        average_score: calc::average_score(quiz_rows.iter().copied()),
        total_time_spent: calc::time_spent(quiz_rows.iter().copied()),
        weekly_active_users: active.len(),
        monthly_growth: growth(recent, earlier),
    })
}

fn as_session(user: &User) -> Session {
    Session {
        session_id: String::new(),
        user_id: user.id.clone(),
        role: user.role,
        full_name: user.full_name.clone(),
        grade_level: user.grade_level.clone(),
        expires_at: Utc::now(),
    }
}

/// Resolves whose statistics `session` asks for. Teachers may only look at
/// students enrolled in one of their classes.
fn target_student(store: &dyn Store, session: &Session, student_id: Option<&str>) -> AppResult<User> {
    let id = match (session.role, student_id) {
        (Role::Student, Some(other)) if other != session.user_id => {
            return Err(AppError::forbidden("students can only view their own statistics"));
        }
        (Role::Student, _) => session.user_id.as_str(),
        (_, Some(id)) => id,
        (_, None) => return Err(AppError::validation("missing studentId")),
    };
    let user = store
        .load::<User>(Collection::Users, id)?
        .filter(|u| u.role == Role::Student)
        .ok_or_else(|| AppError::not_found("student"))?;

    if session.role == Role::Teacher {
        let links: Vec<Enrollment> = store.load_by_index(Collection::Enrollments, "by-user", &user.id)?;
        let mut teaches = false;
        for link in links {
            if let Some(class) = store.load::<Class>(Collection::Classes, &link.class_id)? {
                if class.teacher_id == session.user_id {
                    teaches = true;
                    break;
                }
            }
        }
        if !teaches {
            return Err(AppError::forbidden("student is not in one of your classes"));
        }
    }
    Ok(user)
}

pub fn student_stats(
    store: &dyn Store,
    session: &Session,
    student_id: Option<&str>,
) -> AppResult<StudentStats> {
    let student = target_student(store, session, student_id)?;
    let viewer = as_session(&student);

    let quizzes: HashMap<String, Quiz> = store
        .load_all::<Quiz>(Collection::Quizzes)?
        .into_iter()
        .map(|q| (q.id.clone(), q))
        .collect();
    let mut total_quizzes = 0;
    for q in quizzes.values() {
        if visible_to(store, &viewer, &q.created_by, q.class_id.as_deref(), &q.grade_level)? {
            total_quizzes += 1;
        }
    }

    let progress: Vec<Progress> = store.load_by_index(Collection::Progress, "by-student", &student.id)?;
    let quiz_rows = quiz_progress(&progress);
    let completed: Vec<&Progress> = quiz_rows.iter().copied().filter(|p| p.is_complete).collect();

    let mut recent: Vec<&Progress> = progress.iter().collect();
    recent.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    let mut recent_activity = Vec::new();
    for p in recent.into_iter().take(RECENT_ACTIVITY) {
        let (kind, item_id, title) = match (&p.quiz_id, &p.exercise_id) {
            (Some(q), _) => (
                "quiz",
                q.clone(),
                quizzes.get(q).map(|q| q.title.clone()).unwrap_or_default(),
            ),
            (None, Some(e)) => (
                "exercise",
                e.clone(),
                store
                    .load::<Exercise>(Collection::Exercises, e)?
                    .map(|e| e.chapter)
                    .unwrap_or_default(),
            ),
            (None, None) => continue,
        };
        recent_activity.push(RecentActivity {
            kind,
            item_id,
            title,
            score: p.score,
            status: p.status,
            at: p.completed_at,
        });
    }

    let mut quiz_results: Vec<QuizResult> = completed
        .iter()
        .filter_map(|p| {
            let quiz = quizzes.get(p.quiz_id.as_deref()?)?;
            Some(QuizResult {
                quiz_id: quiz.id.clone(),
                title: quiz.title.clone(),
                chapter: quiz.chapter.clone(),
                score: p.score,
                time_spent: p.time_spent,
                completed_at: p.completed_at,
            })
        })
        .collect();
    quiz_results.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));

    let completion_rate = if total_quizzes == 0 {
        0
    } else {
        (100.0 * completed.len() as f64 / total_quizzes as f64)
            .round()
            .min(100.0) as u32
    };

    Ok(StudentStats {
        student_id: student.id.clone(),
        completed_quizzes: completed.len(),
        total_quizzes,
        completion_rate,
        average_score: calc::average_score(completed.iter().copied()),
        successful_quizzes: completed.iter().filter(|p| p.score >= SUCCESS_SCORE).count(),
        failed_quizzes: completed.iter().filter(|p| p.score < FAIL_SCORE).count(),
        in_progress_quizzes: quiz_rows.iter().filter(|p| !p.is_complete).count(),
        total_time_spent: calc::time_spent(quiz_rows.iter().copied()),
        recent_activity,
        quiz_results,
    })
}

fn feedback_rows(progress: &[Progress], exercises: &HashMap<String, Exercise>) -> Vec<FeedbackRow> {
    let mut rows: Vec<FeedbackRow> = progress
        .iter()
        .filter_map(|p| {
            let exercise = exercises.get(p.exercise_id.as_deref()?)?;
            Some((p, exercise))
        })
        .flat_map(|(p, exercise)| {
            p.exercise_feedback.iter().map(move |f| FeedbackRow {
                exercise_id: exercise.id.clone(),
                chapter: exercise.chapter.clone(),
                question_id: f.question_id.clone(),
                sub_question_id: f.sub_question_id.clone(),
                difficulty: f.difficulty,
                timestamp: f.timestamp,
            })
        })
        .collect();
    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    rows
}

fn exercises_by_id(store: &dyn Store) -> AppResult<HashMap<String, Exercise>> {
    Ok(store
        .load_all::<Exercise>(Collection::Exercises)?
        .into_iter()
        .map(|e| (e.id.clone(), e))
        .collect())
}

pub fn students_overview(store: &dyn Store, session: &Session) -> AppResult<Vec<StudentOverview>> {
    access::require_admin(session)?;
    let exercises = exercises_by_id(store)?;
    let students: Vec<User> =
        store.load_by_index(Collection::Users, "by-role", Role::Student.as_str())?;

    let mut out = Vec::with_capacity(students.len());
    for s in students {
        let progress: Vec<Progress> = store.load_by_index(Collection::Progress, "by-student", &s.id)?;
        let quiz_rows = quiz_progress(&progress);
        let completed_exercises = progress
            .iter()
            .filter(|p| p.exercise_id.is_some() && p.is_complete)
            .count();
        out.push(StudentOverview {
            completion_rate: calc::completion_rate(quiz_rows.iter().copied()),
            average_score: calc::average_score(quiz_rows.iter().copied()),
            time_spent: calc::time_spent(quiz_rows.iter().copied()),
            completed_exercises,
            feedback: feedback_rows(&progress, &exercises),
            id: s.id,
            full_name: s.full_name,
            email: s.email,
            grade_level: s.grade_level,
        });
    }
    Ok(out)
}

/// Difficulty ratings across every exercise the caller can manage, overall
/// and per chapter.
pub fn feedback_stats(store: &dyn Store, session: &Session) -> AppResult<FeedbackStats> {
    access::require_author(session)?;
    let mut exercises = exercises_by_id(store)?;
    if session.role == Role::Teacher {
        let mine: HashSet<String> = store
            .load_by_index::<Class>(Collection::Classes, "by-teacher", &session.user_id)?
            .into_iter()
            .map(|c| c.id)
            .collect();
        exercises.retain(|_, e| {
            e.created_by == session.user_id
                || e.class_id.as_ref().map(|k| mine.contains(k)).unwrap_or(false)
        });
    }

    let progress: Vec<Progress> = store.load_all(Collection::Progress)?;
    let rows = feedback_rows(&progress, &exercises);
    Ok(FeedbackStats {
        overall: calc::difficulty_distribution(rows.iter().map(|r| r.difficulty)),
        chapters: calc::chapter_breakdown(rows.iter().map(|r| (r.chapter.clone(), r.difficulty))),
    })
}
