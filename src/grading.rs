//! Student submissions: exercise solutions, graded quiz attempts, saved
//! progress and per-question difficulty feedback.

use crate::access::{self, Level};
use crate::auth::Session;
use crate::curriculum::{exercises, quizzes};
use crate::error::{AppError, AppResult};
use crate::messaging;
use crate::model::{
    Answer, Difficulty, Exercise, ExerciseSubmission, FeedbackEntry, GradedAnswer,
    NotificationKind, Progress, ProgressStatus, Quiz, QuizSubmission, Role, Solution,
};
use crate::store::{transaction, Collection, Store, StoreExt};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub answer: Answer,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAttempt {
    pub answers: Vec<SubmittedAnswer>,
    #[serde(default)]
    pub time_spent: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressDraft {
    #[serde(default)]
    pub answers: Map<String, Value>,
    #[serde(default)]
    pub time_spent: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackInput {
    pub question_id: String,
    #[serde(default)]
    pub sub_question_id: Option<String>,
    pub difficulty: Difficulty,
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Fraction of `expected` matched by `given`, blank by blank.
pub fn credit(expected: &Answer, given: &Answer) -> f64 {
    let want = expected.as_list();
    if want.is_empty() {
        return 0.0;
    }
    let got = given.as_list();
    let correct = want
        .iter()
        .enumerate()
        .filter(|(i, w)| got.get(*i).map(|g| normalize(g) == normalize(w)).unwrap_or(false))
        .count();
    correct as f64 / want.len() as f64
}

/// Grades an attempt against the quiz's answer key. Unanswered questions earn
/// nothing; answers to unknown questions or repeated answers are rejected.
pub fn grade(quiz: &Quiz, answers: &[SubmittedAnswer]) -> AppResult<(u32, Vec<GradedAnswer>)> {
    let known: HashSet<&str> = quiz.questions.iter().map(|q| q.id.as_str()).collect();
    let mut by_question: HashMap<&str, &Answer> = HashMap::new();
    for a in answers {
        if !known.contains(a.question_id.as_str()) {
            return Err(AppError::validation_with(
                "answer references an unknown question",
                json!({ "questionId": a.question_id }),
            ));
        }
        if by_question.insert(a.question_id.as_str(), &a.answer).is_some() {
            return Err(AppError::validation_with(
                "question answered more than once",
                json!({ "questionId": a.question_id }),
            ));
        }
    }

    let mut total_credit = 0.0;
    let mut graded = Vec::with_capacity(quiz.questions.len());
    for q in &quiz.questions {
        let given = by_question
            .get(q.id.as_str())
            .map(|a| (*a).clone())
            .unwrap_or_else(|| Answer::One(String::new()));
        let c = credit(&q.answer, &given);
        total_credit += c;
        graded.push(GradedAnswer {
            question_id: q.id.clone(),
            submitted_answer: given,
            correct_answer: q.answer.clone(),
            is_correct: c >= 1.0,
            credit: c,
        });
    }
    let score = if quiz.questions.is_empty() {
        0
    } else {
        (100.0 * total_credit / quiz.questions.len() as f64).round() as u32
    };
    Ok((score.min(100), graded))
}

pub fn submit_quiz(
    store: &mut dyn Store,
    session: &Session,
    quiz_id: &str,
    attempt: QuizAttempt,
) -> AppResult<QuizSubmission> {
    access::require_student(session)?;
    let quiz = quizzes::authorize(store, session, quiz_id, Level::Read)?;
    let (score, graded) = grade(&quiz, &attempt.answers)?;
    let now = Utc::now();

    let submission = QuizSubmission {
        id: Uuid::new_v4().to_string(),
        quiz_id: quiz.id.clone(),
        student_id: session.user_id.clone(),
        score,
        answers: graded,
        time_spent: attempt.time_spent,
        created_at: now,
    };
    let answers: Map<String, Value> = attempt
        .answers
        .iter()
        .map(|a| (a.question_id.clone(), json!(a.answer)))
        .collect();
    let progress = Progress {
        id: Progress::key(&session.user_id, &quiz.id),
        student_id: session.user_id.clone(),
        quiz_id: Some(quiz.id.clone()),
        exercise_id: None,
        score,
        is_complete: true,
        status: ProgressStatus::Completed,
        answers,
        time_spent: attempt.time_spent,
        completed_at: now,
        exercise_feedback: Vec::new(),
    };

    let scope = [
        Collection::QuizSubmissions,
        Collection::Progress,
        Collection::Notifications,
    ];
    let body = format!("You scored {}% on {}", score, quiz.title);
    transaction(store, &scope, |tx| {
        tx.save(Collection::QuizSubmissions, &submission)?;
        tx.save(Collection::Progress, &progress)?;
        messaging::notify(
            tx,
            &[session.user_id.clone()],
            NotificationKind::Quiz,
            "Quiz completed",
            &body,
        )?;
        Ok(())
    })?;
    info!(quiz_id = %quiz.id, student_id = %session.user_id, score, "quiz submitted");
    Ok(submission)
}

/// Stores an unfinished attempt. A completed attempt is never downgraded.
pub fn save_progress(
    store: &mut dyn Store,
    session: &Session,
    quiz_id: &str,
    draft: ProgressDraft,
) -> AppResult<Progress> {
    access::require_student(session)?;
    let quiz = quizzes::authorize(store, session, quiz_id, Level::Read)?;
    let key = Progress::key(&session.user_id, &quiz.id);
    if let Some(existing) = store.load::<Progress>(Collection::Progress, &key)? {
        if existing.is_complete {
            return Err(AppError::validation("quiz already completed"));
        }
    }
    let progress = Progress {
        id: key,
        student_id: session.user_id.clone(),
        quiz_id: Some(quiz.id),
        exercise_id: None,
        score: 0,
        is_complete: false,
        status: ProgressStatus::InProgress,
        answers: draft.answers,
        time_spent: draft.time_spent,
        completed_at: Utc::now(),
        exercise_feedback: Vec::new(),
    };
    store.save(Collection::Progress, &progress)?;
    Ok(progress)
}

fn exercise_progress(store: &dyn Store, student_id: &str, exercise: &Exercise) -> AppResult<Progress> {
    let key = Progress::key(student_id, &exercise.id);
    Ok(store
        .load::<Progress>(Collection::Progress, &key)?
        .unwrap_or_else(|| Progress {
            id: key,
            student_id: student_id.to_string(),
            quiz_id: None,
            exercise_id: Some(exercise.id.clone()),
            score: 0,
            is_complete: false,
            status: ProgressStatus::InProgress,
            answers: Map::new(),
            time_spent: 0,
            completed_at: Utc::now(),
            exercise_feedback: Vec::new(),
        }))
}

pub fn submit_solutions(
    store: &mut dyn Store,
    session: &Session,
    exercise_id: &str,
    solutions: Vec<Solution>,
) -> AppResult<ExerciseSubmission> {
    access::require_student(session)?;
    let exercise = exercises::authorize(store, session, exercise_id, Level::Read)?;
    if solutions.is_empty() {
        return Err(AppError::validation("solutions must not be empty"));
    }
    for s in &solutions {
        if exercise.problem(&s.problem_id).is_none() {
            return Err(AppError::validation_with(
                "unknown problemId",
                json!({ "problemId": s.problem_id }),
            ));
        }
        if !exercise.has_node(&s.problem_id, s.sub_problem_id.as_deref()) {
            return Err(AppError::validation_with(
                "unknown subProblemId",
                json!({ "problemId": s.problem_id, "subProblemId": s.sub_problem_id }),
            ));
        }
    }

    let now = Utc::now();
    let submission = ExerciseSubmission {
        id: Uuid::new_v4().to_string(),
        exercise_id: exercise.id.clone(),
        student_id: session.user_id.clone(),
        solutions,
        created_at: now,
    };
    let mut progress = exercise_progress(store, &session.user_id, &exercise)?;
    progress.is_complete = true;
    progress.status = ProgressStatus::Completed;
    progress.completed_at = now;

    transaction(
        store,
        &[Collection::ExerciseSubmissions, Collection::Progress],
        |tx| {
            tx.save(Collection::ExerciseSubmissions, &submission)?;
            tx.save(Collection::Progress, &progress)
        },
    )?;
    info!(exercise_id = %exercise.id, student_id = %session.user_id, "solutions submitted");
    Ok(submission)
}

/// Records a difficulty rating, replacing any earlier rating for the same
/// question and sub-question.
pub fn submit_feedback(
    store: &mut dyn Store,
    session: &Session,
    exercise_id: &str,
    input: FeedbackInput,
) -> AppResult<Vec<FeedbackEntry>> {
    access::require_student(session)?;
    let exercise = exercises::authorize(store, session, exercise_id, Level::Read)?;
    let sub = input.sub_question_id.filter(|s| !s.trim().is_empty());
    if !exercise.has_node(&input.question_id, sub.as_deref()) {
        return Err(AppError::validation_with(
            "feedback references an unknown question",
            json!({ "questionId": input.question_id, "subQuestionId": sub }),
        ));
    }

    let mut progress = exercise_progress(store, &session.user_id, &exercise)?;
    progress
        .exercise_feedback
        .retain(|f| !(f.question_id == input.question_id && f.sub_question_id == sub));
    progress.exercise_feedback.push(FeedbackEntry {
        question_id: input.question_id,
        sub_question_id: sub,
        difficulty: input.difficulty,
        timestamp: Utc::now(),
    });
    store.save(Collection::Progress, &progress)?;
    info!(exercise_id = %exercise.id, student_id = %session.user_id, "feedback recorded");
    Ok(progress.exercise_feedback)
}

pub fn get_feedback(
    store: &dyn Store,
    session: &Session,
    exercise_id: &str,
    student_id: Option<&str>,
) -> AppResult<Vec<FeedbackEntry>> {
    let student_id = match student_id.filter(|s| *s != session.user_id) {
        Some(other) => {
            exercises::authorize(store, session, exercise_id, Level::Write)?;
            other
        }
        None => {
            exercises::authorize(store, session, exercise_id, Level::Read)?;
            session.user_id.as_str()
        }
    };
    let key = Progress::key(student_id, exercise_id);
    Ok(store
        .load::<Progress>(Collection::Progress, &key)?
        .map(|p| p.exercise_feedback)
        .unwrap_or_default())
}

/// Owners and admins see every attempt, students only their own.
pub fn quiz_results(store: &dyn Store, session: &Session, quiz_id: &str) -> AppResult<Vec<QuizSubmission>> {
    let mut rows: Vec<QuizSubmission> = if session.role == Role::Student {
        quizzes::authorize(store, session, quiz_id, Level::Read)?;
        store
            .load_by_index::<QuizSubmission>(Collection::QuizSubmissions, "by-student", &session.user_id)?
            .into_iter()
            .filter(|s| s.quiz_id == quiz_id)
            .collect()
    } else {
        quizzes::authorize(store, session, quiz_id, Level::Write)?;
        store.load_by_index(Collection::QuizSubmissions, "by-quiz", quiz_id)?
    };
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(rows)
}

pub fn exercise_solutions(
    store: &dyn Store,
    session: &Session,
    exercise_id: &str,
) -> AppResult<Vec<ExerciseSubmission>> {
    let mut rows: Vec<ExerciseSubmission> = if session.role == Role::Student {
        exercises::authorize(store, session, exercise_id, Level::Read)?;
        store
            .load_by_index::<ExerciseSubmission>(
                Collection::ExerciseSubmissions,
                "by-student",
                &session.user_id,
            )?
            .into_iter()
            .filter(|s| s.exercise_id == exercise_id)
            .collect()
    } else {
        exercises::authorize(store, session, exercise_id, Level::Write)?;
        store.load_by_index(Collection::ExerciseSubmissions, "by-exercise", exercise_id)?
    };
    rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(rows)
}
