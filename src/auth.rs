//! Accounts, password hashing and bearer sessions.
//!
//! A token is `<sessionId>.<expiresAtUnix>.<hex hmac-sha256>`. It is only
//! honoured while its session record exists, so logging out ends it even
//! before it expires.

use crate::error::{AppError, AppResult};
use crate::model::{
    Enrollment, ExerciseSubmission, Message, Notification, Progress, QuizSubmission, Role,
    SessionRecord, User, UserProfile,
};
use crate::store::{transaction, Collection, Store, StoreExt};
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{info, warn};
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

const MIN_PASSWORD_LEN: usize = 6;

/// The authenticated caller, resolved once per request and handed to every
/// operation.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub role: Role,
    pub full_name: String,
    pub grade_level: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

pub struct TokenSigner {
    secret: Vec<u8>,
    ttl: Duration,
}

impl TokenSigner {
    pub fn new(secret: impl AsRef<[u8]>, ttl_days: i64) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            ttl: Duration::days(ttl_days.max(1)),
        }
    }

    pub fn random(ttl_days: i64) -> Self {
        let mut secret = Uuid::new_v4().as_bytes().to_vec();
        secret.extend_from_slice(Uuid::new_v4().as_bytes());
        Self::new(secret, ttl_days)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn mac(&self, payload: &str) -> AppResult<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("hmac key: {e}")))?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }

    pub fn sign(&self, session_id: &str, expires_at: DateTime<Utc>) -> AppResult<String> {
        let payload = format!("{}.{}", session_id, expires_at.timestamp());
        let sig = hex::encode(self.mac(&payload)?.finalize().into_bytes());
        Ok(format!("{}.{}", payload, sig))
    }

    /// Returns the session id and expiry carried by a correctly signed token.
    pub fn verify(&self, token: &str) -> AppResult<Option<(String, DateTime<Utc>)>> {
        let Some((payload, sig)) = token.rsplit_once('.') else {
            return Ok(None);
        };
        let Some((session_id, exp)) = payload.split_once('.') else {
            return Ok(None);
        };
        let Ok(sig) = hex::decode(sig) else {
            return Ok(None);
        };
        if self.mac(payload)?.verify_slice(&sig).is_err() {
            return Ok(None);
        }
        let Some(expires_at) = exp
            .parse::<i64>()
            .ok()
            .and_then(|t| Utc.timestamp_opt(t, 0).single())
        else {
            return Ok(None);
        };
        Ok(Some((session_id.to_string(), expires_at)))
    }
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::encode_b64(Uuid::new_v4().as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("salt: {e}")))?;
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("hash password: {e}")))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterParams {
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: Role,
    #[serde(default)]
    pub grade_level: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginParams {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub user: UserProfile,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.ends_with('.'),
        None => false,
    };
    if !valid {
        return Err(AppError::validation_with(
            "invalid email",
            serde_json::json!({ "field": "email" }),
        ));
    }
    Ok(email)
}

pub fn register(
    store: &mut dyn Store,
    signer: &TokenSigner,
    caller: Option<&Session>,
    params: RegisterParams,
) -> AppResult<LoginResult> {
    let email = normalize_email(&params.email)?;
    if params.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::validation_with(
            format!("password must be at least {} characters", MIN_PASSWORD_LEN),
            serde_json::json!({ "field": "password" }),
        ));
    }
    let full_name = params.full_name.trim().to_string();
    if full_name.is_empty() {
        return Err(AppError::validation_with(
            "fullName must not be empty",
            serde_json::json!({ "field": "fullName" }),
        ));
    }

    if params.role == Role::Admin {
        let caller_is_admin = caller.map(|s| s.is_admin()).unwrap_or(false);
        let has_admin = store
            .find_by_index::<User>(Collection::Users, "by-role", Role::Admin.as_str())?
            .is_some();
        if has_admin && !caller_is_admin {
            return Err(AppError::forbidden("only an admin can create another admin"));
        }
    }

    if store
        .find_by_index::<User>(Collection::Users, "by-email", &email)?
        .is_some()
    {
        return Err(AppError::validation_with(
            "email already exists",
            serde_json::json!({ "field": "email" }),
        ));
    }

    let user = User {
        id: Uuid::new_v4().to_string(),
        email,
        password_hash: hash_password(&params.password)?,
        full_name,
        role: params.role,
        grade_level: params
            .grade_level
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty()),
        created_at: Utc::now(),
    };
    store.save(Collection::Users, &user)?;
    info!(user_id = %user.id, role = user.role.as_str(), "user registered");

    open_session(store, signer, &user)
}

pub fn login(
    store: &mut dyn Store,
    signer: &TokenSigner,
    params: LoginParams,
) -> AppResult<LoginResult> {
    let email = params.email.trim().to_lowercase();
    let user = store.find_by_index::<User>(Collection::Users, "by-email", &email)?;
    let Some(user) = user.filter(|u| verify_password(&params.password, &u.password_hash)) else {
        warn!("login rejected");
        return Err(AppError::unauthenticated("invalid credentials"));
    };
    open_session(store, signer, &user)
}

fn open_session(
    store: &mut dyn Store,
    signer: &TokenSigner,
    user: &User,
) -> AppResult<LoginResult> {
    let now = Utc::now();
    let record = SessionRecord {
        id: Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        created_at: now,
        expires_at: now + signer.ttl(),
    };
    let token = signer.sign(&record.id, record.expires_at)?;

    transaction(store, &[Collection::Sessions], |tx| {
        let existing: Vec<SessionRecord> =
            tx.load_by_index(Collection::Sessions, "by-user", &user.id)?;
        for stale in existing.iter().filter(|s| s.expires_at <= now) {
            tx.delete(Collection::Sessions, &stale.id)?;
        }
        tx.save(Collection::Sessions, &record)
    })?;
    info!(user_id = %user.id, session_id = %record.id, "session opened");

    Ok(LoginResult {
        user: UserProfile::from(user),
        token,
        expires_at: record.expires_at,
    })
}

pub fn authenticate(store: &dyn Store, signer: &TokenSigner, token: &str) -> AppResult<Session> {
    let Some((session_id, expires_at)) = signer.verify(token.trim())? else {
        warn!("rejected token with bad signature");
        return Err(AppError::unauthenticated("invalid token"));
    };
    if expires_at <= Utc::now() {
        return Err(AppError::unauthenticated("token expired"));
    }
    let Some(record) = store.load::<SessionRecord>(Collection::Sessions, &session_id)? else {
        return Err(AppError::unauthenticated("session ended"));
    };
    let Some(user) = store.load::<User>(Collection::Users, &record.user_id)? else {
        return Err(AppError::unauthenticated("invalid token"));
    };
    Ok(Session {
        session_id: record.id,
        user_id: user.id,
        role: user.role,
        full_name: user.full_name,
        grade_level: user.grade_level,
        expires_at,
    })
}

pub fn logout(store: &mut dyn Store, session: &Session) -> AppResult<()> {
    store.delete(Collection::Sessions, &session.session_id)?;
    info!(user_id = %session.user_id, session_id = %session.session_id, "session closed");
    Ok(())
}

pub fn me(store: &dyn Store, session: &Session) -> AppResult<UserProfile> {
    store
        .load::<User>(Collection::Users, &session.user_id)?
        .map(|u| UserProfile::from(&u))
        .ok_or_else(|| AppError::not_found("user"))
}

pub fn list_users(store: &dyn Store, session: &Session) -> AppResult<Vec<UserProfile>> {
    if !session.is_admin() {
        return Err(AppError::forbidden("admin only"));
    }
    let users: Vec<User> = store.load_all(Collection::Users)?;
    Ok(users.iter().map(UserProfile::from).collect())
}

/// Removes a user together with everything recorded about them. Authors must
/// hand over or delete their classes and content first.
pub fn delete_user(store: &mut dyn Store, session: &Session, user_id: &str) -> AppResult<()> {
    if !session.is_admin() {
        return Err(AppError::forbidden("admin only"));
    }
    if user_id == session.user_id {
        return Err(AppError::validation("cannot delete your own account"));
    }
    if store.load::<User>(Collection::Users, user_id)?.is_none() {
        return Err(AppError::not_found("user"));
    }

    // Owned curriculum would be left pointing at a missing author.
    let classes = store
        .get_all_by_index(Collection::Classes, "by-teacher", user_id)?
        .len();
    let exercises = store
        .get_all_by_index(Collection::Exercises, "by-creator", user_id)?
        .len();
    let quizzes = store
        .get_all_by_index(Collection::Quizzes, "by-creator", user_id)?
        .len();
    if classes + exercises + quizzes > 0 {
        return Err(AppError::validation_with(
            "user still owns classes or content",
            serde_json::json!({
                "userId": user_id,
                "classes": classes,
                "exercises": exercises,
                "quizzes": quizzes,
            }),
        ));
    }

    let scope = [
        Collection::Users,
        Collection::Sessions,
        Collection::Enrollments,
        Collection::ExerciseSubmissions,
        Collection::QuizSubmissions,
        Collection::Progress,
        Collection::Messages,
        Collection::Notifications,
    ];
    transaction(store, &scope, |tx| {
        for s in tx.load_by_index::<SessionRecord>(Collection::Sessions, "by-user", user_id)? {
            tx.delete(Collection::Sessions, &s.id)?;
        }
        for e in tx.load_by_index::<Enrollment>(Collection::Enrollments, "by-user", user_id)? {
            tx.delete(Collection::Enrollments, &e.id)?;
        }
        for s in tx.load_by_index::<ExerciseSubmission>(
            Collection::ExerciseSubmissions,
            "by-student",
            user_id,
        )? {
            tx.delete(Collection::ExerciseSubmissions, &s.id)?;
        }
        for s in
            tx.load_by_index::<QuizSubmission>(Collection::QuizSubmissions, "by-student", user_id)?
        {
            tx.delete(Collection::QuizSubmissions, &s.id)?;
        }
        for p in tx.load_by_index::<Progress>(Collection::Progress, "by-student", user_id)? {
            tx.delete(Collection::Progress, &p.id)?;
        }
        for m in tx.load_by_index::<Message>(Collection::Messages, "by-recipient", user_id)? {
            tx.delete(Collection::Messages, &m.id)?;
        }
        for n in
            tx.load_by_index::<Notification>(Collection::Notifications, "by-recipient", user_id)?
        {
            tx.delete(Collection::Notifications, &n.id)?;
        }
        tx.delete(Collection::Users, user_id)?;
        Ok(())
    })?;
    info!(user_id, "user deleted");
    Ok(())
}
