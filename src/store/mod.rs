//! Storage contract shared by every operation.
//!
//! Records are JSON documents keyed by their `id` field and grouped into
//! collections. Two adapters implement the contract: [`sqlite::SqliteStore`]
//! for workspaces on disk and [`memory::MemoryStore`] for an in-process
//! datastore. Domain code only ever sees `&mut dyn Store`.

pub mod memory;
pub mod sqlite;

use crate::error::{AppError, AppResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub type Record = serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Users,
    Sessions,
    Classes,
    Enrollments,
    Chapters,
    Exercises,
    Quizzes,
    ExerciseSubmissions,
    QuizSubmissions,
    Progress,
    Notifications,
    Messages,
}

#[derive(Debug)]
pub struct IndexDef {
    pub name: &'static str,
    pub field: &'static str,
    pub unique: bool,
}

const fn idx(name: &'static str, field: &'static str) -> IndexDef {
    IndexDef {
        name,
        field,
        unique: false,
    }
}

const USERS_INDEXES: &[IndexDef] = &[
    IndexDef {
        name: "by-email",
        field: "email",
        unique: true,
    },
    idx("by-role", "role"),
];
const SESSIONS_INDEXES: &[IndexDef] = &[idx("by-user", "userId")];
const CLASSES_INDEXES: &[IndexDef] = &[idx("by-teacher", "teacherId")];
const ENROLLMENTS_INDEXES: &[IndexDef] = &[idx("by-user", "userId"), idx("by-class", "classId")];
const CHAPTERS_INDEXES: &[IndexDef] = &[idx("by-class", "classId")];
const CONTENT_INDEXES: &[IndexDef] = &[idx("by-creator", "createdBy"), idx("by-class", "classId")];
const EXERCISE_SUBMISSIONS_INDEXES: &[IndexDef] =
    &[idx("by-exercise", "exerciseId"), idx("by-student", "studentId")];
const QUIZ_SUBMISSIONS_INDEXES: &[IndexDef] =
    &[idx("by-quiz", "quizId"), idx("by-student", "studentId")];
const PROGRESS_INDEXES: &[IndexDef] = &[
    idx("by-student", "studentId"),
    idx("by-quiz", "quizId"),
    idx("by-exercise", "exerciseId"),
];
const RECIPIENT_INDEXES: &[IndexDef] = &[idx("by-recipient", "recipientId")];

impl Collection {
    pub const ALL: [Collection; 12] = [
        Collection::Users,
        Collection::Sessions,
        Collection::Classes,
        Collection::Enrollments,
        Collection::Chapters,
        Collection::Exercises,
        Collection::Quizzes,
        Collection::ExerciseSubmissions,
        Collection::QuizSubmissions,
        Collection::Progress,
        Collection::Notifications,
        Collection::Messages,
    ];

    /// Table name in SQLite and label in logs.
    pub fn name(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Sessions => "sessions",
            Collection::Classes => "classes",
            Collection::Enrollments => "enrollments",
            Collection::Chapters => "chapters",
            Collection::Exercises => "exercises",
            Collection::Quizzes => "quizzes",
            Collection::ExerciseSubmissions => "exercise_submissions",
            Collection::QuizSubmissions => "quiz_submissions",
            Collection::Progress => "progress",
            Collection::Notifications => "notifications",
            Collection::Messages => "messages",
        }
    }

    pub fn indexes(self) -> &'static [IndexDef] {
        match self {
            Collection::Users => USERS_INDEXES,
            Collection::Sessions => SESSIONS_INDEXES,
            Collection::Classes => CLASSES_INDEXES,
            Collection::Enrollments => ENROLLMENTS_INDEXES,
            Collection::Chapters => CHAPTERS_INDEXES,
            Collection::Exercises | Collection::Quizzes => CONTENT_INDEXES,
            Collection::ExerciseSubmissions => EXERCISE_SUBMISSIONS_INDEXES,
            Collection::QuizSubmissions => QUIZ_SUBMISSIONS_INDEXES,
            Collection::Progress => PROGRESS_INDEXES,
            Collection::Notifications | Collection::Messages => RECIPIENT_INDEXES,
        }
    }

    pub fn index(self, name: &str) -> Result<&'static IndexDef, StoreError> {
        self.indexes()
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| StoreError::UnknownIndex {
                collection: self.name(),
                index: name.to_string(),
            })
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0} record has no string id")]
    MissingId(&'static str),

    #[error("unknown index {index} on {collection}")]
    UnknownIndex {
        collection: &'static str,
        index: String,
    },

    #[error("duplicate value for unique index {index} on {collection}")]
    Unique {
        collection: &'static str,
        index: &'static str,
    },

    #[error("collection {0} is outside the transaction scope")]
    OutOfScope(&'static str),

    #[error("a transaction is already open")]
    NestedTransaction,

    #[error("no transaction is open")]
    NoTransaction,
}

pub trait Store {
    fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>, StoreError>;

    fn get_all(&self, collection: Collection) -> Result<Vec<Record>, StoreError>;

    /// All records whose indexed field equals `value`, in insertion order.
    fn get_all_by_index(
        &self,
        collection: Collection,
        index: &str,
        value: &str,
    ) -> Result<Vec<Record>, StoreError>;

    fn get_by_index(
        &self,
        collection: Collection,
        index: &str,
        value: &str,
    ) -> Result<Option<Record>, StoreError> {
        Ok(self
            .get_all_by_index(collection, index, value)?
            .into_iter()
            .next())
    }

    /// Upsert keyed by the record's `id`.
    fn put(&mut self, collection: Collection, record: Record) -> Result<Record, StoreError>;

    fn delete(&mut self, collection: Collection, id: &str) -> Result<(), StoreError>;

    fn begin(&mut self, scope: &[Collection]) -> Result<(), StoreError>;

    fn commit(&mut self) -> Result<(), StoreError>;

    fn rollback(&mut self) -> Result<(), StoreError>;
}

pub(crate) fn record_id(collection: Collection, record: &Record) -> Result<String, StoreError> {
    record
        .get("id")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .ok_or(StoreError::MissingId(collection.name()))
}

pub(crate) fn index_value<'a>(record: &'a Record, def: &IndexDef) -> Option<&'a str> {
    record.get(def.field).and_then(|v| v.as_str())
}

/// Rejects `record` when a different record already holds the same value
/// for one of the collection's unique indexes.
pub(crate) fn check_unique(
    store: &dyn Store,
    collection: Collection,
    id: &str,
    record: &Record,
) -> Result<(), StoreError> {
    for def in collection.indexes().iter().filter(|d| d.unique) {
        let Some(value) = index_value(record, def) else {
            continue;
        };
        let clash = store
            .get_all_by_index(collection, def.name, value)?
            .iter()
            .any(|other| other.get("id").and_then(|v| v.as_str()) != Some(id));
        if clash {
            return Err(StoreError::Unique {
                collection: collection.name(),
                index: def.name,
            });
        }
    }
    Ok(())
}

/// View of a store handed to a transaction body. Writes are limited to the
/// collections the transaction declared.
struct Scoped<'a> {
    inner: &'a mut dyn Store,
    scope: &'a [Collection],
}

impl Scoped<'_> {
    fn check(&self, collection: Collection) -> Result<(), StoreError> {
        if self.scope.contains(&collection) {
            Ok(())
        } else {
            Err(StoreError::OutOfScope(collection.name()))
        }
    }
}

impl Store for Scoped<'_> {
    fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>, StoreError> {
        self.inner.get(collection, id)
    }

    fn get_all(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        self.inner.get_all(collection)
    }

    fn get_all_by_index(
        &self,
        collection: Collection,
        index: &str,
        value: &str,
    ) -> Result<Vec<Record>, StoreError> {
        self.inner.get_all_by_index(collection, index, value)
    }

    fn put(&mut self, collection: Collection, record: Record) -> Result<Record, StoreError> {
        self.check(collection)?;
        self.inner.put(collection, record)
    }

    fn delete(&mut self, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.check(collection)?;
        self.inner.delete(collection, id)
    }

    fn begin(&mut self, _scope: &[Collection]) -> Result<(), StoreError> {
        Err(StoreError::NestedTransaction)
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        Err(StoreError::NoTransaction)
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        Err(StoreError::NoTransaction)
    }
}

/// Runs `body` as one atomic unit of work over `scope`. Any error returned by
/// `body` rolls back every write it made.
pub fn transaction<T, F>(store: &mut dyn Store, scope: &[Collection], body: F) -> AppResult<T>
where
    F: FnOnce(&mut dyn Store) -> AppResult<T>,
{
    store.begin(scope)?;
    let outcome = {
        let mut scoped = Scoped {
            inner: &mut *store,
            scope,
        };
        body(&mut scoped)
    };
    match outcome {
        Ok(value) => {
            if let Err(e) = store.commit() {
                let _ = store.rollback();
                return Err(e.into());
            }
            Ok(value)
        }
        Err(e) => {
            if let Err(rb) = store.rollback() {
                tracing::error!(error = %rb, "rollback failed");
            }
            Err(e)
        }
    }
}

/// Typed access on top of the JSON contract.
pub trait StoreExt: Store {
    fn load<T: DeserializeOwned>(&self, collection: Collection, id: &str) -> AppResult<Option<T>> {
        match self.get(collection, id)? {
            Some(r) => Ok(Some(decode(collection, r)?)),
            None => Ok(None),
        }
    }

    fn load_all<T: DeserializeOwned>(&self, collection: Collection) -> AppResult<Vec<T>> {
        self.get_all(collection)?
            .into_iter()
            .map(|r| decode(collection, r))
            .collect()
    }

    fn load_by_index<T: DeserializeOwned>(
        &self,
        collection: Collection,
        index: &str,
        value: &str,
    ) -> AppResult<Vec<T>> {
        self.get_all_by_index(collection, index, value)?
            .into_iter()
            .map(|r| decode(collection, r))
            .collect()
    }

    fn find_by_index<T: DeserializeOwned>(
        &self,
        collection: Collection,
        index: &str,
        value: &str,
    ) -> AppResult<Option<T>> {
        match self.get_by_index(collection, index, value)? {
            Some(r) => Ok(Some(decode(collection, r)?)),
            None => Ok(None),
        }
    }

    fn save<T: Serialize>(&mut self, collection: Collection, value: &T) -> AppResult<()> {
        let record = serde_json::to_value(value).map_err(StoreError::from)?;
        self.put(collection, record)?;
        Ok(())
    }
}

impl<S: Store + ?Sized> StoreExt for S {}

fn decode<T: DeserializeOwned>(collection: Collection, record: Record) -> AppResult<T> {
    serde_json::from_value(record).map_err(|e| {
        tracing::error!(collection = collection.name(), error = %e, "stored record does not decode");
        AppError::Storage(StoreError::Json(e))
    })
}
