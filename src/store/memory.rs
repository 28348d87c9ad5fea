use super::{check_unique, index_value, record_id, Collection, Record, Store, StoreError};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Default)]
struct Table {
    // id -> (insertion sequence, document)
    rows: HashMap<String, (u64, Record)>,
}

#[derive(Debug)]
struct Snapshot {
    tables: Vec<(Collection, Option<Table>)>,
    seq: u64,
}

/// In-process datastore. Nothing survives the process; a transaction keeps a
/// copy of its scoped collections and restores it on rollback.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: BTreeMap<Collection, Table>,
    seq: u64,
    snapshot: Option<Snapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn ordered(table: Option<&Table>) -> Vec<Record> {
        let Some(table) = table else {
            return Vec::new();
        };
        let mut rows: Vec<&(u64, Record)> = table.rows.values().collect();
        rows.sort_by_key(|(seq, _)| *seq);
        rows.into_iter().map(|(_, r)| r.clone()).collect()
    }
}

impl Store for MemoryStore {
    fn get(&self, collection: Collection, id: &str) -> Result<Option<Record>, StoreError> {
        Ok(self
            .tables
            .get(&collection)
            .and_then(|t| t.rows.get(id))
            .map(|(_, r)| r.clone()))
    }

    fn get_all(&self, collection: Collection) -> Result<Vec<Record>, StoreError> {
        Ok(Self::ordered(self.tables.get(&collection)))
    }

    fn get_all_by_index(
        &self,
        collection: Collection,
        index: &str,
        value: &str,
    ) -> Result<Vec<Record>, StoreError> {
        let def = collection.index(index)?;
        Ok(Self::ordered(self.tables.get(&collection))
            .into_iter()
            .filter(|r| index_value(r, def) == Some(value))
            .collect())
    }

    fn put(&mut self, collection: Collection, record: Record) -> Result<Record, StoreError> {
        let id = record_id(collection, &record)?;
        check_unique(&*self, collection, &id, &record)?;
        let table = self.tables.entry(collection).or_default();
        let seq = match table.rows.get(&id) {
            Some((seq, _)) => *seq,
            None => {
                self.seq += 1;
                self.seq
            }
        };
        table.rows.insert(id, (seq, record.clone()));
        Ok(record)
    }

    fn delete(&mut self, collection: Collection, id: &str) -> Result<(), StoreError> {
        if let Some(t) = self.tables.get_mut(&collection) {
            t.rows.remove(id);
        }
        Ok(())
    }

    fn begin(&mut self, scope: &[Collection]) -> Result<(), StoreError> {
        if self.snapshot.is_some() {
            return Err(StoreError::NestedTransaction);
        }
        let tables = scope
            .iter()
            .map(|c| (*c, self.tables.get(c).cloned()))
            .collect();
        self.snapshot = Some(Snapshot {
            tables,
            seq: self.seq,
        });
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        self.snapshot
            .take()
            .map(|_| ())
            .ok_or(StoreError::NoTransaction)
    }

    fn rollback(&mut self) -> Result<(), StoreError> {
        let snap = self.snapshot.take().ok_or(StoreError::NoTransaction)?;
        for (collection, table) in snap.tables {
            match table {
                Some(t) => {
                    self.tables.insert(collection, t);
                }
                None => {
                    self.tables.remove(&collection);
                }
            }
        }
        self.seq = snap.seq;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::store::transaction;
    use serde_json::json;

    #[test]
    fn get_all_keeps_insertion_order_across_upserts() {
        let mut s = MemoryStore::new();
        s.put(Collection::Chapters, json!({ "id": "b", "classId": "c1" }))
            .expect("put b");
        s.put(Collection::Chapters, json!({ "id": "a", "classId": "c1" }))
            .expect("put a");
        s.put(Collection::Chapters, json!({ "id": "b", "classId": "c1", "title": "x" }))
            .expect("upsert b");

        let ids: Vec<String> = s
            .get_all(Collection::Chapters)
            .expect("all")
            .iter()
            .map(|r| r["id"].as_str().unwrap_or("").to_string())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
        let b = s.get(Collection::Chapters, "b").expect("get").expect("b");
        assert_eq!(b["title"], "x");
    }

    #[test]
    fn unique_index_rejects_second_email() {
        let mut s = MemoryStore::new();
        s.put(Collection::Users, json!({ "id": "u1", "email": "a@x.org" }))
            .expect("first");
        let err = s
            .put(Collection::Users, json!({ "id": "u2", "email": "a@x.org" }))
            .expect_err("duplicate");
        assert!(matches!(err, StoreError::Unique { .. }));
        // Re-putting the owner of the value is an update, not a clash.
        s.put(Collection::Users, json!({ "id": "u1", "email": "a@x.org", "fullName": "A" }))
            .expect("update");
    }

    #[test]
    fn failed_transaction_leaves_no_partial_writes() {
        let mut s = MemoryStore::new();
        s.put(Collection::Quizzes, json!({ "id": "q0" })).expect("seed");

        let res: Result<(), AppError> =
            transaction(&mut s, &[Collection::Quizzes], |tx| {
                tx.put(Collection::Quizzes, json!({ "id": "q1" }))?;
                tx.delete(Collection::Quizzes, "q0")?;
                Err(AppError::validation("boom"))
            });
        assert!(res.is_err());

        assert!(s.get(Collection::Quizzes, "q0").expect("get").is_some());
        assert!(s.get(Collection::Quizzes, "q1").expect("get").is_none());
    }

    #[test]
    fn writes_outside_scope_abort_the_transaction() {
        let mut s = MemoryStore::new();
        let res: Result<(), AppError> =
            transaction(&mut s, &[Collection::Quizzes], |tx| {
                tx.put(Collection::Quizzes, json!({ "id": "q1" }))?;
                tx.put(Collection::Messages, json!({ "id": "m1" }))?;
                Ok(())
            });
        assert!(matches!(
            res,
            Err(AppError::Storage(StoreError::OutOfScope("messages")))
        ));
        assert!(s.get(Collection::Quizzes, "q1").expect("get").is_none());
    }

    #[test]
    fn index_lookup_filters_by_field() {
        let mut s = MemoryStore::new();
        s.put(Collection::Messages, json!({ "id": "m1", "recipientId": "u1" }))
            .expect("m1");
        s.put(Collection::Messages, json!({ "id": "m2", "recipientId": "u2" }))
            .expect("m2");
        let found = s
            .get_all_by_index(Collection::Messages, "by-recipient", "u2")
            .expect("index");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["id"], "m2");
        assert!(s
            .get_all_by_index(Collection::Messages, "by-nothing", "u2")
            .is_err());
    }
}
