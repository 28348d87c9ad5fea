use super::classes;
use super::required_text;
use crate::access::Level;
use crate::auth::Session;
use crate::error::{AppError, AppResult};
use crate::model::Chapter;
use crate::store::{transaction, Collection, Store, StoreExt};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterInput {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub order: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChapterOrder {
    pub id: String,
    pub order: i64,
}

fn check_order(order: i64) -> AppResult<i64> {
    if order < 0 {
        return Err(AppError::validation_with(
            "order must be >= 0",
            json!({ "field": "order", "value": order }),
        ));
    }
    Ok(order)
}

/// Chapters of a class sorted by `order`, ties by creation time.
pub(crate) fn ordered(store: &dyn Store, class_id: &str) -> AppResult<Vec<Chapter>> {
    let mut rows: Vec<Chapter> = store.load_by_index(Collection::Chapters, "by-class", class_id)?;
    rows.sort_by(|a, b| a.order.cmp(&b.order).then(a.created_at.cmp(&b.created_at)));
    Ok(rows)
}

fn load(store: &dyn Store, session: &Session, id: &str, level: Level) -> AppResult<Chapter> {
    let chapter = store
        .load::<Chapter>(Collection::Chapters, id)?
        .ok_or_else(|| AppError::not_found("chapter"))?;
    classes::authorize(store, session, &chapter.class_id, level)?;
    Ok(chapter)
}

pub fn create(
    store: &mut dyn Store,
    session: &Session,
    class_id: &str,
    input: ChapterInput,
) -> AppResult<Chapter> {
    let class = classes::authorize(store, session, class_id, Level::Write)?;
    let title = required_text(&input.title, "title")?;
    let order = match input.order {
        Some(o) => check_order(o)?,
        None => match ordered(store, &class.id)?.last() {
            Some(last) => last.order.checked_add(1).ok_or_else(|| {
                AppError::validation_with(
                    "no order left after the last chapter",
                    json!({ "field": "order", "value": last.order }),
                )
            })?,
            None => 0,
        },
    };

    let now = Utc::now();
    let chapter = Chapter {
        id: Uuid::new_v4().to_string(),
        class_id: class.id,
        title,
        content: input.content,
        order,
        created_at: now,
        updated_at: now,
    };
    store.save(Collection::Chapters, &chapter)?;
    info!(chapter_id = %chapter.id, class_id = %chapter.class_id, order, "chapter created");
    Ok(chapter)
}

pub fn list(store: &dyn Store, session: &Session, class_id: &str) -> AppResult<Vec<Chapter>> {
    let class = classes::authorize(store, session, class_id, Level::Read)?;
    ordered(store, &class.id)
}

pub fn get(store: &dyn Store, session: &Session, id: &str) -> AppResult<Chapter> {
    load(store, session, id, Level::Read)
}

pub fn update(
    store: &mut dyn Store,
    session: &Session,
    id: &str,
    patch: ChapterPatch,
) -> AppResult<Chapter> {
    let mut chapter = load(store, session, id, Level::Write)?;
    if let Some(title) = patch.title {
        chapter.title = required_text(&title, "title")?;
    }
    if let Some(content) = patch.content {
        chapter.content = content;
    }
    if let Some(order) = patch.order {
        chapter.order = check_order(order)?;
    }
    chapter.updated_at = Utc::now();
    store.save(Collection::Chapters, &chapter)?;
    info!(chapter_id = %chapter.id, "chapter updated");
    Ok(chapter)
}

pub fn delete(store: &mut dyn Store, session: &Session, id: &str) -> AppResult<()> {
    let chapter = load(store, session, id, Level::Write)?;
    store.delete(Collection::Chapters, &chapter.id)?;
    info!(chapter_id = %chapter.id, "chapter deleted");
    Ok(())
}

/// Applies every `(id, order)` pair or none of them, then returns the
/// class's chapters in their new order.
pub fn reorder(
    store: &mut dyn Store,
    session: &Session,
    class_id: &str,
    orders: Vec<ChapterOrder>,
) -> AppResult<Vec<Chapter>> {
    let class = classes::authorize(store, session, class_id, Level::Write)?;
    if orders.is_empty() {
        return Err(AppError::validation("orders must not be empty"));
    }

    let current: HashMap<String, Chapter> = ordered(store, &class.id)?
        .into_iter()
        .map(|c| (c.id.clone(), c))
        .collect();
    let mut seen: HashSet<&str> = HashSet::new();
    for item in &orders {
        if !seen.insert(item.id.as_str()) {
            return Err(AppError::validation_with(
                "orders contains duplicates",
                json!({ "chapterId": item.id }),
            ));
        }
        if !current.contains_key(&item.id) {
            return Err(AppError::validation_with(
                "orders contains unknown chapterId",
                json!({ "chapterId": item.id }),
            ));
        }
        check_order(item.order)?;
    }

    let now = Utc::now();
    transaction(store, &[Collection::Chapters], |tx| {
        for item in &orders {
            if let Some(existing) = current.get(&item.id) {
                let mut chapter = existing.clone();
                chapter.order = item.order;
                chapter.updated_at = now;
                tx.save(Collection::Chapters, &chapter)?;
            }
        }
        Ok(())
    })?;
    info!(class_id = %class.id, count = orders.len(), "chapters reordered");
    ordered(store, &class.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::classes::{self, ClassInput};
    use crate::curriculum::testutil::user;
    use crate::model::Role;
    use crate::store::memory::MemoryStore;

    fn chapter(title: &str, order: Option<i64>) -> ChapterInput {
        ChapterInput {
            title: title.into(),
            content: String::new(),
            order,
        }
    }

    #[test]
    fn reorder_swaps_two_chapters() {
        let mut store = MemoryStore::new();
        let t = user(&mut store, "t", Role::Teacher, None);
        let class = classes::create(
            &mut store,
            &t,
            ClassInput {
                name: "TRC".into(),
                description: None,
            },
        )
        .expect("class");
        let a = create(&mut store, &t, &class.id, chapter("A", Some(1))).expect("a");
        let b = create(&mut store, &t, &class.id, chapter("B", Some(2))).expect("b");

        let out = reorder(
            &mut store,
            &t,
            &class.id,
            vec![
                ChapterOrder {
                    id: a.id.clone(),
                    order: 2,
                },
                ChapterOrder {
                    id: b.id.clone(),
                    order: 1,
                },
            ],
        )
        .expect("reorder");
        let ids: Vec<&str> = out.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec![b.id.as_str(), a.id.as_str()]);
    }

    #[test]
    fn reorder_with_an_unknown_id_changes_nothing() {
        let mut store = MemoryStore::new();
        let t = user(&mut store, "t", Role::Teacher, None);
        let class = classes::create(
            &mut store,
            &t,
            ClassInput {
                name: "TRC".into(),
                description: None,
            },
        )
        .expect("class");
        let a = create(&mut store, &t, &class.id, chapter("A", None)).expect("a");
        let b = create(&mut store, &t, &class.id, chapter("B", None)).expect("b");
        assert_eq!((a.order, b.order), (0, 1));

        let e = reorder(
            &mut store,
            &t,
            &class.id,
            vec![
                ChapterOrder {
                    id: a.id.clone(),
                    order: 5,
                },
                ChapterOrder {
                    id: "ghost".into(),
                    order: 0,
                },
            ],
        )
        .expect_err("unknown");
        assert_eq!(e.status(), 400);
        assert_eq!(get(&store, &t, &a.id).expect("a").order, 0);
    }

    #[test]
    fn negative_order_is_rejected() {
        let mut store = MemoryStore::new();
        let t = user(&mut store, "t", Role::Teacher, None);
        let class = classes::create(
            &mut store,
            &t,
            ClassInput {
                name: "TRC".into(),
                description: None,
            },
        )
        .expect("class");
        let e = create(&mut store, &t, &class.id, chapter("A", Some(-1))).expect_err("neg");
        assert_eq!(e.details().expect("details")["field"], "order");
    }

    #[test]
    fn next_order_after_the_largest_is_rejected() {
        let mut store = MemoryStore::new();
        let t = user(&mut store, "t", Role::Teacher, None);
        let class = classes::create(
            &mut store,
            &t,
            ClassInput {
                name: "TRC".into(),
                description: None,
            },
        )
        .expect("class");
        create(&mut store, &t, &class.id, chapter("Last", Some(i64::MAX))).expect("max");
        let e = create(&mut store, &t, &class.id, chapter("Next", None)).expect_err("overflow");
        assert_eq!(e.status(), 400);
        assert_eq!(e.details().expect("details")["field"], "order");
        assert_eq!(list(&store, &t, &class.id).expect("list").len(), 1);
    }
}
