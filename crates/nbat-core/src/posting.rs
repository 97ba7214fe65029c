//! Announcements shown next to the booking calendar: posts, discounts and
//! offers. They carry no scheduling meaning.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::ScheduleResult;
use crate::store::{Collection, KeyValueStore, read_collection, write_collection};

/// Swatch the posting forms start on; picking it means "no accent".
pub const DEFAULT_SWATCH: &str = "#fecaca";

pub fn accent_color(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|color| !color.is_empty() && !color.eq_ignore_ascii_case(DEFAULT_SWATCH))
        .map(str::to_string)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discount {
    pub id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub id: Uuid,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

pub trait Posting: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    fn id(&self) -> Uuid;
    fn title(&self) -> &str;
}

impl Posting for Post {
    const COLLECTION: Collection = Collection::Posts;

    fn id(&self) -> Uuid {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }
}

impl Posting for Discount {
    const COLLECTION: Collection = Collection::Discounts;

    fn id(&self) -> Uuid {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }
}

impl Posting for Offer {
    const COLLECTION: Collection = Collection::Offers;

    fn id(&self) -> Uuid {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }
}

/// Newest first.
pub fn list<P: Posting, S: KeyValueStore + ?Sized>(store: &S) -> Vec<P> {
    read_collection(store, P::COLLECTION)
}

#[tracing::instrument(skip(store, item), fields(collection = P::COLLECTION.name(), id = %item.id()))]
pub fn add<P: Posting, S: KeyValueStore + ?Sized>(store: &mut S, item: P) -> ScheduleResult<P> {
    let mut items: Vec<P> = read_collection(&*store, P::COLLECTION);
    items.insert(0, item);
    write_collection(store, P::COLLECTION, &items)?;
    info!(title = items[0].title(), "added posting");
    Ok(items.remove(0))
}

/// Returns whether anything was removed.
#[tracing::instrument(skip(store), fields(collection = P::COLLECTION.name()))]
pub fn remove<P: Posting, S: KeyValueStore + ?Sized>(store: &mut S, id: Uuid) -> ScheduleResult<bool> {
    let mut items: Vec<P> = read_collection(&*store, P::COLLECTION);
    let before = items.len();
    items.retain(|item| item.id() != id);
    if items.len() == before {
        return Ok(false);
    }
    write_collection(store, P::COLLECTION, &items)?;
    info!(%id, "removed posting");
    Ok(true)
}

impl Post {
    pub fn new(title: String, body: Option<String>, color: Option<&str>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            body,
            image: None,
            color: accent_color(color),
            created_at: now,
        }
    }
}

impl Discount {
    pub fn new(title: String, percent: Option<f64>, desc: Option<String>, color: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            percent,
            desc,
            image: None,
            color: accent_color(color),
        }
    }
}

impl Offer {
    pub fn new(title: String, desc: Option<String>, color: Option<&str>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            desc,
            image: None,
            color: accent_color(color),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn default_swatch_means_no_color() {
        assert_eq!(accent_color(Some("#FECACA")), None);
        assert_eq!(accent_color(Some("")), None);
        assert_eq!(accent_color(None), None);
        assert_eq!(accent_color(Some("#bbf7d0")).as_deref(), Some("#bbf7d0"));
    }

    #[test]
    fn newest_posting_comes_first_and_removal_is_by_id() {
        let mut kv = MemoryStore::new();
        let first = add(&mut kv, Offer::new("Spring".to_string(), None, None)).expect("add");
        let second = add(&mut kv, Offer::new("Summer".to_string(), None, Some("#bfdbfe"))).expect("add");

        let titles: Vec<String> = list::<Offer, _>(&kv).into_iter().map(|o| o.title).collect();
        assert_eq!(titles, ["Summer", "Spring"]);

        assert!(remove::<Offer, _>(&mut kv, first.id).expect("remove"));
        assert!(!remove::<Offer, _>(&mut kv, first.id).expect("remove again"));
        assert_eq!(list::<Offer, _>(&kv), vec![second]);
    }

    #[test]
    fn collections_stay_separate() {
        let mut kv = MemoryStore::new();
        add(&mut kv, Discount::new("Cleaning".to_string(), Some(20.0), None, None)).expect("add");
        assert_eq!(list::<Discount, _>(&kv).len(), 1);
        assert!(list::<Post, _>(&kv).is_empty());
    }
}
