use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::booking::Booking;
use crate::posting::{Discount, Offer, Post};
use crate::slot::Slot;
use crate::store::{Collection, KeyValueStore, read_collection};

pub const DEFAULT_EXPORT_FILE: &str = "nbat_data_export.json";

/// Read-only snapshot of every collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub posts: Vec<Post>,
    pub discounts: Vec<Discount>,
    pub offers: Vec<Offer>,
    pub slots: Vec<Slot>,
    pub bookings: Vec<Booking>,
    pub exported_at: DateTime<Utc>,
}

impl ExportDocument {
    pub fn snapshot<S: KeyValueStore + ?Sized>(store: &S, now: DateTime<Utc>) -> Self {
        Self {
            posts: read_collection(store, Collection::Posts),
            discounts: read_collection(store, Collection::Discounts),
            offers: read_collection(store, Collection::Offers),
            slots: read_collection(store, Collection::Slots),
            bookings: read_collection(store, Collection::Bookings),
            exported_at: now,
        }
    }

    pub fn to_pretty_json(&self) -> anyhow::Result<String> {
        serde_json::to_string_pretty(self).context("failed to serialise export")
    }

    #[tracing::instrument(skip(self))]
    pub fn write_to(&self, path: &Path) -> anyhow::Result<()> {
        fs::write(path, self.to_pretty_json()?)
            .with_context(|| format!("failed writing {}", path.display()))?;
        info!(
            file = %path.display(),
            slots = self.slots.len(),
            bookings = self.bookings.len(),
            "exported data"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::Value;

    use super::*;
    use crate::calendar::JalaliDate;
    use crate::slot::SlotStore;
    use crate::store::MemoryStore;

    #[test]
    fn export_has_all_top_level_fields() {
        let mut kv = MemoryStore::new();
        SlotStore::new(&mut kv)
            .create_slots(JalaliDate::new(1404, 6, 10), ["09:00".parse().expect("time")])
            .expect("create");
        let now = Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0).single().expect("now");

        let doc = ExportDocument::snapshot(&kv, now);
        let json: Value = serde_json::from_str(&doc.to_pretty_json().expect("json")).expect("parse");

        for field in ["posts", "discounts", "offers", "slots", "bookings", "exportedAt"] {
            assert!(json.get(field).is_some(), "missing {field}");
        }
        assert_eq!(json["slots"][0]["date"], "1404/06/10");
        assert_eq!(json["slots"][0]["time"], "09:00");
        assert_eq!(json["exportedAt"], "2025-09-01T08:00:00Z");
    }
}
