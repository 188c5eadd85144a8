/// Profile import and export as JSON text
use std::collections::HashSet;

use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::error::{Error, Result};
use crate::host::{NetworkRuleProvider, TabProvider};
use crate::model::{Clock, Entity, Profile, new_id, text};
use crate::session::Session;
use crate::storage::{KeyValueStore, keys, save_collection};

const IMPORTED_NAME: &str = "Imported profile";

/// Batch-URL fields that are regenerated on demand and not worth exporting
const TRANSIENT_KEYS: [&str; 2] = ["generatedUrls", "currentOpenIndex"];

/// Build a profile from an imported value that will not collide with the
/// ids and names already present
pub fn normalize_imported(raw: &Value, existing: &[Profile], now: OffsetDateTime) -> Profile {
    let empty = Map::new();
    let raw = raw.as_object().unwrap_or(&empty);

    let ids: HashSet<&str> = existing.iter().map(|p| p.id.as_str()).collect();
    let names: HashSet<String> = existing.iter().map(|p| p.name.to_lowercase()).collect();

    let id = text(raw, "id")
        .filter(|id| !id.is_empty() && !ids.contains(id.as_str()))
        .unwrap_or_else(new_id);

    let mut profile = Profile::normalize(raw, now);
    profile.id = id;
    profile.name = unique_name(&profile.name, &names);
    profile
}

fn unique_name(desired: &str, taken: &HashSet<String>) -> String {
    let base = match desired.trim() {
        "" => IMPORTED_NAME,
        name => name,
    };

    let mut candidate = base.to_string();
    let mut suffix = 0;
    while taken.contains(&candidate.to_lowercase()) {
        suffix += 1;
        candidate = format!("{base} ({suffix})");
    }
    candidate
}

/// Copy of the profile without the transient batch fields in `data`
pub fn export_view(profile: &Profile) -> Profile {
    let mut cleaned = profile.clone();
    if let Value::Object(data) = &mut cleaned.data {
        for key in TRANSIENT_KEYS {
            data.remove(key);
        }
    }
    cleaned
}

impl<S, T, N, C> Session<S, T, N, C>
where
    S: KeyValueStore,
    T: TabProvider,
    N: NetworkRuleProvider,
    C: Clock,
{
    /// Accepts one profile object or an array of them; returns how many
    /// were imported
    pub async fn import_profiles(&self, json_text: &str) -> Result<usize> {
        let _guard = self.begin("import_profiles")?;
        let parsed: Value =
            serde_json::from_str(json_text).map_err(|_| Error::validation("Invalid JSON file"))?;

        let items = match parsed {
            Value::Array(items) => items,
            single => vec![single],
        };

        let mut profiles = self.load_profiles().await?;
        let mut count = 0;
        for item in &items {
            if !item.is_object() {
                log::warn!("Skipping non-object entry in profile import");
                continue;
            }
            let profile = normalize_imported(item, &profiles.items, self.now());
            profiles.items.push(profile);
            count += 1;
        }

        save_collection(&self.store, keys::PROFILES, &profiles).await?;
        log::info!("Imported {} profile(s)", count);
        Ok(count)
    }

    pub async fn export_profiles(&self) -> Result<String> {
        let profiles: Vec<Profile> = self.load_profiles().await?.items.iter().map(export_view).collect();
        Ok(serde_json::to_string_pretty(&profiles)?)
    }
}
