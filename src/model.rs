/// Persisted entities and their normalization from loosely shaped JSON
///
/// Stored values are never trusted: every entity is rebuilt field by field
/// with a documented default for anything missing or of the wrong type.
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::{DEFAULT_INSTANCE_COLOR, DEFAULT_INSTANCE_ICON, DEFAULT_INSTANCE_NAME};
use crate::tab_data::InstanceTab;

/// Source of "now" for timestamps
pub trait Clock {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Fresh, time-ordered identifier
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// Something stored as one element of a keyed collection
pub trait Entity: Serialize + Sized {
    const KIND: &'static str;

    fn id(&self) -> &str;

    fn normalize(raw: &Map<String, Value>, now: OffsetDateTime) -> Self;

    /// Stamp the entity as modified; a no-op for entities without a timestamp
    fn touch(&mut self, now: OffsetDateTime);
}

pub(crate) fn text(raw: &Map<String, Value>, key: &str) -> Option<String> {
    match raw.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn non_empty(raw: &Map<String, Value>, key: &str) -> Option<String> {
    text(raw, key).filter(|s| !s.trim().is_empty())
}

/// Accepts RFC 3339 strings and millisecond epoch numbers
pub(crate) fn timestamp(raw: &Map<String, Value>, key: &str) -> Option<OffsetDateTime> {
    match raw.get(key)? {
        Value::String(s) => OffsetDateTime::parse(s, &Rfc3339).ok(),
        Value::Number(n) => {
            let millis = n.as_f64()?;
            OffsetDateTime::from_unix_timestamp_nanos((millis * 1_000_000.0) as i128).ok()
        }
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockedDomain {
    pub id: String,
    pub domain: String,
    #[serde(with = "time::serde::rfc3339")]
    pub modified_at: OffsetDateTime,
}

impl BlockedDomain {
    pub fn new(domain: &str, now: OffsetDateTime) -> BlockedDomain {
        BlockedDomain {
            id: new_id(),
            domain: domain.trim().to_lowercase(),
            modified_at: now,
        }
    }
}

impl Entity for BlockedDomain {
    const KIND: &'static str = "blocked domain";

    fn id(&self) -> &str {
        &self.id
    }

    fn normalize(raw: &Map<String, Value>, now: OffsetDateTime) -> Self {
        BlockedDomain {
            id: non_empty(raw, "id").unwrap_or_else(new_id),
            domain: text(raw, "domain").unwrap_or_default().trim().to_lowercase(),
            modified_at: timestamp(raw, "modifiedAt").unwrap_or(now),
        }
    }

    fn touch(&mut self, now: OffsetDateTime) {
        self.modified_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectRule {
    pub id: String,
    pub from_url: String,
    pub to_url: String,
    #[serde(with = "time::serde::rfc3339")]
    pub modified_at: OffsetDateTime,
}

impl RedirectRule {
    pub fn new(from_url: &str, to_url: &str, now: OffsetDateTime) -> RedirectRule {
        RedirectRule {
            id: new_id(),
            from_url: from_url.trim().to_string(),
            to_url: to_url.trim().to_string(),
            modified_at: now,
        }
    }
}

impl Entity for RedirectRule {
    const KIND: &'static str = "redirect rule";

    fn id(&self) -> &str {
        &self.id
    }

    fn normalize(raw: &Map<String, Value>, now: OffsetDateTime) -> Self {
        RedirectRule {
            id: non_empty(raw, "id").unwrap_or_else(new_id),
            from_url: text(raw, "fromUrl").unwrap_or_default().trim().to_string(),
            to_url: text(raw, "toUrl").unwrap_or_default().trim().to_string(),
            modified_at: timestamp(raw, "modifiedAt").unwrap_or(now),
        }
    }

    fn touch(&mut self, now: OffsetDateTime) {
        self.modified_at = now;
    }
}

/// Named snapshot of the feature settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Opaque settings blob, always a JSON object
    pub data: Value,
    #[serde(with = "time::serde::rfc3339")]
    pub modified_at: OffsetDateTime,
}

impl Profile {
    pub fn new(name: &str, data: Value, now: OffsetDateTime) -> Profile {
        Profile {
            id: new_id(),
            name: name.trim().to_string(),
            description: String::new(),
            data: object_or_empty(data),
            modified_at: now,
        }
    }
}

pub(crate) fn object_or_empty(value: Value) -> Value {
    if value.is_object() {
        value
    } else {
        Value::Object(Map::new())
    }
}

impl Entity for Profile {
    const KIND: &'static str = "profile";

    fn id(&self) -> &str {
        &self.id
    }

    fn normalize(raw: &Map<String, Value>, now: OffsetDateTime) -> Self {
        // Older exports carried updatedAt instead of modifiedAt
        let modified_at = timestamp(raw, "modifiedAt")
            .or_else(|| timestamp(raw, "updatedAt"))
            .unwrap_or(now);

        Profile {
            id: non_empty(raw, "id").unwrap_or_else(new_id),
            name: text(raw, "name").unwrap_or_default().trim().to_string(),
            description: text(raw, "description").unwrap_or_default(),
            data: object_or_empty(raw.get("data").cloned().unwrap_or(Value::Null)),
            modified_at,
        }
    }

    fn touch(&mut self, now: OffsetDateTime) {
        self.modified_at = now;
    }
}

/// Named, reusable snapshot of a browser tab set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub color: String,
    pub icon: String,
    pub tabs: Vec<InstanceTab>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub modified_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_saved_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_opened_at: Option<OffsetDateTime>,
}

/// User-supplied fields for a new instance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceOptions {
    pub name: Option<String>,
    pub color: Option<String>,
    pub icon: Option<String>,
}

impl Instance {
    pub fn new(options: &InstanceOptions, now: OffsetDateTime) -> Instance {
        let pick = |value: &Option<String>, default: &str| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(default)
                .to_string()
        };

        Instance {
            id: new_id(),
            name: pick(&options.name, DEFAULT_INSTANCE_NAME),
            color: pick(&options.color, DEFAULT_INSTANCE_COLOR),
            icon: pick(&options.icon, DEFAULT_INSTANCE_ICON),
            tabs: Vec::new(),
            created_at: now,
            modified_at: now,
            last_saved_at: None,
            last_opened_at: None,
        }
    }
}

fn instance_tabs(raw: &Map<String, Value>) -> Vec<InstanceTab> {
    let Some(Value::Array(items)) = raw.get("tabs") else {
        return Vec::new();
    };

    items
        .iter()
        .filter_map(Value::as_object)
        .map(|tab| {
            let group_id = tab
                .get("groupId")
                .and_then(Value::as_i64)
                .and_then(|g| i32::try_from(g).ok())
                .filter(|g| *g >= 0);
            InstanceTab::new(
                &text(tab, "url").unwrap_or_default(),
                &text(tab, "title").unwrap_or_default(),
                group_id,
            )
        })
        .collect()
}

impl Entity for Instance {
    const KIND: &'static str = "instance";

    fn id(&self) -> &str {
        &self.id
    }

    fn normalize(raw: &Map<String, Value>, now: OffsetDateTime) -> Self {
        Instance {
            id: non_empty(raw, "id").unwrap_or_else(new_id),
            name: non_empty(raw, "name")
                .map(|s| s.trim().to_string())
                .unwrap_or_else(|| DEFAULT_INSTANCE_NAME.to_string()),
            color: non_empty(raw, "color").unwrap_or_else(|| DEFAULT_INSTANCE_COLOR.to_string()),
            icon: non_empty(raw, "icon").unwrap_or_else(|| DEFAULT_INSTANCE_ICON.to_string()),
            tabs: instance_tabs(raw),
            created_at: timestamp(raw, "createdAt").unwrap_or(now),
            modified_at: timestamp(raw, "modifiedAt").unwrap_or(now),
            last_saved_at: timestamp(raw, "lastSavedAt"),
            last_opened_at: timestamp(raw, "lastOpenedAt"),
        }
    }

    fn touch(&mut self, now: OffsetDateTime) {
        self.modified_at = now;
    }
}

fn most_recent_by<F>(instances: &[Instance], field: F) -> Option<&Instance>
where
    F: Fn(&Instance) -> Option<OffsetDateTime>,
{
    // Strictly greater wins, so the earliest entry keeps a tie
    instances.iter().fold(None, |best: Option<&Instance>, candidate| {
        let Some(at) = field(candidate) else {
            return best;
        };
        match best.and_then(|b| field(b)) {
            Some(best_at) if best_at >= at => best,
            _ => Some(candidate),
        }
    })
}

/// Instance whose tabs were captured most recently; `None` if none ever were
pub fn most_recently_saved(instances: &[Instance]) -> Option<&Instance> {
    most_recent_by(instances, |i| i.last_saved_at)
}

/// Instance whose tabs were loaded into the browser most recently
pub fn most_recently_opened(instances: &[Instance]) -> Option<&Instance> {
    most_recent_by(instances, |i| i.last_opened_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

    fn as_map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn instance_at(name: &str, saved: Option<OffsetDateTime>, opened: Option<OffsetDateTime>) -> Instance {
        let mut instance = Instance::new(
            &InstanceOptions {
                name: Some(name.to_string()),
                ..Default::default()
            },
            NOW,
        );
        instance.last_saved_at = saved;
        instance.last_opened_at = opened;
        instance
    }

    #[test]
    fn test_blocked_domain_defaults() {
        let domain = BlockedDomain::normalize(&as_map(json!({"domain": "  Example.COM "})), NOW);

        assert!(!domain.id.is_empty());
        assert_eq!(domain.domain, "example.com");
        assert_eq!(domain.modified_at, NOW);
    }

    #[test]
    fn test_redirect_rule_keeps_stored_fields() {
        let rule = RedirectRule::normalize(
            &as_map(json!({
                "id": "r1",
                "fromUrl": "old.com",
                "toUrl": "https://new.com",
                "modifiedAt": "2023-01-02T03:04:05.000Z"
            })),
            NOW,
        );

        assert_eq!(rule.id, "r1");
        assert_eq!(rule.from_url, "old.com");
        assert_eq!(rule.modified_at, datetime!(2023-01-02 03:04:05 UTC));
    }

    #[test]
    fn test_profile_data_must_be_object() {
        let profile = Profile::normalize(&as_map(json!({"id": 7, "name": "Work", "data": [1, 2]})), NOW);

        assert_eq!(profile.id, "7");
        assert_eq!(profile.data, json!({}));
        assert_eq!(profile.description, "");
    }

    #[test]
    fn test_profile_accepts_legacy_updated_at() {
        let profile = Profile::normalize(
            &as_map(json!({"name": "Old", "updatedAt": "2022-06-01T00:00:00Z"})),
            NOW,
        );
        assert_eq!(profile.modified_at, datetime!(2022-06-01 0:00 UTC));
    }

    #[test]
    fn test_instance_normalize_fills_everything() {
        let instance = Instance::normalize(
            &as_map(json!({
                "name": "  Research ",
                "tabs": [
                    {"url": "https://a.com", "title": "", "groupId": -1},
                    "garbage",
                    {"url": "https://b.com", "title": "B", "groupId": 5}
                ],
                "lastSavedAt": 1700000000000u64
            })),
            NOW,
        );

        assert_eq!(instance.name, "Research");
        assert_eq!(instance.color, DEFAULT_INSTANCE_COLOR);
        assert_eq!(instance.icon, DEFAULT_INSTANCE_ICON);
        assert_eq!(instance.tabs.len(), 2);
        assert_eq!(instance.tabs[0].title, "Untitled");
        assert_eq!(instance.tabs[0].group_id, None);
        assert_eq!(instance.tabs[1].group_id, Some(5));
        assert_eq!(instance.last_saved_at.unwrap().unix_timestamp(), 1_700_000_000);
        assert_eq!(instance.last_opened_at, None);
    }

    #[test]
    fn test_instance_serialization_uses_null_for_never() {
        let instance = instance_at("Plain", None, None);
        let json = serde_json::to_value(&instance).unwrap();

        assert_eq!(json["lastSavedAt"], Value::Null);
        assert_eq!(json["color"], DEFAULT_INSTANCE_COLOR);

        let back: Instance = serde_json::from_value(json).unwrap();
        assert_eq!(back, instance);
    }

    #[test]
    fn test_most_recently_saved_and_opened() {
        let instances = vec![
            instance_at("a", Some(datetime!(2024-01-01 0:00 UTC)), Some(datetime!(2024-03-01 0:00 UTC))),
            instance_at("b", Some(datetime!(2024-02-01 0:00 UTC)), None),
            instance_at("c", Some(datetime!(2023-12-01 0:00 UTC)), Some(datetime!(2024-01-15 0:00 UTC))),
        ];

        assert_eq!(most_recently_saved(&instances).unwrap().name, "b");
        assert_eq!(most_recently_opened(&instances).unwrap().name, "a");
    }

    #[test]
    fn test_most_recent_none_when_never_set() {
        let instances = vec![instance_at("a", None, None), instance_at("b", None, None)];

        assert!(most_recently_saved(&instances).is_none());
        assert!(most_recently_opened(&instances).is_none());
        assert!(most_recently_saved(&[]).is_none());
    }

    #[test]
    fn test_most_recent_tie_keeps_first() {
        let at = Some(datetime!(2024-01-01 0:00 UTC));
        let instances = vec![instance_at("first", at, None), instance_at("second", at, None)];

        assert_eq!(most_recently_saved(&instances).unwrap().name, "first");
    }
}
