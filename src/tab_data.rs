/// Browser tab shapes shared by the extractor, the batch opener and instances
use serde::{Deserialize, Deserializer, Serialize};

/// A live tab as reported by the host browser
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: i32,
    pub url: String,
    pub title: String,
    #[serde(default)]
    pub group_id: Option<i32>,
    #[serde(default)]
    pub index: i32,
}

impl TabInfo {
    pub fn new(id: i32, url: String, title: String, group_id: Option<i32>, index: i32) -> TabInfo {
        TabInfo {
            id,
            url,
            title,
            group_id,
            index,
        }
    }

    pub fn is_web_page(&self) -> bool {
        let lower = self.url.to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}

/// A tab stored inside an instance snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceTab {
    pub url: String,
    /// Missing or null titles read as empty and render as `Untitled`
    #[serde(default, deserialize_with = "null_as_empty")]
    pub title: String,
    #[serde(default)]
    pub group_id: Option<i32>,
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl InstanceTab {
    pub fn new(url: &str, title: &str, group_id: Option<i32>) -> InstanceTab {
        InstanceTab {
            url: url.to_string(),
            title: if title.is_empty() {
                "Untitled".to_string()
            } else {
                title.to_string()
            },
            group_id,
        }
    }
}

impl From<&TabInfo> for InstanceTab {
    fn from(tab: &TabInfo) -> Self {
        InstanceTab::new(&tab.url, &tab.title, tab.group_id)
    }
}

/// Anything with a URL and a title can be rendered by the export formatter
pub trait TabLike {
    fn url(&self) -> &str;
    fn title(&self) -> &str;
}

impl TabLike for TabInfo {
    fn url(&self) -> &str {
        &self.url
    }

    fn title(&self) -> &str {
        &self.title
    }
}

impl TabLike for InstanceTab {
    fn url(&self) -> &str {
        &self.url
    }

    fn title(&self) -> &str {
        &self.title
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tab_info_creation() {
        let tab = TabInfo::new(
            1,
            "https://google.com".to_string(),
            "Google".to_string(),
            Some(4),
            0,
        );

        assert_eq!(tab.id, 1);
        assert_eq!(tab.url, "https://google.com");
        assert_eq!(tab.title, "Google");
        assert_eq!(tab.group_id, Some(4));
        assert!(tab.is_web_page());
    }

    #[test]
    fn test_internal_pages_are_not_web_pages() {
        let tab = TabInfo::new(2, "chrome://extensions".to_string(), String::new(), None, 1);
        assert!(!tab.is_web_page());
    }

    #[test]
    fn test_instance_tab_defaults_title() {
        let tab = InstanceTab::new("https://a.com", "", None);
        assert_eq!(tab.title, "Untitled");
    }

    #[test]
    fn test_instance_tab_title_optional() {
        let tabs: Vec<InstanceTab> = serde_json::from_value(serde_json::json!([
            {"url": "https://a.com"},
            {"url": "https://b.com", "title": null},
        ]))
        .unwrap();

        assert_eq!(tabs[0].title, "");
        assert_eq!(tabs[1].title, "");
        assert_eq!(crate::export_format::process("<id>. <name>", &tabs), vec!["1. Untitled", "2. Untitled"]);
    }

    #[test]
    fn test_instance_tab_json_shape() {
        let tab = InstanceTab::new("https://a.com", "A", Some(3));
        let json = serde_json::to_value(&tab).unwrap();

        assert_eq!(json["groupId"], 3);
        assert_eq!(json["title"], "A");
    }
}
