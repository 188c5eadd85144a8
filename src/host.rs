/// Host browser collaborators: tab management and declarative network rules
use serde::{Deserialize, Serialize};

use crate::config::REDIRECT_RULE_ID_OFFSET;
use crate::error::Result;
use crate::model::{BlockedDomain, RedirectRule};
use crate::tab_data::{InstanceTab, TabInfo};

/// Tab management of the current browser window
#[allow(async_fn_in_trait)]
pub trait TabProvider {
    /// Tabs of the current window with http(s) URLs, in window order
    async fn query_current_window_tabs(&self) -> Result<Vec<TabInfo>>;

    async fn create_tab(&self, url: &str, active: bool) -> Result<()>;

    async fn close_tabs(&self, ids: &[i32]) -> Result<()>;

    /// Breathing room between consecutive tab creations
    async fn pause(&self, _millis: u32) {}

    /// Open a stored tab list. Unless appending, every existing tab but the
    /// first is closed beforehand.
    async fn create_tabs(&self, tabs: &[InstanceTab], append: bool) -> Result<()> {
        if !append {
            let existing = self.query_current_window_tabs().await?;
            let to_close: Vec<i32> = existing.iter().skip(1).map(|t| t.id).collect();
            if !to_close.is_empty() {
                log::info!("Closing {} tab(s) before opening instance", to_close.len());
                self.close_tabs(&to_close).await?;
            }
        }

        for tab in tabs {
            self.create_tab(&tab.url, false).await?;
        }
        Ok(())
    }
}

/// Dynamic declarativeNetRequest rules
#[allow(async_fn_in_trait)]
pub trait NetworkRuleProvider {
    /// Replace every block rule with two rules per domain
    async fn update_block_rules(&self, domains: &[BlockedDomain]) -> Result<()>;

    /// Replace every redirect rule; ids start above the block rule range
    async fn update_redirect_rules(&self, rules: &[RedirectRule]) -> Result<()>;
}

pub const RESOURCE_TYPES: [&str; 15] = [
    "main_frame",
    "sub_frame",
    "stylesheet",
    "script",
    "image",
    "font",
    "object",
    "xmlhttprequest",
    "ping",
    "csp_report",
    "media",
    "websocket",
    "webtransport",
    "webbundle",
    "other",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redirect {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Block,
    Redirect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleAction {
    #[serde(rename = "type")]
    pub kind: ActionType,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub redirect: Option<Redirect>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleCondition {
    pub url_filter: String,
    pub resource_types: Vec<String>,
}

/// Wire shape of a chrome.declarativeNetRequest dynamic rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicRule {
    pub id: u32,
    pub priority: u32,
    pub action: RuleAction,
    pub condition: RuleCondition,
}

impl DynamicRule {
    fn new(id: u32, action: RuleAction, url_filter: String) -> Self {
        DynamicRule {
            id,
            priority: 1,
            action,
            condition: RuleCondition {
                url_filter,
                resource_types: RESOURCE_TYPES.iter().map(|t| t.to_string()).collect(),
            },
        }
    }

    pub fn is_redirect_rule(id: u32) -> bool {
        id > REDIRECT_RULE_ID_OFFSET
    }
}

/// Domain i of n yields rule i+1 for subdomains and rule n+i+1 for the bare
/// host. Entries without a domain get no rules.
pub fn build_block_rules(domains: &[BlockedDomain]) -> Vec<DynamicRule> {
    let domains: Vec<&BlockedDomain> = domains.iter().filter(|d| !d.domain.is_empty()).collect();
    let count = domains.len() as u32;
    let block = || RuleAction {
        kind: ActionType::Block,
        redirect: None,
    };

    let mut rules = Vec::with_capacity(domains.len() * 2);
    for (index, entry) in domains.iter().enumerate() {
        let index = index as u32;
        rules.push(DynamicRule::new(index + 1, block(), format!("*://*.{}/*", entry.domain)));
        rules.push(DynamicRule::new(count + index + 1, block(), format!("*://{}/*", entry.domain)));
    }
    rules
}

pub fn build_redirect_rules(rules: &[RedirectRule]) -> Vec<DynamicRule> {
    rules
        .iter()
        .filter(|rule| !rule.from_url.is_empty() && !rule.to_url.is_empty())
        .enumerate()
        .map(|(index, rule)| {
            let url_filter = if rule.from_url.contains('*') {
                rule.from_url.clone()
            } else {
                format!("*{}*", rule.from_url)
            };
            DynamicRule::new(
                REDIRECT_RULE_ID_OFFSET + index as u32 + 1,
                RuleAction {
                    kind: ActionType::Redirect,
                    redirect: Some(Redirect {
                        url: rule.to_url.clone(),
                    }),
                },
                url_filter,
            )
        })
        .collect()
}
