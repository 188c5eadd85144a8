/// Extension host bindings: chrome.storage.local, chrome.tabs and
/// chrome.declarativeNetRequest behind the crate's collaborator traits
use js_sys::{Array, Object, Promise, Reflect};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::error::{Error, Result};
use crate::host::{DynamicRule, NetworkRuleProvider, TabProvider, build_block_rules, build_redirect_rules};
use crate::model::{BlockedDomain, RedirectRule};
use crate::storage::KeyValueStore;
use crate::tab_data::TabInfo;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = get)]
    async fn storage_get(key: &str) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = set)]
    async fn storage_set(items: &JsValue) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "storage", "local"], js_name = remove)]
    async fn storage_remove(key: &str) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = query)]
    async fn tabs_query(query: &JsValue) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = create)]
    async fn tabs_create(properties: &JsValue) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "tabs"], js_name = remove)]
    async fn tabs_remove(ids: &JsValue) -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "declarativeNetRequest"], js_name = getDynamicRules)]
    async fn get_dynamic_rules() -> std::result::Result<JsValue, JsValue>;

    #[wasm_bindgen(catch, js_namespace = ["chrome", "declarativeNetRequest"], js_name = updateDynamicRules)]
    async fn update_dynamic_rules(options: &JsValue) -> std::result::Result<JsValue, JsValue>;
}

/// Whether `chrome.<path>` resolves to an object in the current global scope
fn has_namespace(path: &[&str]) -> bool {
    let mut current: JsValue = js_sys::global().into();
    for segment in ["chrome"].iter().chain(path) {
        match Reflect::get(&current, &JsValue::from_str(segment)) {
            Ok(next) if next.is_object() => current = next,
            _ => return false,
        }
    }
    true
}

fn require(path: &[&str], name: &'static str) -> Result<()> {
    if has_namespace(path) {
        Ok(())
    } else {
        Err(Error::CollaboratorUnavailable(name))
    }
}

fn js_message(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    Reflect::get(value, &JsValue::from_str("message"))
        .ok()
        .and_then(|m| m.as_string())
        .unwrap_or_else(|| format!("{value:?}"))
}

/// A rejected tabs or declarativeNetRequest call
fn host_error(value: JsValue) -> Error {
    Error::Host(js_message(&value))
}

fn to_js<T: Serialize + ?Sized>(value: &T) -> std::result::Result<JsValue, String> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| e.to_string())
}

fn from_js<T: for<'de> Deserialize<'de>>(value: JsValue) -> std::result::Result<T, String> {
    serde_wasm_bindgen::from_value(value).map_err(|e| e.to_string())
}

/// `KeyValueStore` over chrome.storage.local
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeStorage;

impl KeyValueStore for ChromeStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        require(&["storage", "local"], "chrome.storage")?;
        let result = storage_get(key)
            .await
            .map_err(|e| Error::Storage(js_message(&e)))?;

        let value = Reflect::get(&result, &JsValue::from_str(key)).unwrap_or(JsValue::UNDEFINED);
        if value.is_undefined() {
            return Ok(None);
        }
        from_js(value).map(Some).map_err(Error::Storage)
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        require(&["storage", "local"], "chrome.storage")?;
        let items = Object::new();
        Reflect::set(&items, &JsValue::from_str(key), &to_js(&value).map_err(Error::Storage)?)
            .map_err(|e| Error::Storage(js_message(&e)))?;

        storage_set(&items).await.map_err(|e| {
            log::error!("Error writing {}: {}", key, js_message(&e));
            Error::Storage(js_message(&e))
        })?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        require(&["storage", "local"], "chrome.storage")?;
        storage_remove(key)
            .await
            .map_err(|e| Error::Storage(js_message(&e)))?;
        Ok(())
    }
}

/// Only the fields the crate reads from a chrome.tabs.Tab
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChromeTab {
    id: Option<i32>,
    url: Option<String>,
    title: Option<String>,
    group_id: Option<i32>,
    #[serde(default)]
    index: i32,
}

impl ChromeTab {
    fn into_tab_info(self) -> Option<TabInfo> {
        let id = self.id?;
        let url = self.url.filter(|u| !u.is_empty())?;
        let title = self.title.filter(|t| !t.is_empty()).unwrap_or_else(|| url.clone());
        // chrome reports -1 for ungrouped tabs
        let group_id = self.group_id.filter(|g| *g >= 0);
        Some(TabInfo::new(id, url, title, group_id, self.index))
    }
}

#[derive(Serialize)]
struct CreateProperties<'a> {
    url: &'a str,
    active: bool,
}

/// `TabProvider` over chrome.tabs
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeTabs;

impl TabProvider for ChromeTabs {
    async fn query_current_window_tabs(&self) -> Result<Vec<TabInfo>> {
        require(&["tabs"], "chrome.tabs")?;
        let query = to_js(&serde_json::json!({ "currentWindow": true })).map_err(Error::Host)?;
        let result = tabs_query(&query).await.map_err(host_error)?;

        let raw: Vec<ChromeTab> = from_js(result).map_err(Error::Host)?;
        let mut tabs: Vec<TabInfo> = raw
            .into_iter()
            .filter_map(ChromeTab::into_tab_info)
            .filter(TabInfo::is_web_page)
            .collect();
        tabs.sort_by_key(|t| t.index);
        Ok(tabs)
    }

    async fn create_tab(&self, url: &str, active: bool) -> Result<()> {
        require(&["tabs"], "chrome.tabs")?;
        tabs_create(&to_js(&CreateProperties { url, active }).map_err(Error::Host)?)
            .await
            .map_err(|e| Error::Host(format!("Could not open {url}: {}", js_message(&e))))?;
        Ok(())
    }

    async fn close_tabs(&self, ids: &[i32]) -> Result<()> {
        require(&["tabs"], "chrome.tabs")?;
        let ids: Array = ids.iter().map(|id| JsValue::from(*id)).collect();
        tabs_remove(&ids).await.map_err(host_error)?;
        Ok(())
    }

    async fn pause(&self, millis: u32) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let promise = Promise::new(&mut |resolve, _reject| {
            if let Err(e) = window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, millis as i32) {
                log::warn!("setTimeout failed: {}", js_message(&e));
                let _ = resolve.call0(&JsValue::NULL);
            }
        });
        let _ = JsFuture::from(promise).await;
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RuleUpdate {
    remove_rule_ids: Vec<u32>,
    add_rules: Vec<DynamicRule>,
}

#[derive(Deserialize)]
struct ExistingRule {
    id: u32,
}

/// `NetworkRuleProvider` over chrome.declarativeNetRequest dynamic rules.
/// Block and redirect rules live in separate id ranges, so replacing one
/// kind leaves the other in place.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromeNetRules;

impl ChromeNetRules {
    /// Swap out either the redirect id range or the block id range
    async fn replace(&self, redirects: bool, add_rules: Vec<DynamicRule>) -> Result<()> {
        require(&["declarativeNetRequest"], "chrome.declarativeNetRequest")?;
        let existing: Vec<ExistingRule> = from_js(get_dynamic_rules().await.map_err(host_error)?).map_err(Error::Host)?;

        let remove_rule_ids = existing
            .into_iter()
            .map(|r| r.id)
            .filter(|id| DynamicRule::is_redirect_rule(*id) == redirects)
            .collect();

        let update = RuleUpdate {
            remove_rule_ids,
            add_rules,
        };
        update_dynamic_rules(&to_js(&update).map_err(Error::Host)?).await.map_err(host_error)?;
        Ok(())
    }
}

impl NetworkRuleProvider for ChromeNetRules {
    async fn update_block_rules(&self, domains: &[BlockedDomain]) -> Result<()> {
        self.replace(false, build_block_rules(domains)).await
    }

    async fn update_redirect_rules(&self, rules: &[RedirectRule]) -> Result<()> {
        self.replace(true, build_redirect_rules(rules)).await
    }
}
