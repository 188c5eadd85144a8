/// `Popup`: the session exposed to the popup script. Every method returns a
/// Promise resolving to plain JSON-shaped values.
use std::future::Future;
use std::rc::Rc;

use js_sys::Promise;
use serde::Serialize;
use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

use crate::app_state::UiTab;
use crate::chrome::{ChromeNetRules, ChromeStorage, ChromeTabs};
use crate::config::Limits;
use crate::error::{Error, Result};
use crate::export_format::ExportFormatProcessor;
use crate::extractor::{ExtractorView, TabSelection};
use crate::model::{InstanceOptions, SystemClock};
use crate::progress::calculate_batch_info;
use crate::session::Session;

type PopupSession = Session<ChromeStorage, ChromeTabs, ChromeNetRules, SystemClock>;

fn to_js_error(error: Error) -> JsValue {
    JsError::new(&error.to_string()).into()
}

/// Deserialize an argument from the popup script, rejecting malformed input
fn from_js_arg<T: DeserializeOwned>(value: JsValue, what: &str) -> Result<T> {
    serde_wasm_bindgen::from_value(value).map_err(|e| Error::validation(format!("Invalid {what}: {e}")))
}

fn to_js_value<T: Serialize>(value: &T) -> std::result::Result<JsValue, JsValue> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| JsError::new(&e.to_string()).into())
}

#[wasm_bindgen]
pub struct Popup {
    session: Rc<PopupSession>,
}

impl Popup {
    fn run<F, Fut, R>(&self, op: F) -> Promise
    where
        F: FnOnce(Rc<PopupSession>) -> Fut,
        Fut: Future<Output = Result<R>> + 'static,
        R: Serialize,
    {
        let future = op(Rc::clone(&self.session));
        future_to_promise(async move {
            let value = future.await.map_err(to_js_error)?;
            to_js_value(&value)
        })
    }
}

#[wasm_bindgen]
impl Popup {
    /// Load pointers from chrome.storage; `limits` is an optional JSON
    /// object overriding the default limits
    pub async fn open(limits: Option<String>) -> std::result::Result<Popup, JsValue> {
        let limits = match limits {
            Some(json) => Limits::from_json(&json).map_err(to_js_error)?,
            None => Limits::default(),
        };
        let session = Session::restore(ChromeStorage, ChromeTabs, ChromeNetRules, SystemClock, limits)
            .await
            .map_err(to_js_error)?;
        Ok(Popup {
            session: Rc::new(session),
        })
    }

    #[wasm_bindgen(js_name = isBusy)]
    pub fn is_busy(&self) -> bool {
        self.session.is_busy()
    }

    #[wasm_bindgen(js_name = loadState)]
    pub fn load_state(&self) -> Promise {
        self.run(|s| async move { s.load_state().await?.to_value() })
    }

    #[wasm_bindgen(js_name = activeTab)]
    pub fn active_tab(&self) -> Promise {
        self.run(|s| async move { s.active_tab().await })
    }

    #[wasm_bindgen(js_name = setActiveTab)]
    pub fn set_active_tab(&self, tab: JsValue) -> Promise {
        self.run(move |s| async move {
            let tab: UiTab = from_js_arg(tab, "tab name")?;
            s.set_active_tab(tab).await
        })
    }

    #[wasm_bindgen(js_name = generateUrls)]
    pub fn generate_urls(&self, pattern: String, start_id: String, end_id: String, confirmed: bool) -> Promise {
        self.run(move |s| async move { s.generate_urls(&pattern, &start_id, &end_id, confirmed).await })
    }

    #[wasm_bindgen(js_name = setUrlList)]
    pub fn set_url_list(&self, text: String) -> Promise {
        self.run(move |s| async move { s.set_url_list(&text).await })
    }

    #[wasm_bindgen(js_name = setBatchSize)]
    pub fn set_batch_size(&self, batch_size: usize) -> Promise {
        self.run(move |s| async move { s.set_batch_size(batch_size).await })
    }

    #[wasm_bindgen(js_name = clearUrls)]
    pub fn clear_urls(&self) -> Promise {
        self.run(|s| async move { s.clear_urls().await })
    }

    #[wasm_bindgen(js_name = batchInfo)]
    pub fn batch_info(&self) -> Promise {
        self.run(|s| async move {
            let batch = s.load_state().await?.batch;
            Ok(calculate_batch_info(
                batch.generated_urls.len(),
                batch.current_open_index,
                batch.batch_size,
            ))
        })
    }

    #[wasm_bindgen(js_name = openNextBatch)]
    pub fn open_next_batch(&self) -> Promise {
        self.run(|s| async move {
            let outcome = s.open_next_batch().await?;
            Ok(serde_json::json!({ "message": outcome.message(), "outcome": outcome }))
        })
    }

    #[wasm_bindgen(js_name = openAllUrls)]
    pub fn open_all_urls(&self, confirmed: bool) -> Promise {
        self.run(move |s| async move { s.open_all_urls(confirmed).await })
    }

    #[wasm_bindgen(js_name = setExportFormat)]
    pub fn set_export_format(&self, template: String) -> Promise {
        self.run(move |s| async move { s.set_export_format(&template).await })
    }

    #[wasm_bindgen(js_name = currentTabs)]
    pub fn current_tabs(&self) -> Promise {
        self.run(|s| async move { s.current_tabs().await })
    }

    /// Render the tabs with the given ids using the saved export format
    #[wasm_bindgen(js_name = exportTabs)]
    pub fn export_tabs(&self, ids: Vec<i32>) -> Promise {
        self.run(move |s| async move {
            let tabs = s.current_tabs().await?;
            let mut selection = TabSelection::default();
            for id in ids {
                selection.toggle(id);
            }
            s.export_selected(&tabs, &selection).await
        })
    }

    /// Resolves to an `Extractor` over the current window's web tabs
    #[wasm_bindgen(js_name = openExtractor)]
    pub fn open_extractor(&self) -> Promise {
        let session = Rc::clone(&self.session);
        future_to_promise(async move {
            let view = session.open_extractor().await.map_err(to_js_error)?;
            Ok(Extractor { session, view }.into())
        })
    }

    #[wasm_bindgen(js_name = listBlockedDomains)]
    pub fn list_blocked_domains(&self) -> Promise {
        self.run(|s| async move { s.list_blocked_domains().await })
    }

    #[wasm_bindgen(js_name = addBlockedDomain)]
    pub fn add_blocked_domain(&self, domain: String) -> Promise {
        self.run(move |s| async move { s.add_blocked_domain(&domain).await })
    }

    #[wasm_bindgen(js_name = editBlockedDomain)]
    pub fn edit_blocked_domain(&self, id: String, domain: String) -> Promise {
        self.run(move |s| async move { s.edit_blocked_domain(&id, &domain).await })
    }

    #[wasm_bindgen(js_name = deleteBlockedDomain)]
    pub fn delete_blocked_domain(&self, id: String) -> Promise {
        self.run(move |s| async move { s.delete_blocked_domain(&id).await })
    }

    #[wasm_bindgen(js_name = clearBlockedDomains)]
    pub fn clear_blocked_domains(&self) -> Promise {
        self.run(|s| async move { s.clear_blocked_domains().await })
    }

    #[wasm_bindgen(js_name = bulkAddDomains)]
    pub fn bulk_add_domains(&self, text: String) -> Promise {
        self.run(move |s| async move { s.bulk_add_domains(&text).await })
    }

    #[wasm_bindgen(js_name = applyBlockList)]
    pub fn apply_block_list(&self) -> Promise {
        self.run(|s| async move { s.apply_block_list().await })
    }

    #[wasm_bindgen(js_name = listRedirectRules)]
    pub fn list_redirect_rules(&self) -> Promise {
        self.run(|s| async move { s.list_redirect_rules().await })
    }

    #[wasm_bindgen(js_name = addRedirectRule)]
    pub fn add_redirect_rule(&self, from_url: String, to_url: String) -> Promise {
        self.run(move |s| async move { s.add_redirect_rule(&from_url, &to_url).await })
    }

    #[wasm_bindgen(js_name = editRedirectRule)]
    pub fn edit_redirect_rule(&self, id: String, from_url: String, to_url: String) -> Promise {
        self.run(move |s| async move { s.edit_redirect_rule(&id, &from_url, &to_url).await })
    }

    #[wasm_bindgen(js_name = deleteRedirectRule)]
    pub fn delete_redirect_rule(&self, id: String) -> Promise {
        self.run(move |s| async move { s.delete_redirect_rule(&id).await })
    }

    #[wasm_bindgen(js_name = clearRedirectRules)]
    pub fn clear_redirect_rules(&self) -> Promise {
        self.run(|s| async move { s.clear_redirect_rules().await })
    }

    #[wasm_bindgen(js_name = bulkAddRedirects)]
    pub fn bulk_add_redirects(&self, text: String) -> Promise {
        self.run(move |s| async move { s.bulk_add_redirects(&text).await })
    }

    #[wasm_bindgen(js_name = applyRedirectRules)]
    pub fn apply_redirect_rules(&self) -> Promise {
        self.run(|s| async move { s.apply_redirect_rules().await })
    }

    #[wasm_bindgen(js_name = listProfiles)]
    pub fn list_profiles(&self) -> Promise {
        self.run(|s| async move { s.list_profiles().await })
    }

    #[wasm_bindgen(js_name = activeProfileId)]
    pub fn active_profile_id(&self) -> Promise {
        self.run(|s| async move { s.active_profile_id().await })
    }

    #[wasm_bindgen(js_name = createProfile)]
    pub fn create_profile(&self, name: String, description: String) -> Promise {
        self.run(move |s| async move { s.create_profile(&name, &description).await })
    }

    #[wasm_bindgen(js_name = renameProfile)]
    pub fn rename_profile(&self, id: String, name: String) -> Promise {
        self.run(move |s| async move { s.rename_profile(&id, &name).await })
    }

    #[wasm_bindgen(js_name = deleteProfile)]
    pub fn delete_profile(&self, id: String) -> Promise {
        self.run(move |s| async move { s.delete_profile(&id).await })
    }

    #[wasm_bindgen(js_name = saveCurrentToActive)]
    pub fn save_current_to_active(&self) -> Promise {
        self.run(|s| async move { s.save_current_to_active().await })
    }

    #[wasm_bindgen(js_name = switchProfile)]
    pub fn switch_profile(&self, id: String) -> Promise {
        self.run(move |s| async move { s.switch_profile(&id).await })
    }

    #[wasm_bindgen(js_name = importProfiles)]
    pub fn import_profiles(&self, json_text: String) -> Promise {
        self.run(move |s| async move { s.import_profiles(&json_text).await })
    }

    #[wasm_bindgen(js_name = exportProfiles)]
    pub fn export_profiles(&self) -> Promise {
        self.run(|s| async move { s.export_profiles().await })
    }

    #[wasm_bindgen(js_name = listInstances)]
    pub fn list_instances(&self) -> Promise {
        self.run(|s| async move {
            let instances = s.list_instances().await?;
            let saved = crate::model::most_recently_saved(&instances).map(|i| i.id.clone());
            let opened = crate::model::most_recently_opened(&instances).map(|i| i.id.clone());
            Ok(serde_json::json!({
                "instances": instances,
                "mostRecentlySaved": saved,
                "mostRecentlyOpened": opened,
            }))
        })
    }

    #[wasm_bindgen(js_name = initializeInstances)]
    pub fn initialize_instances(&self) -> Promise {
        self.run(|s| async move { s.initialize_instances().await })
    }

    #[wasm_bindgen(js_name = createInstance)]
    pub fn create_instance(&self, options: JsValue, with_current_tabs: bool) -> Promise {
        self.run(move |s| async move {
            let options: InstanceOptions = from_js_arg(options, "instance options")?;
            s.create_instance(&options, with_current_tabs).await
        })
    }

    #[wasm_bindgen(js_name = editInstance)]
    pub fn edit_instance(&self, id: String, options: JsValue) -> Promise {
        self.run(move |s| async move {
            let options: InstanceOptions = from_js_arg(options, "instance options")?;
            s.edit_instance(&id, &options).await
        })
    }

    #[wasm_bindgen(js_name = deleteInstance)]
    pub fn delete_instance(&self, id: String) -> Promise {
        self.run(move |s| async move { s.delete_instance(&id).await })
    }

    #[wasm_bindgen(js_name = saveCurrentTabsToInstance)]
    pub fn save_current_tabs_to_instance(&self, id: String) -> Promise {
        self.run(move |s| async move { s.save_current_tabs_to_instance(&id).await })
    }

    #[wasm_bindgen(js_name = saveCurrentTabs)]
    pub fn save_current_tabs(&self) -> Promise {
        self.run(|s| async move { s.save_current_tabs().await })
    }

    /// With `append` false the window's other tabs are closed first
    #[wasm_bindgen(js_name = openInstanceTabs)]
    pub fn open_instance_tabs(&self, id: String, append: bool) -> Promise {
        self.run(move |s| async move { s.open_instance_tabs(&id, append).await })
    }

    #[wasm_bindgen(js_name = currentInstanceId)]
    pub fn current_instance_id(&self) -> Promise {
        self.run(|s| async move { s.current_instance_id().await })
    }

    #[wasm_bindgen(js_name = setCurrentInstance)]
    pub fn set_current_instance(&self, id: Option<String>) -> Promise {
        self.run(move |s| async move { s.set_current_instance(id.as_deref()).await })
    }
}

/// Filter and selection state of the extractor screen
#[wasm_bindgen]
pub struct Extractor {
    session: Rc<PopupSession>,
    view: ExtractorView,
}

#[wasm_bindgen]
impl Extractor {
    /// Visible tabs as `{id, url, title, groupId, index, selected}`
    pub fn rows(&self) -> std::result::Result<JsValue, JsValue> {
        to_js_value(&self.view.rows())
    }

    #[wasm_bindgen(js_name = setQuery)]
    pub fn set_query(&mut self, query: &str) {
        self.view.set_query(query);
    }

    pub fn toggle(&mut self, id: i32) {
        self.view.toggle(id);
    }

    #[wasm_bindgen(js_name = toggleAll)]
    pub fn toggle_all(&mut self) {
        self.view.toggle_all();
    }

    #[wasm_bindgen(js_name = selectVisible)]
    pub fn select_visible(&mut self) {
        self.view.select_visible();
    }

    #[wasm_bindgen(js_name = clearVisible)]
    pub fn clear_visible(&mut self) {
        self.view.clear_visible();
    }

    #[wasm_bindgen(js_name = allVisibleSelected)]
    pub fn all_visible_selected(&self) -> bool {
        self.view.all_visible_selected()
    }

    #[wasm_bindgen(js_name = selectedCount)]
    pub fn selected_count(&self) -> usize {
        self.view.counts().0
    }

    #[wasm_bindgen(js_name = visibleCount)]
    pub fn visible_count(&self) -> usize {
        self.view.counts().1
    }

    /// Selected tabs rendered with the saved export format
    pub fn export(&self) -> Promise {
        let session = Rc::clone(&self.session);
        let view = self.view.clone();
        future_to_promise(async move {
            let text = session.export_view(&view).await.map_err(to_js_error)?;
            Ok(JsValue::from_str(&text))
        })
    }

    /// Export with an unsaved template
    #[wasm_bindgen(js_name = exportWith)]
    pub fn export_with(&self, template: &str) -> Vec<String> {
        let processor = ExportFormatProcessor::with_padding(self.session.limits().index_padding);
        self.view.export(&processor, template)
    }
}
