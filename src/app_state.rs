/// The `currentState` blob, the last open popup tab, and the batch-URL
/// operations that read and write them
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::batch_url::{BatchUrlState, UrlGenerator, generate_warning, open_all_warning};
use crate::config::DEFAULT_EXPORT_FORMAT;
use crate::error::Result;
use crate::export_format::ExportFormatProcessor;
use crate::host::{NetworkRuleProvider, TabProvider};
use crate::model::Clock;
use crate::progress::{OpenEachOutcome, open_all, open_each};
use crate::report::BatchResult;
use crate::session::Session;
use crate::storage::{KeyValueStore, keys, save_value};

const BATCH_KEYS: [&str; 6] = [
    "urlPattern",
    "startId",
    "endId",
    "generatedUrls",
    "batchSize",
    "currentOpenIndex",
];

/// Keys that live under their own storage entries and only travel inside
/// profile snapshots
pub(crate) const SETTINGS_KEYS: [&str; 2] = ["blockedDomains", "redirectRules"];

/// Working state of the popup features
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    pub batch: BatchUrlState,
    pub export_format: String,
    /// Keys this version does not know about, carried through untouched
    pub extra: Map<String, Value>,
}

impl AppState {
    pub fn normalize(raw: Option<&Value>) -> Self {
        let empty = Map::new();
        let raw = raw.and_then(Value::as_object).unwrap_or(&empty);

        let export_format = raw
            .get("exportFormat")
            .and_then(Value::as_str)
            .filter(|f| !f.is_empty())
            .unwrap_or(DEFAULT_EXPORT_FORMAT)
            .to_string();

        let extra = raw
            .iter()
            .filter(|(key, _)| {
                let key = key.as_str();
                key != "exportFormat" && !BATCH_KEYS.contains(&key) && !SETTINGS_KEYS.contains(&key)
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        AppState {
            batch: BatchUrlState::normalize(raw),
            export_format,
            extra,
        }
    }

    pub fn to_value(&self) -> Result<Value> {
        let mut out = self.extra.clone();
        if let Value::Object(batch) = serde_json::to_value(&self.batch)? {
            out.extend(batch);
        }
        out.insert("exportFormat".to_string(), Value::String(self.export_format.clone()));
        Ok(Value::Object(out))
    }
}

/// Popup tab shown when the popup was last closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UiTab {
    #[default]
    BatchUrl,
    Extractor,
    BlockSite,
    Redirect,
    Profiles,
    Instances,
}

/// A large action either ran or is waiting for the user to confirm it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "camelCase")]
pub enum Gate<T> {
    Done(T),
    NeedsConfirmation(String),
}

impl<S, T, N, C> Session<S, T, N, C>
where
    S: KeyValueStore,
    T: TabProvider,
    N: NetworkRuleProvider,
    C: Clock,
{
    pub async fn load_state(&self) -> Result<AppState> {
        let raw = self.store.get(keys::CURRENT_STATE).await?;
        Ok(AppState::normalize(raw.as_ref()))
    }

    pub async fn save_state(&self, state: &AppState) -> Result<()> {
        self.store.set(keys::CURRENT_STATE, state.to_value()?).await
    }

    pub async fn active_tab(&self) -> Result<UiTab> {
        let raw = self.store.get(keys::ACTIVE_TAB).await?;
        Ok(raw.and_then(|v| serde_json::from_value(v).ok()).unwrap_or_default())
    }

    pub async fn set_active_tab(&self, tab: UiTab) -> Result<()> {
        save_value(&self.store, keys::ACTIVE_TAB, &tab).await
    }

    /// Expand the pattern into a fresh URL list. Lists above the warning
    /// threshold are only stored once `confirmed` is set.
    pub async fn generate_urls(&self, pattern: &str, start_id: &str, end_id: &str, confirmed: bool) -> Result<Gate<usize>> {
        let _guard = self.begin("generate_urls")?;
        let generator = UrlGenerator::new(&self.limits);

        let (start, end) = generator.validate_inputs(pattern, start_id, end_id)?;
        let count = (end - start + 1) as usize;
        if !confirmed {
            if let Some(warning) = generate_warning(count, &self.limits) {
                return Ok(Gate::NeedsConfirmation(warning));
            }
        }

        let mut state = self.load_state().await?;
        let count = state.batch.regenerate(&generator, pattern, start_id, end_id)?;
        self.save_state(&state).await?;
        log::info!("Generated {} URLs from {}", count, pattern);
        Ok(Gate::Done(count))
    }

    /// Replace the list with hand-edited text; progress starts over
    pub async fn set_url_list(&self, text: &str) -> Result<usize> {
        let _guard = self.begin("set_url_list")?;
        let mut state = self.load_state().await?;
        state.batch.set_urls_from_text(text);
        self.save_state(&state).await?;
        Ok(state.batch.generated_urls.len())
    }

    pub async fn set_batch_size(&self, batch_size: usize) -> Result<()> {
        let _guard = self.begin("set_batch_size")?;
        let mut state = self.load_state().await?;
        state.batch.set_batch_size(batch_size);
        self.save_state(&state).await
    }

    pub async fn clear_urls(&self) -> Result<()> {
        let _guard = self.begin("clear_urls")?;
        let mut state = self.load_state().await?;
        state.batch.clear();
        self.save_state(&state).await
    }

    /// "Open Each": open the next batch, or wrap to the start when done
    pub async fn open_next_batch(&self) -> Result<OpenEachOutcome> {
        let _guard = self.begin("open_next_batch")?;
        let mut state = self.load_state().await?;

        let outcome = open_each(&mut state.batch, &self.tabs, self.limits.open_delay_ms).await;
        if outcome != OpenEachOutcome::Empty {
            self.save_state(&state).await?;
        }
        log::info!("{}", outcome.message());
        Ok(outcome)
    }

    /// "Open All": every generated URL, confirmation required above the threshold
    pub async fn open_all_urls(&self, confirmed: bool) -> Result<Gate<BatchResult<String>>> {
        let _guard = self.begin("open_all_urls")?;
        let state = self.load_state().await?;
        let urls = &state.batch.generated_urls;

        if !confirmed {
            if let Some(warning) = open_all_warning(urls.len(), &self.limits) {
                return Ok(Gate::NeedsConfirmation(warning));
            }
        }
        Ok(Gate::Done(open_all(&self.tabs, urls, self.limits.open_delay_ms).await))
    }

    pub async fn set_export_format(&self, template: &str) -> Result<()> {
        let _guard = self.begin("set_export_format")?;
        ExportFormatProcessor::validate_template(template)?;

        let mut state = self.load_state().await?;
        state.export_format = template.to_string();
        self.save_state(&state).await
    }
}
