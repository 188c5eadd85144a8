/// Tab Helper - Chrome extension core: batch URLs, tab export, site
/// blocking, redirects, profiles and tab-set instances
/// Built with Rust + WASM

pub mod app_state;
pub mod batch_url;
pub mod config;
pub mod error;
pub mod export_format;
pub mod extractor;
pub mod host;
pub mod instances;
pub mod model;
pub mod profile_io;
pub mod profiles;
pub mod progress;
pub mod report;
pub mod rules;
pub mod session;
pub mod storage;
pub mod tab_data;
pub mod validators;

#[cfg(target_arch = "wasm32")]
pub mod bridge;
#[cfg(target_arch = "wasm32")]
pub mod chrome;

#[cfg(test)]
mod testing;

pub use config::Limits;
pub use error::{Error, Result};
pub use session::Session;

use wasm_bindgen::prelude::*;

// Set up panic hook for better error messages in the browser console
#[wasm_bindgen(start)]
pub fn main() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

fn to_js<T: serde::Serialize>(value: &T) -> JsValue {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .unwrap_or(JsValue::NULL)
}

// Pure helpers for the popup script; they need no session

#[wasm_bindgen(js_name = generateUrls)]
pub fn generate_urls(pattern: &str, start_id: &str, end_id: &str) -> std::result::Result<Vec<String>, JsError> {
    batch_url::generate(pattern, start_id, end_id).map_err(|e| JsError::new(&e.to_string()))
}

#[wasm_bindgen(js_name = insertIdPlaceholder)]
pub fn insert_id_placeholder(pattern: &str, cursor: Option<usize>) -> String {
    batch_url::insert_id_placeholder(pattern, cursor)
}

#[wasm_bindgen(js_name = suggestedPatterns)]
pub fn suggested_patterns() -> JsValue {
    to_js(&batch_url::suggested_patterns())
}

#[wasm_bindgen(js_name = batchInfo)]
pub fn batch_info(total_urls: usize, current_index: usize, batch_size: usize) -> JsValue {
    to_js(&progress::calculate_batch_info(total_urls, current_index, batch_size))
}

/// `tabs` is an array of `{url, title?}` objects
#[wasm_bindgen(js_name = formatExport)]
pub fn format_export(template: &str, tabs: JsValue) -> std::result::Result<Vec<String>, JsError> {
    let tabs: Vec<tab_data::InstanceTab> =
        serde_wasm_bindgen::from_value(tabs).map_err(|e| JsError::new(&e.to_string()))?;
    Ok(export_format::process(template, &tabs))
}

#[wasm_bindgen(js_name = exportParameters)]
pub fn export_parameters() -> JsValue {
    to_js(&export_format::ExportFormatProcessor::parameters())
}

#[wasm_bindgen(js_name = exportExamples)]
pub fn export_examples() -> JsValue {
    to_js(&export_format::ExportFormatProcessor::examples())
}

/// Error message for an unusable pattern, `undefined` when it is fine
#[wasm_bindgen(js_name = validatePattern)]
pub fn validate_pattern(pattern: &str) -> Option<String> {
    batch_url::validate_pattern(pattern).err().map(|e| e.to_string())
}

/// Entries as the popup holds them: any object shape, normalized like stored ones
fn existing_entries<T: model::Entity>(existing: JsValue) -> std::result::Result<Vec<T>, JsError> {
    let raw: serde_json::Value = serde_wasm_bindgen::from_value(existing).map_err(|e| JsError::new(&e.to_string()))?;
    storage::Collection::from_loose_json(&raw, time::OffsetDateTime::now_utc())
        .map(|collection| collection.items)
        .map_err(|e| JsError::new(&e.to_string()))
}

#[wasm_bindgen(js_name = validateDomain)]
pub fn validate_domain(
    domain: &str,
    existing: JsValue,
    editing_id: Option<String>,
) -> std::result::Result<JsValue, JsError> {
    let existing: Vec<model::BlockedDomain> = existing_entries(existing)?;
    Ok(to_js(&validators::DomainValidator::validate(domain, &existing, editing_id.as_deref())))
}

#[wasm_bindgen(js_name = validateRedirect)]
pub fn validate_redirect(
    from_url: &str,
    to_url: &str,
    existing: JsValue,
    editing_id: Option<String>,
) -> std::result::Result<JsValue, JsError> {
    let existing: Vec<model::RedirectRule> = existing_entries(existing)?;
    Ok(to_js(&validators::RedirectValidator::validate(from_url, to_url, &existing, editing_id.as_deref())))
}
