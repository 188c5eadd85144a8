/// Batch URL generation from `{id}` patterns and the persisted batch state
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use crate::config::{ID_PLACEHOLDER, Limits};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuggestedPattern {
    pub pattern: &'static str,
    pub description: &'static str,
}

/// Expands a pattern over an inclusive id range
#[derive(Debug, Clone)]
pub struct UrlGenerator {
    max_urls: u64,
}

impl Default for UrlGenerator {
    fn default() -> Self {
        UrlGenerator::new(&Limits::default())
    }
}

impl UrlGenerator {
    pub fn new(limits: &Limits) -> Self {
        UrlGenerator {
            max_urls: limits.max_urls,
        }
    }

    /// Checks pattern and range; returns the parsed bounds
    pub fn validate_inputs(&self, pattern: &str, start_id: &str, end_id: &str) -> Result<(u64, u64)> {
        if pattern.is_empty() {
            return Err(Error::validation("URL pattern is required"));
        }
        if !has_id_placeholder(pattern) {
            return Err(Error::validation("Pattern must contain {id} placeholder"));
        }

        let (Ok(start), Ok(end)) = (start_id.trim().parse::<i64>(), end_id.trim().parse::<i64>()) else {
            return Err(Error::validation("Start ID and End ID must be valid numbers"));
        };
        if start < 0 || end < 0 {
            return Err(Error::validation("IDs must be non-negative numbers"));
        }
        if start > end {
            return Err(Error::validation("Start ID must be less than or equal to End ID"));
        }

        let (start, end) = (start as u64, end as u64);
        if end - start + 1 > self.max_urls {
            return Err(Error::validation(format!(
                "ID range too large (max {} URLs)",
                group_thousands(self.max_urls)
            )));
        }

        Ok((start, end))
    }

    pub fn generate(&self, pattern: &str, start_id: &str, end_id: &str) -> Result<Vec<String>> {
        let (start, end) = self.validate_inputs(pattern, start_id, end_id)?;
        Ok(expand(pattern, start, end))
    }
}

fn expand(pattern: &str, start: u64, end: u64) -> Vec<String> {
    (start..=end)
        .map(|id| pattern.replace(ID_PLACEHOLDER, &id.to_string()))
        .collect()
}

/// 10000 -> "10,000"
fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// `generate` with the default 10,000 URL cap
pub fn generate(pattern: &str, start_id: &str, end_id: &str) -> Result<Vec<String>> {
    UrlGenerator::default().generate(pattern, start_id, end_id)
}

pub fn has_id_placeholder(pattern: &str) -> bool {
    pattern.contains(ID_PLACEHOLDER)
}

/// Insert `{id}` at a character offset (end of the pattern when `None` or
/// past the end). A pattern that already has the placeholder is returned as is.
pub fn insert_id_placeholder(pattern: &str, cursor: Option<usize>) -> String {
    if has_id_placeholder(pattern) {
        return pattern.to_string();
    }

    let byte_pos = cursor
        .and_then(|chars| pattern.char_indices().nth(chars).map(|(i, _)| i))
        .unwrap_or(pattern.len());

    let mut out = String::with_capacity(pattern.len() + ID_PLACEHOLDER.len());
    out.push_str(&pattern[..byte_pos]);
    out.push_str(ID_PLACEHOLDER);
    out.push_str(&pattern[byte_pos..]);
    out
}

/// Placeholder present and the pattern is a URL once an id is filled in
pub fn validate_pattern(pattern: &str) -> Result<()> {
    if pattern.is_empty() {
        return Err(Error::validation("URL pattern is required"));
    }
    if !has_id_placeholder(pattern) {
        return Err(Error::validation("Pattern must contain {id} placeholder"));
    }
    Url::parse(&pattern.replacen(ID_PLACEHOLDER, "1", 1))
        .map(|_| ())
        .map_err(|_| Error::validation("Invalid URL format"))
}

pub fn suggested_patterns() -> Vec<SuggestedPattern> {
    vec![
        SuggestedPattern {
            pattern: "https://example.com/page/{id}",
            description: "Basic page pattern",
        },
        SuggestedPattern {
            pattern: "https://api.example.com/users/{id}",
            description: "API endpoint pattern",
        },
        SuggestedPattern {
            pattern: "https://github.com/user/repo/issues/{id}",
            description: "GitHub issues pattern",
        },
        SuggestedPattern {
            pattern: "https://stackoverflow.com/questions/{id}",
            description: "Stack Overflow pattern",
        },
    ]
}

/// Confirmation prompt for generating a large list, if one is needed
pub fn generate_warning(count: usize, limits: &Limits) -> Option<String> {
    (count > limits.generate_warning_threshold).then(|| {
        format!("You are about to generate {count} URLs. Large numbers may slow down your browser. Continue?")
    })
}

/// Confirmation prompt for opening many tabs at once, if one is needed
pub fn open_all_warning(count: usize, limits: &Limits) -> Option<String> {
    (count > limits.open_all_warning_threshold).then(|| {
        format!("You are about to open {count} tabs at once. This may slow down your browser. Continue?")
    })
}

/// One URL per non-blank line
pub fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Batch-URL fields of the persisted app state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchUrlState {
    pub url_pattern: String,
    pub start_id: Option<i64>,
    pub end_id: Option<i64>,
    pub generated_urls: Vec<String>,
    pub batch_size: usize,
    /// Count of URLs already opened, always `<= generated_urls.len()`
    pub current_open_index: usize,
}

impl Default for BatchUrlState {
    fn default() -> Self {
        BatchUrlState {
            url_pattern: String::new(),
            start_id: None,
            end_id: None,
            generated_urls: Vec::new(),
            batch_size: Limits::default().default_batch_size,
            current_open_index: 0,
        }
    }
}

fn loose_int(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

impl BatchUrlState {
    pub fn normalize(raw: &Map<String, Value>) -> Self {
        let defaults = BatchUrlState::default();

        let generated_urls: Vec<String> = match raw.get("generatedUrls") {
            Some(Value::Array(urls)) => urls.iter().filter_map(|u| u.as_str().map(str::to_string)).collect(),
            _ => Vec::new(),
        };
        let batch_size = raw
            .get("batchSize")
            .and_then(Value::as_u64)
            .filter(|size| *size > 0)
            .map_or(defaults.batch_size, |size| size as usize);
        let current_open_index = raw
            .get("currentOpenIndex")
            .and_then(Value::as_u64)
            .map_or(0, |index| (index as usize).min(generated_urls.len()));

        BatchUrlState {
            url_pattern: raw
                .get("urlPattern")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            start_id: loose_int(raw.get("startId")),
            end_id: loose_int(raw.get("endId")),
            generated_urls,
            batch_size,
            current_open_index,
        }
    }

    /// Regenerate the list from the pattern and range, resetting progress
    pub fn regenerate(&mut self, generator: &UrlGenerator, pattern: &str, start_id: &str, end_id: &str) -> Result<usize> {
        let (start, end) = generator.validate_inputs(pattern, start_id, end_id)?;
        let urls = expand(pattern, start, end);

        self.url_pattern = pattern.to_string();
        self.start_id = Some(start as i64);
        self.end_id = Some(end as i64);
        self.generated_urls = urls;
        self.current_open_index = 0;
        Ok(self.generated_urls.len())
    }

    /// Manual edit of the URL list; progress starts over
    pub fn set_urls_from_text(&mut self, text: &str) {
        self.generated_urls = parse_url_list(text);
        self.current_open_index = 0;
    }

    pub fn set_batch_size(&mut self, batch_size: usize) {
        self.batch_size = batch_size.max(1);
    }

    pub fn clear(&mut self) {
        self.generated_urls.clear();
        self.current_open_index = 0;
    }
}
