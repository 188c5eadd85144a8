/// Progressive opening of a generated URL list in fixed-size batches
use serde::Serialize;

use crate::batch_url::BatchUrlState;
use crate::host::TabProvider;
use crate::report::BatchResult;

/// Snapshot of batch progress, with 1-based positions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchInfo {
    pub current_batch: usize,
    pub total_batches: usize,
    /// Most recent batch once something was opened, otherwise the next one
    pub range_start: usize,
    pub range_end: usize,
    pub urls_in_next_batch: usize,
    pub total_urls: usize,
    pub is_complete: bool,
}

pub fn calculate_batch_info(total_urls: usize, current_index: usize, batch_size: usize) -> BatchInfo {
    let batch_size = batch_size.max(1);
    let total_batches = total_urls.div_ceil(batch_size);
    let current_batch = total_batches.min((current_index + 1).div_ceil(batch_size));

    let (range_start, range_end) = if total_urls == 0 {
        (0, 0)
    } else if current_index == 0 {
        (1, total_urls.min(batch_size))
    } else {
        let end = total_urls.min(current_index);
        ((end + 1).saturating_sub(batch_size).max(1), end)
    };

    BatchInfo {
        current_batch,
        total_batches,
        range_start,
        range_end,
        urls_in_next_batch: batch_size.min(total_urls.saturating_sub(current_index)),
        total_urls,
        is_complete: current_index >= total_urls,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOpen {
    pub new_index: usize,
    pub urls_opened: Vec<String>,
    pub is_complete: bool,
    pub report: BatchResult<String>,
}

/// Open `urls[start..start + batch_size]` one at a time. A URL that fails to
/// open is logged and reported; the index still moves to the batch boundary.
pub async fn open_single_batch<T: TabProvider>(
    tabs: &T,
    urls: &[String],
    start_index: usize,
    batch_size: usize,
    delay_ms: u32,
) -> BatchOpen {
    let start = start_index.min(urls.len());
    let end = start.saturating_add(batch_size.max(1)).min(urls.len());
    let batch = &urls[start..end];

    let report = open_sequentially(tabs, batch, delay_ms).await;

    BatchOpen {
        new_index: end,
        urls_opened: batch.to_vec(),
        is_complete: end >= urls.len(),
        report,
    }
}

async fn open_sequentially<T: TabProvider>(tabs: &T, urls: &[String], delay_ms: u32) -> BatchResult<String> {
    let mut report = BatchResult::new();
    for url in urls {
        match tabs.create_tab(url, false).await {
            Ok(()) => report.succeed(url.clone()),
            Err(e) => {
                log::error!("Error opening URL {}: {}", url, e);
                report.fail(url.clone(), e.to_string());
            }
        }
        tabs.pause(delay_ms).await;
    }
    report
}

/// Open the whole list, best-effort
pub async fn open_all<T: TabProvider>(tabs: &T, urls: &[String], delay_ms: u32) -> BatchResult<String> {
    let report = open_sequentially(tabs, urls, delay_ms).await;
    log::info!("Opened {} of {} URLs", report.succeeded.len(), urls.len());
    report
}

/// What an "Open Each" press did
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum OpenEachOutcome {
    /// Nothing generated yet
    Empty,
    /// Everything had been opened; progress went back to the start
    Reset,
    #[serde(rename_all = "camelCase")]
    Opened {
        batch: BatchInfo,
        range_start: usize,
        range_end: usize,
        report: BatchResult<String>,
    },
}

impl OpenEachOutcome {
    pub fn message(&self) -> String {
        match self {
            OpenEachOutcome::Empty => "No URLs to open".to_string(),
            OpenEachOutcome::Reset => "All URLs have been opened. Resetting to start.".to_string(),
            OpenEachOutcome::Opened {
                batch,
                range_start,
                range_end,
                report,
            } => {
                let mut message = format!(
                    "Opened batch {}/{} (links {}-{} of {})",
                    batch.current_batch, batch.total_batches, range_start, range_end, batch.total_urls
                );
                if !report.is_clean() {
                    message.push_str(&format!(", {} failed", report.failed.len()));
                }
                message
            }
        }
    }
}

/// Advance the state by one batch, wrapping to the start once complete
pub async fn open_each<T: TabProvider>(state: &mut BatchUrlState, tabs: &T, delay_ms: u32) -> OpenEachOutcome {
    let total = state.generated_urls.len();
    if total == 0 {
        return OpenEachOutcome::Empty;
    }

    let before = calculate_batch_info(total, state.current_open_index, state.batch_size);
    if before.is_complete {
        state.current_open_index = 0;
        return OpenEachOutcome::Reset;
    }

    let opened = open_single_batch(
        tabs,
        &state.generated_urls,
        state.current_open_index,
        state.batch_size,
        delay_ms,
    )
    .await;

    let range_start = state.current_open_index + 1;
    state.current_open_index = opened.new_index;

    OpenEachOutcome::Opened {
        batch: before,
        range_start,
        range_end: opened.new_index,
        report: opened.report,
    }
}
