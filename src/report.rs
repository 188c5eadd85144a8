/// Result shapes handed back to the popup for inline feedback
use serde::Serialize;

/// Outcome of a user-facing action such as saving or opening an instance
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionReport {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tab_count: Option<usize>,
}

impl ActionReport {
    pub fn ok(message: impl Into<String>) -> Self {
        ActionReport {
            success: true,
            message: message.into(),
            tab_count: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        ActionReport {
            success: false,
            message: message.into(),
            tab_count: None,
        }
    }

    pub fn with_tabs(mut self, count: usize) -> Self {
        self.tab_count = Some(count);
        self
    }
}

/// An item a bulk operation could not process, and why
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure<T> {
    pub item: T,
    pub error: String,
}

/// Partial-success report of a best-effort loop
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResult<S, F = S> {
    pub succeeded: Vec<S>,
    pub failed: Vec<Failure<F>>,
}

impl<S, F> Default for BatchResult<S, F> {
    fn default() -> Self {
        BatchResult {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<S, F> BatchResult<S, F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeed(&mut self, item: S) {
        self.succeeded.push(item);
    }

    pub fn fail(&mut self, item: F, error: impl Into<String>) {
        self.failed.push(Failure {
            item,
            error: error.into(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_result_accumulates() {
        let mut result: BatchResult<String> = BatchResult::new();
        result.succeed("a".to_string());
        result.fail("b".to_string(), "boom");

        assert_eq!(result.total(), 2);
        assert!(!result.is_clean());
        assert_eq!(result.failed[0].error, "boom");
    }

    #[test]
    fn test_action_report_json() {
        let report = ActionReport::ok("Saved 3 tab(s) to instance").with_tabs(3);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["success"], true);
        assert_eq!(json["tabCount"], 3);
        assert!(serde_json::to_value(ActionReport::failed("x")).unwrap().get("tabCount").is_none());
    }
}
