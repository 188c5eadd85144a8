/// Token substitution for exporting tabs as text lines
///
/// Supported tokens: `<id>` (1-based position), `<idp>` (zero-padded
/// position), `<url>` and `<name>` (title, `Untitled` when empty). Tokens
/// are replaced in a single left-to-right pass, so text coming from a URL or
/// title is never rescanned.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::tab_data::TabLike;

pub const TOKEN_ID: &str = "<id>";
pub const TOKEN_ID_PADDED: &str = "<idp>";
pub const TOKEN_URL: &str = "<url>";
pub const TOKEN_NAME: &str = "<name>";

const TOKENS: [&str; 4] = [TOKEN_ID_PADDED, TOKEN_ID, TOKEN_URL, TOKEN_NAME];

static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("token pattern is valid"));

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatParameter {
    pub key: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormatExample {
    pub template: &'static str,
    pub result: &'static str,
}

#[derive(Debug, Clone)]
pub struct ExportFormatProcessor {
    padding: usize,
}

impl Default for ExportFormatProcessor {
    fn default() -> Self {
        ExportFormatProcessor { padding: 2 }
    }
}

impl ExportFormatProcessor {
    pub fn with_padding(padding: usize) -> Self {
        ExportFormatProcessor { padding }
    }

    /// One rendered line per item, in order. Unknown tokens stay as written.
    pub fn process<T: TabLike>(&self, template: &str, items: &[T]) -> Vec<String> {
        items
            .iter()
            .enumerate()
            .map(|(index, item)| self.render(template, index + 1, item))
            .collect()
    }

    fn render<T: TabLike>(&self, template: &str, position: usize, item: &T) -> String {
        let mut out = String::with_capacity(template.len() + item.url().len());
        let mut rest = template;

        while !rest.is_empty() {
            let token = TOKENS.iter().find(|t| rest.starts_with(**t));
            match token {
                Some(&TOKEN_ID) => out.push_str(&position.to_string()),
                Some(&TOKEN_ID_PADDED) => out.push_str(&pad_index(position, self.padding)),
                Some(&TOKEN_URL) => out.push_str(item.url()),
                Some(&TOKEN_NAME) => out.push_str(display_title(item.title())),
                _ => {
                    let ch = rest.chars().next().unwrap_or_default();
                    out.push(ch);
                    rest = &rest[ch.len_utf8()..];
                    continue;
                }
            }
            rest = &rest[token.map_or(0, |t| t.len())..];
        }

        out
    }

    /// Rejects empty templates and bracketed tokens the processor does not know
    pub fn validate_template(template: &str) -> Result<()> {
        if template.trim().is_empty() {
            return Err(Error::validation("Template must be a non-empty string"));
        }

        let unknown: Vec<&str> = BRACKETED
            .find_iter(template)
            .map(|m| m.as_str())
            .filter(|token| !TOKENS.contains(token))
            .collect();

        if unknown.is_empty() {
            Ok(())
        } else {
            Err(Error::validation(format!("Invalid parameters: {}", unknown.join(", "))))
        }
    }

    pub fn parameters() -> Vec<FormatParameter> {
        vec![
            FormatParameter { key: TOKEN_ID, description: "Index number (1, 2, 3...)" },
            FormatParameter { key: TOKEN_ID_PADDED, description: "Zero-padded index (01, 02, 03...)" },
            FormatParameter { key: TOKEN_URL, description: "Full URL of the tab" },
            FormatParameter { key: TOKEN_NAME, description: "Page title" },
        ]
    }

    pub fn examples() -> Vec<FormatExample> {
        vec![
            FormatExample { template: "<url>", result: "https://example.com" },
            FormatExample { template: "<id>. <name>", result: "1. Example Page" },
            FormatExample { template: "<idp>. <name>", result: "01. Example Page" },
            FormatExample {
                template: "<id>. <name> - <url>",
                result: "1. Example Page - https://example.com",
            },
            FormatExample { template: "<name> (<url>)", result: "Example Page (https://example.com)" },
        ]
    }
}

pub fn pad_index(index: usize, width: usize) -> String {
    format!("{index:0width$}")
}

fn display_title(title: &str) -> &str {
    if title.is_empty() { "Untitled" } else { title }
}

/// Convenience wrapper using the default padding
pub fn process<T: TabLike>(template: &str, items: &[T]) -> Vec<String> {
    ExportFormatProcessor::default().process(template, items)
}
