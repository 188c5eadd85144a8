/// Input validation for blocked domains, redirect rules, profile and
/// instance names. Validators report problems in their return value and
/// never fail.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use url::Url;

use crate::config::INSTANCE_ICONS;
use crate::model::{BlockedDomain, RedirectRule};

static HOSTNAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$")
        .expect("hostname pattern is valid")
});

static HOST_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9*]([a-zA-Z0-9*-]{0,61}[a-zA-Z0-9*])?(\.[a-zA-Z0-9*]([a-zA-Z0-9*-]{0,61}[a-zA-Z0-9*])?)*$")
        .expect("host pattern is valid")
});

static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9a-fA-F]{6}$").expect("color pattern is valid"));

/// Outcome of a domain check; `domain` is the normalized value when valid
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DomainValidation {
    fn ok(domain: String) -> Self {
        DomainValidation {
            valid: true,
            domain: Some(domain),
            error: None,
        }
    }

    fn fail(error: &str) -> Self {
        DomainValidation {
            valid: false,
            domain: None,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RedirectValidation {
    fn fail(error: String) -> Self {
        RedirectValidation {
            valid: false,
            from_url: None,
            to_url: None,
            error: Some(error),
        }
    }
}

/// Shared dotted-host checks; returns the trimmed value or the first error
fn check_host(value: &str, noun: &str, grammar: &Regex, format_error: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(format!("{noun} cannot be empty"));
    }

    let parts: Vec<&str> = trimmed.split('.').collect();
    if parts.len() < 2 {
        return Err(format!("{noun} must have at least 2 parts (e.g., example.com)"));
    }
    if parts.iter().any(|p| p.is_empty()) {
        return Err(format!("{noun} cannot have empty parts"));
    }
    if !grammar.is_match(trimmed) {
        return Err(format_error.to_string());
    }

    Ok(trimmed.to_string())
}

pub struct DomainValidator;

impl DomainValidator {
    /// Format only; the result is lowercased
    pub fn validate_format(domain: &str) -> Result<String, String> {
        check_host(domain, "Domain", &HOSTNAME, "Invalid domain format").map(|d| d.to_lowercase())
    }

    /// Case-insensitive duplicate scan that skips the entry being edited
    pub fn is_duplicate(domain: &str, existing: &[BlockedDomain], editing_id: Option<&str>) -> bool {
        existing
            .iter()
            .any(|d| d.domain.eq_ignore_ascii_case(domain) && Some(d.id.as_str()) != editing_id)
    }

    pub fn validate(domain: &str, existing: &[BlockedDomain], editing_id: Option<&str>) -> DomainValidation {
        let domain = match Self::validate_format(domain) {
            Ok(domain) => domain,
            Err(error) => return DomainValidation::fail(&error),
        };

        if Self::is_duplicate(&domain, existing, editing_id) {
            return DomainValidation::fail("Domain already exists in the list");
        }

        DomainValidation::ok(domain)
    }
}

pub struct RedirectValidator;

impl RedirectValidator {
    /// Dotted host pattern where `*` may stand in for any label character
    pub fn validate_from_url(from_url: &str) -> Result<String, String> {
        check_host(from_url, "Source URL", &HOST_PATTERN, "Invalid URL pattern format")
    }

    pub fn validate_to_url(to_url: &str) -> Result<String, String> {
        let trimmed = to_url.trim();
        if trimmed.is_empty() {
            return Err("Target URL cannot be empty".to_string());
        }
        if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
            return Err("Target URL must start with http:// or https://".to_string());
        }
        match Url::parse(trimmed) {
            Ok(url) if url.host_str().is_some_and(|h| !h.is_empty()) => Ok(trimmed.to_string()),
            _ => Err("Invalid target URL format".to_string()),
        }
    }

    pub fn is_duplicate(from_url: &str, existing: &[RedirectRule], editing_id: Option<&str>) -> bool {
        existing
            .iter()
            .any(|r| r.from_url.eq_ignore_ascii_case(from_url) && Some(r.id.as_str()) != editing_id)
    }

    /// Source format, then target format, then uniqueness
    pub fn validate(
        from_url: &str,
        to_url: &str,
        existing: &[RedirectRule],
        editing_id: Option<&str>,
    ) -> RedirectValidation {
        let from_url = match Self::validate_from_url(from_url) {
            Ok(from) => from,
            Err(error) => return RedirectValidation::fail(error),
        };
        let to_url = match Self::validate_to_url(to_url) {
            Ok(to) => to,
            Err(error) => return RedirectValidation::fail(error),
        };
        if Self::is_duplicate(&from_url, existing, editing_id) {
            return RedirectValidation::fail("This redirect rule already exists".to_string());
        }

        RedirectValidation {
            valid: true,
            from_url: Some(from_url),
            to_url: Some(to_url),
            error: None,
        }
    }
}

/// Profile and instance names share the same minimum length rule
pub fn validate_name(name: &str, noun: &str, min_length: usize) -> Result<String, String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(format!("Please enter a {noun} name."));
    }
    if trimmed.chars().count() < min_length {
        return Err(format!("{} name must be at least {min_length} characters.", capitalize(noun)));
    }
    Ok(trimmed.to_string())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Case-insensitive name clash, ignoring the entry with `exclude_id`
pub fn is_duplicate_name<'a, I>(name: &str, existing: I, exclude_id: Option<&str>) -> bool
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let wanted = name.trim().to_lowercase();
    existing
        .into_iter()
        .any(|(id, other)| Some(id) != exclude_id && other.to_lowercase() == wanted)
}

/// Collects every problem with an instance's user-editable fields
pub fn validate_instance(name: &str, color: &str, icon: &str, min_length: usize) -> Vec<String> {
    let mut errors = Vec::new();

    if let Err(error) = validate_name(name, "instance", min_length) {
        errors.push(error);
    }
    if !HEX_COLOR.is_match(color) {
        errors.push("Invalid color format (must be hex color)".to_string());
    }
    if !INSTANCE_ICONS.contains(&icon) {
        errors.push(format!("Unknown icon: {icon}"));
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Collection;
    use serde_json::json;
    use time::macros::datetime;

    fn blocked(id: &str, domain: &str) -> BlockedDomain {
        BlockedDomain {
            id: id.to_string(),
            domain: domain.to_string(),
            modified_at: datetime!(2024-01-01 0:00 UTC),
        }
    }

    fn rule(id: &str, from: &str) -> RedirectRule {
        RedirectRule {
            id: id.to_string(),
            from_url: from.to_string(),
            to_url: "https://target.com".to_string(),
            modified_at: datetime!(2024-01-01 0:00 UTC),
        }
    }

    #[test]
    fn test_domain_valid() {
        let result = DomainValidator::validate("example.com", &[], None);
        assert!(result.valid);
        assert_eq!(result.domain.as_deref(), Some("example.com"));
    }

    #[test]
    fn test_domain_is_trimmed_and_lowercased() {
        let result = DomainValidator::validate("  Sub.Example.COM ", &[], None);
        assert_eq!(result.domain.as_deref(), Some("sub.example.com"));
    }

    #[test]
    fn test_domain_format_errors() {
        let cases = [
            ("", "Domain cannot be empty"),
            ("   ", "Domain cannot be empty"),
            ("localhost", "Domain must have at least 2 parts (e.g., example.com)"),
            ("example..com", "Domain cannot have empty parts"),
            ("-bad.com", "Invalid domain format"),
            ("bad-.com", "Invalid domain format"),
            ("exa_mple.com", "Invalid domain format"),
        ];

        for (input, expected) in cases {
            let result = DomainValidator::validate(input, &[], None);
            assert!(!result.valid, "{input} should be rejected");
            assert_eq!(result.error.as_deref(), Some(expected), "input: {input}");
            assert!(result.domain.is_none());
        }
    }

    #[test]
    fn test_domain_label_length() {
        let long_label = "a".repeat(64);
        assert!(!DomainValidator::validate(&format!("{long_label}.com"), &[], None).valid);
        assert!(DomainValidator::validate(&format!("{}.com", "a".repeat(63)), &[], None).valid);
    }

    #[test]
    fn test_domain_duplicate_and_self_edit() {
        let existing = vec![blocked("1", "example.com")];

        let duplicate = DomainValidator::validate("EXAMPLE.com", &existing, None);
        assert!(!duplicate.valid);
        assert_eq!(duplicate.error.as_deref(), Some("Domain already exists in the list"));

        assert!(DomainValidator::validate("example.com", &existing, Some("1")).valid);
        assert!(!DomainValidator::validate("example.com", &existing, Some("2")).valid);
    }

    #[test]
    fn test_duplicates_found_in_loosely_shaped_lists() {
        let now = datetime!(2024-01-01 0:00 UTC);
        let domains: Collection<BlockedDomain> =
            Collection::from_loose_json(&json!([{"id": "1", "domain": "example.com"}]), now).unwrap();

        assert!(!DomainValidator::validate("example.com", &domains.items, None).valid);
        assert!(DomainValidator::validate("example.com", &domains.items, Some("1")).valid);

        let rules: Collection<RedirectRule> =
            Collection::from_loose_json(&json!([{"id": "1", "fromUrl": "old.com"}]), now).unwrap();
        let duplicate = RedirectValidator::validate("old.com", "https://x.com", &rules.items, None);
        assert_eq!(duplicate.error.as_deref(), Some("This redirect rule already exists"));
    }

    #[test]
    fn test_redirect_valid_with_wildcards() {
        let result = RedirectValidator::validate("*.old.com", "https://new.com/path", &[], None);
        assert!(result.valid);
        assert_eq!(result.from_url.as_deref(), Some("*.old.com"));
        assert_eq!(result.to_url.as_deref(), Some("https://new.com/path"));
    }

    #[test]
    fn test_redirect_bad_scheme() {
        let result = RedirectValidator::validate("old.com", "ftp://new.com", &[], None);
        assert!(!result.valid);
        assert_eq!(result.error.as_deref(), Some("Target URL must start with http:// or https://"));
    }

    #[test]
    fn test_redirect_unparseable_target() {
        let result = RedirectValidator::validate("old.com", "https://", &[], None);
        assert_eq!(result.error.as_deref(), Some("Invalid target URL format"));
    }

    #[test]
    fn test_redirect_source_checked_first() {
        let result = RedirectValidator::validate("old", "ftp://new.com", &[], None);
        assert_eq!(
            result.error.as_deref(),
            Some("Source URL must have at least 2 parts (e.g., example.com)")
        );
    }

    #[test]
    fn test_redirect_uniqueness_last() {
        let existing = vec![rule("1", "old.com")];

        let bad_target = RedirectValidator::validate("OLD.com", "nope", &existing, None);
        assert_eq!(bad_target.error.as_deref(), Some("Target URL must start with http:// or https://"));

        let duplicate = RedirectValidator::validate("OLD.com", "https://x.com", &existing, None);
        assert_eq!(duplicate.error.as_deref(), Some("This redirect rule already exists"));

        assert!(RedirectValidator::validate("old.com", "https://x.com", &existing, Some("1")).valid);
    }

    #[test]
    fn test_validate_name() {
        assert_eq!(validate_name("", "profile", 2), Err("Please enter a profile name.".to_string()));
        assert_eq!(
            validate_name(" a ", "profile", 2),
            Err("Profile name must be at least 2 characters.".to_string())
        );
        assert_eq!(validate_name("  Work ", "profile", 2), Ok("Work".to_string()));
    }

    #[test]
    fn test_duplicate_name() {
        let existing = [("1", "Work"), ("2", "Home")];

        assert!(is_duplicate_name(" work ", existing, None));
        assert!(!is_duplicate_name("work", existing, Some("1")));
        assert!(!is_duplicate_name("Play", existing, None));
    }

    #[test]
    fn test_validate_instance_collects_all_errors() {
        assert!(validate_instance("Work", "#42A5F5", "WorkIcon", 2).is_empty());

        let errors = validate_instance("W", "blue", "RocketIcon", 2);
        assert_eq!(errors.len(), 3);
        assert_eq!(errors[1], "Invalid color format (must be hex color)");
    }
}
