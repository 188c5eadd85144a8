/// Blocked domains and redirect rules: persisted lists and their
/// declarativeNetRequest counterparts
use serde::Serialize;

use crate::error::{Error, Result};
use crate::host::{NetworkRuleProvider, TabProvider};
use crate::model::{BlockedDomain, Clock, RedirectRule};
use crate::report::{ActionReport, BatchResult};
use crate::session::Session;
use crate::storage::{Collection, KeyValueStore, keys, load_collection, save_collection};
use crate::validators::{DomainValidation, DomainValidator, RedirectValidation, RedirectValidator};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectPair {
    pub from_url: String,
    pub to_url: String,
}

impl<S, T, N, C> Session<S, T, N, C>
where
    S: KeyValueStore,
    T: TabProvider,
    N: NetworkRuleProvider,
    C: Clock,
{
    pub(crate) async fn load_domains(&self) -> Result<Collection<BlockedDomain>> {
        load_collection(&self.store, keys::BLOCKED_DOMAINS, self.now()).await
    }

    pub(crate) async fn load_redirects(&self) -> Result<Collection<RedirectRule>> {
        load_collection(&self.store, keys::REDIRECT_RULES, self.now()).await
    }

    pub async fn list_blocked_domains(&self) -> Result<Vec<BlockedDomain>> {
        Ok(self.load_domains().await?.items)
    }

    pub async fn add_blocked_domain(&self, domain: &str) -> Result<BlockedDomain> {
        let _guard = self.begin("add_blocked_domain")?;
        let mut domains = self.load_domains().await?;

        let domain = accept_domain(DomainValidator::validate(domain, &domains.items, None))?;

        let entry = BlockedDomain::new(&domain, self.now());
        domains.upsert(entry.clone(), self.now());
        save_collection(&self.store, keys::BLOCKED_DOMAINS, &domains).await?;
        log::info!("Added blocked domain {}", entry.domain);
        Ok(entry)
    }

    pub async fn edit_blocked_domain(&self, id: &str, domain: &str) -> Result<BlockedDomain> {
        let _guard = self.begin("edit_blocked_domain")?;
        let mut domains = self.load_domains().await?;
        if !domains.contains(id) {
            return Err(Error::not_found("blocked domain", id));
        }

        let domain = accept_domain(DomainValidator::validate(domain, &domains.items, Some(id)))?;

        let now = self.now();
        let entry = domains
            .get_mut(id)
            .map(|entry| {
                entry.domain = domain;
                entry.modified_at = now;
                entry.clone()
            })
            .ok_or_else(|| Error::not_found("blocked domain", id))?;
        save_collection(&self.store, keys::BLOCKED_DOMAINS, &domains).await?;
        Ok(entry)
    }

    pub async fn delete_blocked_domain(&self, id: &str) -> Result<()> {
        let _guard = self.begin("delete_blocked_domain")?;
        let mut domains = self.load_domains().await?;
        if !domains.remove(id) {
            return Err(Error::not_found("blocked domain", id));
        }
        save_collection(&self.store, keys::BLOCKED_DOMAINS, &domains).await
    }

    /// Empty the list and drop every block rule
    pub async fn clear_blocked_domains(&self) -> Result<ActionReport> {
        let _guard = self.begin("clear_blocked_domains")?;
        save_collection(&self.store, keys::BLOCKED_DOMAINS, &Collection::<BlockedDomain>::new()).await?;
        Ok(match self.rules.update_block_rules(&[]).await {
            Ok(()) => ActionReport::ok("Cleared all blocked domains"),
            Err(e) => {
                log::error!("Error clearing block rules: {}", e);
                ActionReport::failed(e.to_string())
            }
        })
    }

    /// One domain per line; each line is checked against the list as it grows
    pub async fn bulk_add_domains(&self, text: &str) -> Result<BatchResult<String>> {
        let _guard = self.begin("bulk_add_domains")?;
        let mut domains = self.load_domains().await?;
        let mut result = BatchResult::new();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match accept_domain(DomainValidator::validate(line, &domains.items, None)) {
                Ok(domain) => {
                    domains.upsert(BlockedDomain::new(&domain, self.now()), self.now());
                    result.succeed(domain);
                }
                Err(e) => {
                    log::warn!("Skipping domain '{}': {}", line, e);
                    result.fail(line.to_string(), e.to_string());
                }
            }
        }

        if !result.succeeded.is_empty() {
            save_collection(&self.store, keys::BLOCKED_DOMAINS, &domains).await?;
        }
        Ok(result)
    }

    /// Push the stored list to the browser as block rules
    pub async fn apply_block_list(&self) -> Result<ActionReport> {
        let _guard = self.begin("apply_block_list")?;
        let domains = self.load_domains().await?;
        Ok(match self.rules.update_block_rules(&domains.items).await {
            Ok(()) => {
                log::info!("Applied {} blocking rules", domains.len() * 2);
                ActionReport::ok(format!(
                    "Successfully saved and applied {} blocked domain(s)",
                    domains.len()
                ))
            }
            Err(e) => {
                log::error!("Error updating block rules: {}", e);
                ActionReport::failed(e.to_string())
            }
        })
    }

    pub async fn list_redirect_rules(&self) -> Result<Vec<RedirectRule>> {
        Ok(self.load_redirects().await?.items)
    }

    pub async fn add_redirect_rule(&self, from_url: &str, to_url: &str) -> Result<RedirectRule> {
        let _guard = self.begin("add_redirect_rule")?;
        let mut rules = self.load_redirects().await?;

        let (from, to) = accept_redirect(RedirectValidator::validate(from_url, to_url, &rules.items, None))?;
        let rule = RedirectRule::new(&from, &to, self.now());
        rules.upsert(rule.clone(), self.now());
        save_collection(&self.store, keys::REDIRECT_RULES, &rules).await?;
        log::info!("Added redirect {} -> {}", rule.from_url, rule.to_url);
        Ok(rule)
    }

    pub async fn edit_redirect_rule(&self, id: &str, from_url: &str, to_url: &str) -> Result<RedirectRule> {
        let _guard = self.begin("edit_redirect_rule")?;
        let mut rules = self.load_redirects().await?;
        if !rules.contains(id) {
            return Err(Error::not_found("redirect rule", id));
        }

        let (from, to) = accept_redirect(RedirectValidator::validate(from_url, to_url, &rules.items, Some(id)))?;
        let now = self.now();
        let rule = rules
            .get_mut(id)
            .map(|rule| {
                rule.from_url = from;
                rule.to_url = to;
                rule.modified_at = now;
                rule.clone()
            })
            .ok_or_else(|| Error::not_found("redirect rule", id))?;
        save_collection(&self.store, keys::REDIRECT_RULES, &rules).await?;
        Ok(rule)
    }

    pub async fn delete_redirect_rule(&self, id: &str) -> Result<()> {
        let _guard = self.begin("delete_redirect_rule")?;
        let mut rules = self.load_redirects().await?;
        if !rules.remove(id) {
            return Err(Error::not_found("redirect rule", id));
        }
        save_collection(&self.store, keys::REDIRECT_RULES, &rules).await
    }

    pub async fn clear_redirect_rules(&self) -> Result<()> {
        let _guard = self.begin("clear_redirect_rules")?;
        save_collection(&self.store, keys::REDIRECT_RULES, &Collection::<RedirectRule>::new()).await?;
        self.rules.update_redirect_rules(&[]).await
    }

    /// Lines of `from to`, separated by whitespace
    pub async fn bulk_add_redirects(&self, text: &str) -> Result<BatchResult<RedirectPair, String>> {
        let _guard = self.begin("bulk_add_redirects")?;
        let mut rules = self.load_redirects().await?;
        let mut result = BatchResult::new();

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let mut parts = line.split_whitespace();
            let (Some(from), Some(to)) = (parts.next(), parts.next()) else {
                result.fail(line.to_string(), "Invalid format. Expected: fromUrl toUrl");
                continue;
            };
            if parts.next().is_some() {
                result.fail(line.to_string(), "Invalid format. Expected: fromUrl toUrl");
                continue;
            }

            match accept_redirect(RedirectValidator::validate(from, to, &rules.items, None)) {
                Ok((from_url, to_url)) => {
                    rules.upsert(RedirectRule::new(&from_url, &to_url, self.now()), self.now());
                    result.succeed(RedirectPair { from_url, to_url });
                }
                Err(e) => {
                    log::warn!("Skipping redirect '{}': {}", line, e);
                    result.fail(line.to_string(), e.to_string());
                }
            }
        }

        if !result.succeeded.is_empty() {
            save_collection(&self.store, keys::REDIRECT_RULES, &rules).await?;
        }
        Ok(result)
    }

    pub async fn apply_redirect_rules(&self) -> Result<ActionReport> {
        let _guard = self.begin("apply_redirect_rules")?;
        let rules = self.load_redirects().await?;
        self.rules.update_redirect_rules(&rules.items).await?;
        log::info!("Updated {} redirect rules", rules.len());
        Ok(ActionReport::ok(format!(
            "Successfully saved and applied {} redirect rule(s)",
            rules.len()
        )))
    }
}

fn classify(error: String) -> Error {
    if error.contains("already exists") {
        Error::Uniqueness(error)
    } else {
        Error::Validation(error)
    }
}

fn accept_domain(checked: DomainValidation) -> Result<String> {
    match (checked.valid, checked.domain) {
        (true, Some(domain)) => Ok(domain),
        _ => Err(classify(checked.error.unwrap_or_else(|| "Invalid domain".to_string()))),
    }
}

fn accept_redirect(checked: RedirectValidation) -> Result<(String, String)> {
    match (checked.valid, checked.from_url, checked.to_url) {
        (true, Some(from), Some(to)) => Ok((from, to)),
        _ => Err(classify(checked.error.unwrap_or_else(|| "Invalid redirect rule".to_string()))),
    }
}
