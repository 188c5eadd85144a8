/// Profiles: named snapshots of the feature settings and the active pointer
use serde_json::{Map, Value};

use crate::app_state::AppState;
use crate::error::{Error, Result};
use crate::host::{NetworkRuleProvider, TabProvider};
use crate::model::{BlockedDomain, Clock, Profile, RedirectRule};
use crate::report::ActionReport;
use crate::session::Session;
use crate::storage::{Collection, KeyValueStore, keys, load_collection, save_collection};
use crate::validators::{is_duplicate_name, validate_name};

impl<S, T, N, C> Session<S, T, N, C>
where
    S: KeyValueStore,
    T: TabProvider,
    N: NetworkRuleProvider,
    C: Clock,
{
    pub(crate) async fn load_profiles(&self) -> Result<Collection<Profile>> {
        load_collection(&self.store, keys::PROFILES, self.now()).await
    }

    pub async fn list_profiles(&self) -> Result<Vec<Profile>> {
        Ok(self.load_profiles().await?.items)
    }

    /// Insert or replace by id
    pub async fn save_profile(&self, profile: Profile) -> Result<()> {
        let _guard = self.begin("save_profile")?;
        let mut profiles = self.load_profiles().await?;
        profiles.upsert(profile, self.now());
        save_collection(&self.store, keys::PROFILES, &profiles).await
    }

    pub async fn delete_profile(&self, id: &str) -> Result<()> {
        let _guard = self.begin("delete_profile")?;
        let mut profiles = self.load_profiles().await?;
        if !profiles.remove(id) {
            return Err(Error::not_found("profile", id));
        }
        save_collection(&self.store, keys::PROFILES, &profiles).await?;

        if self.active_profile_pointer().as_deref() == Some(id) {
            log::info!("Deleted the active profile, clearing pointer");
            self.set_active_profile_pointer(None).await?;
        }
        Ok(())
    }

    /// The active profile, if the pointer still names an existing one
    pub async fn active_profile(&self) -> Result<Option<Profile>> {
        let Some(id) = self.active_profile_pointer() else {
            return Ok(None);
        };
        let profiles = self.load_profiles().await?;
        let found = profiles.get(&id).cloned();
        if found.is_none() {
            log::warn!("Active profile {} no longer exists", id);
        }
        Ok(found)
    }

    pub async fn active_profile_id(&self) -> Result<Option<String>> {
        Ok(self.active_profile().await?.map(|p| p.id))
    }

    /// Current state plus the block list and redirect rules, as stored in a
    /// profile's `data`
    pub async fn snapshot_settings(&self) -> Result<Value> {
        let mut data = match self.load_state().await?.to_value()? {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        data.insert(
            keys::BLOCKED_DOMAINS.to_string(),
            serde_json::to_value(&self.load_domains().await?.items)?,
        );
        data.insert(
            keys::REDIRECT_RULES.to_string(),
            serde_json::to_value(&self.load_redirects().await?.items)?,
        );
        Ok(Value::Object(data))
    }

    fn checked_profile_name(&self, name: &str, profiles: &Collection<Profile>, exclude_id: Option<&str>) -> Result<String> {
        let name = validate_name(name, "profile", self.limits.min_name_length).map_err(Error::Validation)?;
        let existing = profiles.items.iter().map(|p| (p.id.as_str(), p.name.as_str()));
        if is_duplicate_name(&name, existing, exclude_id) {
            return Err(Error::Uniqueness("A profile with this name already exists.".to_string()));
        }
        Ok(name)
    }

    /// Capture the current settings under a new name and make it active
    pub async fn create_profile(&self, name: &str, description: &str) -> Result<Profile> {
        let _guard = self.begin("create_profile")?;
        let mut profiles = self.load_profiles().await?;
        let name = self.checked_profile_name(name, &profiles, None)?;

        let mut profile = Profile::new(&name, self.snapshot_settings().await?, self.now());
        profile.description = description.trim().to_string();
        profiles.upsert(profile.clone(), self.now());
        save_collection(&self.store, keys::PROFILES, &profiles).await?;
        self.set_active_profile_pointer(Some(&profile.id)).await?;

        log::info!("Created profile {}", profile.name);
        Ok(profile)
    }

    pub async fn rename_profile(&self, id: &str, name: &str) -> Result<Profile> {
        let _guard = self.begin("rename_profile")?;
        let mut profiles = self.load_profiles().await?;
        let mut profile = profiles.get(id).cloned().ok_or_else(|| Error::not_found("profile", id))?;

        profile.name = self.checked_profile_name(name, &profiles, Some(id))?;
        profiles.upsert(profile, self.now());
        save_collection(&self.store, keys::PROFILES, &profiles).await?;
        profiles.get(id).cloned().ok_or_else(|| Error::not_found("profile", id))
    }

    /// Overwrite the active profile's data with the current settings
    pub async fn save_current_to_active(&self) -> Result<ActionReport> {
        let _guard = self.begin("save_current_to_active")?;
        let Some(mut profile) = self.active_profile().await? else {
            return Ok(ActionReport::failed("No active profile to save to"));
        };

        profile.data = self.snapshot_settings().await?;
        let name = profile.name.clone();
        let mut profiles = self.load_profiles().await?;
        profiles.upsert(profile, self.now());
        save_collection(&self.store, keys::PROFILES, &profiles).await?;
        Ok(ActionReport::ok(format!("Saved current settings to profile \"{name}\"")))
    }

    /// Load a profile's data into the working state and make it active.
    /// Network rules are re-applied best-effort.
    pub async fn switch_profile(&self, id: &str) -> Result<ActionReport> {
        let _guard = self.begin("switch_profile")?;
        let profiles = self.load_profiles().await?;
        let profile = profiles.get(id).ok_or_else(|| Error::not_found("profile", id))?;

        let now = self.now();
        let domains: Collection<BlockedDomain> = Collection::normalize(profile.data.get(keys::BLOCKED_DOMAINS), now);
        let redirects: Collection<RedirectRule> = Collection::normalize(profile.data.get(keys::REDIRECT_RULES), now);

        self.save_state(&AppState::normalize(Some(&profile.data))).await?;
        save_collection(&self.store, keys::BLOCKED_DOMAINS, &domains).await?;
        save_collection(&self.store, keys::REDIRECT_RULES, &redirects).await?;
        self.set_active_profile_pointer(Some(id)).await?;

        let mut message = format!("Switched to profile \"{}\"", profile.name);
        let applied = match self.rules.update_block_rules(&domains.items).await {
            Ok(()) => self.rules.update_redirect_rules(&redirects.items).await,
            Err(e) => Err(e),
        };
        if let Err(e) = applied {
            log::warn!("Profile {} loaded without network rules: {}", profile.name, e);
            message.push_str(&format!(" (rules not applied: {e})"));
        }

        log::info!("{}", message);
        Ok(ActionReport::ok(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::session;
    use serde_json::json;

    #[tokio::test]
    async fn test_saved_profile_data_round_trips() {
        let session = session();
        let data = json!({
            "urlPattern": "https://x.com/{id}",
            "nested": {"list": [1, 2, 3], "flag": true}
        });
        let profile = Profile::new("Work", data.clone(), session.now());
        let id = profile.id.clone();

        session.save_profile(profile).await.unwrap();

        let loaded = session.list_profiles().await.unwrap();
        let found = loaded.iter().find(|p| p.id == id).unwrap();
        assert_eq!(found.data, data);
    }

    #[tokio::test]
    async fn test_create_profile_snapshots_and_activates() {
        let session = session();
        session.add_blocked_domain("a.com").await.unwrap();
        session.generate_urls("https://x.com/{id}", "1", "3", false).await.unwrap();

        let profile = session.create_profile("  Work ", "daily").await.unwrap();

        assert_eq!(profile.name, "Work");
        assert_eq!(profile.description, "daily");
        assert_eq!(profile.data["generatedUrls"].as_array().unwrap().len(), 3);
        assert_eq!(profile.data["blockedDomains"][0]["domain"], "a.com");
        assert_eq!(session.active_profile_id().await.unwrap(), Some(profile.id));
    }

    #[tokio::test]
    async fn test_profile_name_rules() {
        let session = session();
        session.create_profile("Work", "").await.unwrap();

        assert!(matches!(session.create_profile("W", "").await, Err(Error::Validation(_))));
        assert!(matches!(session.create_profile("work", "").await, Err(Error::Uniqueness(_))));
    }

    #[tokio::test]
    async fn test_rename_excludes_itself() {
        let session = session();
        let work = session.create_profile("Work", "").await.unwrap();
        session.create_profile("Home", "").await.unwrap();

        let renamed = session.rename_profile(&work.id, "WORK").await.unwrap();
        assert_eq!(renamed.name, "WORK");
        assert!(renamed.modified_at > work.modified_at);

        assert!(matches!(session.rename_profile(&work.id, "home").await, Err(Error::Uniqueness(_))));
        assert!(matches!(session.rename_profile("missing", "Other").await, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_clears_active_pointer() {
        let session = session();
        let work = session.create_profile("Work", "").await.unwrap();
        let home = session.create_profile("Home", "").await.unwrap();

        session.delete_profile(&work.id).await.unwrap();
        assert_eq!(session.active_profile_id().await.unwrap(), Some(home.id.clone()));

        session.delete_profile(&home.id).await.unwrap();
        assert_eq!(session.active_profile_id().await.unwrap(), None);
        assert_eq!(session.store().snapshot(keys::ACTIVE_PROFILE), Some(Value::Null));
    }

    #[tokio::test]
    async fn test_dangling_pointer_reads_as_none() {
        let session = session();
        session.set_active_profile_pointer(Some("gone")).await.unwrap();
        assert!(session.active_profile().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_switch_restores_settings_and_rules() {
        let session = session();
        session.add_blocked_domain("work.com").await.unwrap();
        session.set_export_format("<id> <url>").await.unwrap();
        let work = session.create_profile("Work", "").await.unwrap();

        session.clear_blocked_domains().await.unwrap();
        session.set_export_format("<url>").await.unwrap();
        session.create_profile("Empty", "").await.unwrap();

        let report = session.switch_profile(&work.id).await.unwrap();

        assert!(report.success);
        assert_eq!(report.message, "Switched to profile \"Work\"");
        assert_eq!(session.load_state().await.unwrap().export_format, "<id> <url>");
        assert_eq!(session.list_blocked_domains().await.unwrap()[0].domain, "work.com");
        assert_eq!(session.rules().block_filters.borrow().len(), 2);
        assert_eq!(session.active_profile_id().await.unwrap(), Some(work.id));
    }

    #[tokio::test]
    async fn test_switch_without_rule_host_still_loads() {
        let session = session();
        let work = session.create_profile("Work", "").await.unwrap();
        session.rules().unavailable.set(true);

        let report = session.switch_profile(&work.id).await.unwrap();
        assert!(report.success);
        assert!(report.message.contains("rules not applied"));
    }

    #[tokio::test]
    async fn test_save_current_to_active() {
        let session = session();
        assert!(!session.save_current_to_active().await.unwrap().success);

        let work = session.create_profile("Work", "").await.unwrap();
        session.add_blocked_domain("later.com").await.unwrap();

        let report = session.save_current_to_active().await.unwrap();
        assert!(report.success);

        let saved = session.active_profile().await.unwrap().unwrap();
        assert_eq!(saved.id, work.id);
        assert_eq!(saved.data["blockedDomains"][0]["domain"], "later.com");
    }
}
