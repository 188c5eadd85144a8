/// Instances: named tab-set snapshots that can be saved from and opened into
/// the current window
use crate::error::{Error, Result};
use crate::host::{NetworkRuleProvider, TabProvider};
use crate::model::{Clock, Instance, InstanceOptions};
use crate::report::ActionReport;
use crate::session::Session;
use crate::storage::{Collection, KeyValueStore, keys, load_collection, save_collection};
use crate::tab_data::InstanceTab;
use crate::validators::validate_instance;

impl<S, T, N, C> Session<S, T, N, C>
where
    S: KeyValueStore,
    T: TabProvider,
    N: NetworkRuleProvider,
    C: Clock,
{
    async fn load_instances(&self) -> Result<Collection<Instance>> {
        load_collection(&self.store, keys::INSTANCES, self.now()).await
    }

    async fn live_tabs(&self) -> Result<Vec<InstanceTab>> {
        let tabs = self.tabs.query_current_window_tabs().await?;
        Ok(tabs.iter().map(InstanceTab::from).collect())
    }

    fn check_instance(&self, instance: &Instance) -> Result<()> {
        let errors = validate_instance(&instance.name, &instance.color, &instance.icon, self.limits.min_name_length);
        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(errors.join(" ")))
        }
    }

    pub async fn list_instances(&self) -> Result<Vec<Instance>> {
        Ok(self.load_instances().await?.items)
    }

    /// Insert or replace by id; a replaced instance gets a fresh `modifiedAt`
    pub async fn save_instance(&self, instance: Instance) -> Result<()> {
        let _guard = self.begin("save_instance")?;
        let mut instances = self.load_instances().await?;
        instances.upsert(instance, self.now());
        save_collection(&self.store, keys::INSTANCES, &instances).await
    }

    pub async fn delete_instance(&self, id: &str) -> Result<()> {
        let _guard = self.begin("delete_instance")?;
        let mut instances = self.load_instances().await?;
        if !instances.remove(id) {
            return Err(Error::not_found("instance", id));
        }
        save_collection(&self.store, keys::INSTANCES, &instances).await?;

        if self.current_instance_pointer().as_deref() == Some(id) {
            self.set_current_instance_pointer(None).await?;
        }
        Ok(())
    }

    /// New instance, optionally seeded with the tabs of the current window
    pub async fn create_instance(&self, options: &InstanceOptions, with_current_tabs: bool) -> Result<Instance> {
        let _guard = self.begin("create_instance")?;
        let mut instance = Instance::new(options, self.now());
        self.check_instance(&instance)?;

        if with_current_tabs {
            instance.tabs = self.live_tabs().await?;
            instance.last_saved_at = Some(self.now());
        }

        let mut instances = self.load_instances().await?;
        instances.upsert(instance.clone(), self.now());
        save_collection(&self.store, keys::INSTANCES, &instances).await?;
        log::info!("Created instance {} with {} tab(s)", instance.name, instance.tabs.len());
        Ok(instance)
    }

    /// Change name, colour or icon; fields left `None` are kept
    pub async fn edit_instance(&self, id: &str, options: &InstanceOptions) -> Result<Instance> {
        let _guard = self.begin("edit_instance")?;
        let mut instances = self.load_instances().await?;
        let mut instance = instances.get(id).cloned().ok_or_else(|| Error::not_found("instance", id))?;

        if let Some(name) = &options.name {
            instance.name = name.trim().to_string();
        }
        if let Some(color) = &options.color {
            instance.color = color.clone();
        }
        if let Some(icon) = &options.icon {
            instance.icon = icon.clone();
        }
        self.check_instance(&instance)?;

        instances.upsert(instance, self.now());
        save_collection(&self.store, keys::INSTANCES, &instances).await?;
        instances.get(id).cloned().ok_or_else(|| Error::not_found("instance", id))
    }

    async fn capture_tabs_into(&self, id: &str) -> Result<ActionReport> {
        let mut instances = self.load_instances().await?;
        if !instances.contains(id) {
            return Err(Error::not_found("instance", id));
        }

        let tabs = self.live_tabs().await?;
        if tabs.is_empty() {
            return Ok(ActionReport::failed("No tabs to save"));
        }

        let count = tabs.len();
        let now = self.now();
        if let Some(instance) = instances.get_mut(id) {
            instance.tabs = tabs;
            instance.last_saved_at = Some(now);
            instance.modified_at = now;
        }
        save_collection(&self.store, keys::INSTANCES, &instances).await?;

        log::info!("Saved {} tab(s) to instance {}", count, id);
        Ok(ActionReport::ok(format!("Saved {count} tab(s) to instance")).with_tabs(count))
    }

    /// Replace the instance's tabs with the current window's
    pub async fn save_current_tabs_to_instance(&self, id: &str) -> Result<ActionReport> {
        let _guard = self.begin("save_current_tabs_to_instance")?;
        self.capture_tabs_into(id).await
    }

    /// Same, targeting the current instance
    pub async fn save_current_tabs(&self) -> Result<ActionReport> {
        let _guard = self.begin("save_current_tabs")?;
        match self.current_instance_pointer() {
            Some(id) => self.capture_tabs_into(&id).await,
            None => Ok(ActionReport::failed("No current instance selected")),
        }
    }

    /// Load the instance's tabs into the window. Without `append` the other
    /// tabs of the window are closed first, so callers confirm beforehand.
    pub async fn open_instance_tabs(&self, id: &str, append: bool) -> Result<ActionReport> {
        let _guard = self.begin("open_instance_tabs")?;
        let mut instances = self.load_instances().await?;
        let instance = instances.get(id).ok_or_else(|| Error::not_found("instance", id))?;

        if instance.tabs.is_empty() {
            return Ok(ActionReport::failed("Instance has no tabs to open"));
        }
        let count = instance.tabs.len();

        if let Err(e) = self.tabs.create_tabs(&instance.tabs, append).await {
            log::error!("Error opening instance tabs: {}", e);
            return Ok(ActionReport::failed(e.to_string()));
        }

        let now = self.now();
        if let Some(instance) = instances.get_mut(id) {
            instance.last_opened_at = Some(now);
            instance.modified_at = now;
        }
        save_collection(&self.store, keys::INSTANCES, &instances).await?;

        let message = if append {
            format!("Appended {count} tab(s) from instance")
        } else {
            format!("Opened {count} tab(s) from instance")
        };
        Ok(ActionReport::ok(message).with_tabs(count))
    }

    /// First run: with no instances stored, create `Default` from the
    /// current window. Returns the instance when one was created.
    pub async fn initialize_instances(&self) -> Result<Option<Instance>> {
        let _guard = self.begin("initialize_instances")?;
        let mut instances = self.load_instances().await?;
        if !instances.is_empty() {
            return Ok(None);
        }

        let options = InstanceOptions {
            name: Some("Default".to_string()),
            ..InstanceOptions::default()
        };
        let mut instance = Instance::new(&options, self.now());
        instance.tabs = self.live_tabs().await?;
        instance.last_saved_at = Some(self.now());

        instances.upsert(instance.clone(), self.now());
        save_collection(&self.store, keys::INSTANCES, &instances).await?;
        log::info!("Initialized default instance with {} tab(s)", instance.tabs.len());
        Ok(Some(instance))
    }

    pub async fn set_current_instance(&self, id: Option<&str>) -> Result<()> {
        if let Some(id) = id {
            if !self.load_instances().await?.contains(id) {
                return Err(Error::not_found("instance", id));
            }
        }
        self.set_current_instance_pointer(id).await
    }

    /// The current instance, if the pointer still names an existing one
    pub async fn current_instance(&self) -> Result<Option<Instance>> {
        let Some(id) = self.current_instance_pointer() else {
            return Ok(None);
        };
        Ok(self.load_instances().await?.get(&id).cloned())
    }

    pub async fn current_instance_id(&self) -> Result<Option<String>> {
        Ok(self.current_instance().await?.map(|i| i.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_INSTANCE_COLOR;
    use crate::model::{most_recently_opened, most_recently_saved};
    use crate::tab_data::TabInfo;
    use crate::testing::{session, session_with_tabs};

    fn named(name: &str) -> InstanceOptions {
        InstanceOptions {
            name: Some(name.to_string()),
            ..InstanceOptions::default()
        }
    }

    #[tokio::test]
    async fn test_create_empty_instance() {
        let session = session_with_tabs(&["https://a.com"]);

        let instance = session.create_instance(&named("Research"), false).await.unwrap();

        assert!(instance.tabs.is_empty());
        assert_eq!(instance.last_saved_at, None);
        assert_eq!(instance.color, DEFAULT_INSTANCE_COLOR);
        assert_eq!(session.list_instances().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_create_with_current_tabs() {
        let session = session_with_tabs(&["https://a.com", "https://b.com"]);

        let instance = session.create_instance(&named("Research"), true).await.unwrap();

        assert_eq!(instance.tabs.len(), 2);
        assert_eq!(instance.tabs[1].url, "https://b.com");
        assert!(instance.last_saved_at.is_some());
    }

    #[tokio::test]
    async fn test_create_rejects_bad_fields() {
        let session = session();
        let options = InstanceOptions {
            name: Some("R".to_string()),
            color: Some("red".to_string()),
            icon: None,
        };

        let err = session.create_instance(&options, false).await.unwrap_err();
        let Error::Validation(message) = err else {
            panic!("expected a validation error");
        };
        assert!(message.contains("at least 2 characters"));
        assert!(message.contains("hex color"));
        assert!(session.list_instances().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_instance_keeps_unset_fields() {
        let session = session();
        let created = session.create_instance(&named("Research"), false).await.unwrap();

        let edited = session
            .edit_instance(
                &created.id,
                &InstanceOptions {
                    icon: Some("CodeIcon".to_string()),
                    ..InstanceOptions::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(edited.name, "Research");
        assert_eq!(edited.icon, "CodeIcon");
        assert!(edited.modified_at > created.modified_at);
    }

    #[tokio::test]
    async fn test_save_current_tabs_to_instance() {
        let session = session_with_tabs(&["https://a.com"]);
        let instance = session.create_instance(&named("Research"), false).await.unwrap();

        let report = session.save_current_tabs_to_instance(&instance.id).await.unwrap();
        assert!(report.success);
        assert_eq!(report.message, "Saved 1 tab(s) to instance");
        assert_eq!(report.tab_count, Some(1));

        let stored = &session.list_instances().await.unwrap()[0];
        assert_eq!(stored.tabs[0].url, "https://a.com");
        assert!(stored.last_saved_at.is_some());

        session.tabs().set_live(vec![
            TabInfo::new(7, "https://x.com".to_string(), String::new(), Some(2), 0),
            TabInfo::new(8, "https://y.com".to_string(), "Y".to_string(), None, 1),
        ]);
        session.save_current_tabs_to_instance(&instance.id).await.unwrap();

        let replaced = &session.list_instances().await.unwrap()[0];
        assert_eq!(replaced.tabs.len(), 2);
        assert_eq!(replaced.tabs[0].title, "Untitled");
        assert_eq!(replaced.tabs[0].group_id, Some(2));
        assert!(replaced.last_saved_at > stored.last_saved_at);
    }

    #[tokio::test]
    async fn test_save_current_tabs_failures() {
        let session = session();
        let instance = session.create_instance(&named("Research"), false).await.unwrap();

        let empty = session.save_current_tabs_to_instance(&instance.id).await.unwrap();
        assert!(!empty.success);
        assert_eq!(empty.message, "No tabs to save");
        assert_eq!(session.list_instances().await.unwrap()[0].last_saved_at, None);

        let missing = session.save_current_tabs_to_instance("nope").await.unwrap_err();
        assert!(matches!(missing, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_open_instance_replaces_window() {
        let session = session_with_tabs(&["https://a.com", "https://b.com", "https://c.com"]);
        let instance = session.create_instance(&named("Research"), true).await.unwrap();

        let report = session.open_instance_tabs(&instance.id, false).await.unwrap();

        assert_eq!(report.message, "Opened 3 tab(s) from instance");
        assert_eq!(session.tabs().closed(), vec![2, 3]);
        assert_eq!(session.tabs().created().len(), 3);
        assert!(session.list_instances().await.unwrap()[0].last_opened_at.is_some());
    }

    #[tokio::test]
    async fn test_open_instance_append_and_empty() {
        let session = session_with_tabs(&["https://a.com"]);
        let full = session.create_instance(&named("Full"), true).await.unwrap();
        let empty = session.create_instance(&named("Empty"), false).await.unwrap();

        let appended = session.open_instance_tabs(&full.id, true).await.unwrap();
        assert_eq!(appended.message, "Appended 1 tab(s) from instance");
        assert!(session.tabs().closed().is_empty());

        let nothing = session.open_instance_tabs(&empty.id, true).await.unwrap();
        assert!(!nothing.success);
        assert_eq!(nothing.message, "Instance has no tabs to open");
    }

    #[tokio::test]
    async fn test_failed_open_does_not_stamp() {
        let session = session_with_tabs(&["https://a.com"]);
        let instance = session.create_instance(&named("Research"), true).await.unwrap();
        session.tabs().fail_on("https://a.com");

        let report = session.open_instance_tabs(&instance.id, true).await.unwrap();

        assert!(!report.success);
        assert_eq!(session.list_instances().await.unwrap()[0].last_opened_at, None);
    }

    #[tokio::test]
    async fn test_recent_instances_follow_actions() {
        let session = session_with_tabs(&["https://a.com"]);
        let first = session.create_instance(&named("First"), true).await.unwrap();
        let second = session.create_instance(&named("Second"), true).await.unwrap();

        session.open_instance_tabs(&first.id, true).await.unwrap();
        session.save_current_tabs_to_instance(&first.id).await.unwrap();
        session.open_instance_tabs(&second.id, true).await.unwrap();

        let instances = session.list_instances().await.unwrap();
        assert_eq!(most_recently_saved(&instances).unwrap().id, first.id);
        assert_eq!(most_recently_opened(&instances).unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_initialize_once() {
        let session = session_with_tabs(&["https://a.com", "https://b.com"]);

        let created = session.initialize_instances().await.unwrap().unwrap();
        assert_eq!(created.name, "Default");
        assert_eq!(created.tabs.len(), 2);
        assert!(created.last_saved_at.is_some());

        assert!(session.initialize_instances().await.unwrap().is_none());
        assert_eq!(session.list_instances().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_current_instance_pointer() {
        let session = session_with_tabs(&["https://a.com"]);
        let instance = session.create_instance(&named("Research"), false).await.unwrap();

        assert!(!session.save_current_tabs().await.unwrap().success);
        assert!(matches!(session.set_current_instance(Some("nope")).await, Err(Error::NotFound { .. })));

        session.set_current_instance(Some(&instance.id)).await.unwrap();
        assert!(session.save_current_tabs().await.unwrap().success);
        assert_eq!(session.current_instance().await.unwrap().unwrap().tabs.len(), 1);

        session.delete_instance(&instance.id).await.unwrap();
        assert_eq!(session.current_instance_id().await.unwrap(), None);
        assert_eq!(session.store().snapshot(keys::CURRENT_INSTANCE), Some(serde_json::Value::Null));
    }
}
