/// The popup session: collaborators, limits, pointers and the in-flight guard
///
/// Every feature module adds its operations to `Session` in its own `impl`
/// block. Mutating operations take the in-flight guard first, so a second
/// call made while one is still awaiting fails with `Error::Busy` instead of
/// interleaving two read-modify-write cycles on the store.
use std::cell::{Cell, RefCell};

use time::OffsetDateTime;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::host::{NetworkRuleProvider, TabProvider};
use crate::model::{Clock, SystemClock};
use crate::storage::{KeyValueStore, keys, load_pointer, save_pointer};

pub struct Session<S, T, N, C = SystemClock> {
    pub(crate) store: S,
    pub(crate) tabs: T,
    pub(crate) rules: N,
    pub(crate) clock: C,
    pub(crate) limits: Limits,
    active_profile: RefCell<Option<String>>,
    current_instance: RefCell<Option<String>>,
    in_flight: Cell<Option<&'static str>>,
}

/// Held for the duration of one mutating operation
pub(crate) struct InFlight<'a> {
    slot: &'a Cell<Option<&'static str>>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.slot.set(None);
    }
}

impl<S, T, N, C> Session<S, T, N, C>
where
    S: KeyValueStore,
    T: TabProvider,
    N: NetworkRuleProvider,
    C: Clock,
{
    /// A session with no pointers loaded; see `restore`
    pub fn new(store: S, tabs: T, rules: N, clock: C, limits: Limits) -> Self {
        Session {
            store,
            tabs,
            rules,
            clock,
            limits,
            active_profile: RefCell::new(None),
            current_instance: RefCell::new(None),
            in_flight: Cell::new(None),
        }
    }

    /// Build a session and load the persisted pointers
    pub async fn restore(store: S, tabs: T, rules: N, clock: C, limits: Limits) -> Result<Self> {
        let session = Session::new(store, tabs, rules, clock, limits);
        let active = load_pointer(&session.store, keys::ACTIVE_PROFILE).await?;
        let current = load_pointer(&session.store, keys::CURRENT_INSTANCE).await?;
        log::debug!("Restored session: active profile {:?}, current instance {:?}", active, current);
        *session.active_profile.borrow_mut() = active;
        *session.current_instance.borrow_mut() = current;
        Ok(session)
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn tabs(&self) -> &T {
        &self.tabs
    }

    pub fn rules(&self) -> &N {
        &self.rules
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.get().is_some()
    }

    pub(crate) fn begin(&self, operation: &'static str) -> Result<InFlight<'_>> {
        if let Some(running) = self.in_flight.get() {
            log::warn!("Rejected {} while {} is in progress", operation, running);
            return Err(Error::Busy);
        }
        self.in_flight.set(Some(operation));
        Ok(InFlight { slot: &self.in_flight })
    }

    pub(crate) fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }

    pub(crate) fn active_profile_pointer(&self) -> Option<String> {
        self.active_profile.borrow().clone()
    }

    pub(crate) async fn set_active_profile_pointer(&self, id: Option<&str>) -> Result<()> {
        save_pointer(&self.store, keys::ACTIVE_PROFILE, id).await?;
        *self.active_profile.borrow_mut() = id.map(str::to_string);
        Ok(())
    }

    pub(crate) fn current_instance_pointer(&self) -> Option<String> {
        self.current_instance.borrow().clone()
    }

    pub(crate) async fn set_current_instance_pointer(&self, id: Option<&str>) -> Result<()> {
        save_pointer(&self.store, keys::CURRENT_INSTANCE, id).await?;
        *self.current_instance.borrow_mut() = id.map(str::to_string);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::InstanceOptions;
    use crate::storage::MemoryStore;
    use crate::testing::{MockRules, MockTabs, StepClock, session, yielding_session};

    #[test]
    fn test_guard_rejects_reentry() {
        let session = session();

        let guard = session.begin("save").unwrap();
        assert!(session.is_busy());
        assert!(matches!(session.begin("save"), Err(Error::Busy)));

        drop(guard);
        assert!(!session.is_busy());
        assert!(session.begin("save").is_ok());
    }

    #[tokio::test]
    async fn test_overlapping_operations_rejected() {
        let session = yielding_session(&["https://a.com"]);
        let options = InstanceOptions {
            name: Some("Work".to_string()),
            ..InstanceOptions::default()
        };

        let (profile, instance) = tokio::join!(
            session.create_profile("One", ""),
            session.create_instance(&options, true)
        );

        assert!(profile.is_ok());
        assert!(matches!(instance, Err(Error::Busy)));
        assert!(!session.is_busy());

        // once the first finishes the session accepts work again
        assert!(session.create_instance(&options, true).await.is_ok());
        assert_eq!(session.list_profiles().await.unwrap().len(), 1);
        assert_eq!(session.list_instances().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restore_loads_pointers() {
        let store = MemoryStore::new();
        save_pointer(&store, keys::ACTIVE_PROFILE, Some("p1")).await.unwrap();
        save_pointer(&store, keys::CURRENT_INSTANCE, Some("i1")).await.unwrap();

        let session = Session::restore(
            store,
            MockTabs::new(vec![]),
            MockRules::default(),
            StepClock::new(),
            Limits::default(),
        )
        .await
        .unwrap();

        assert_eq!(session.active_profile_pointer().as_deref(), Some("p1"));
        assert_eq!(session.current_instance_pointer().as_deref(), Some("i1"));
    }

    #[tokio::test]
    async fn test_pointer_write_failure_keeps_old_value() {
        let session = session();
        session.set_active_profile_pointer(Some("p1")).await.unwrap();

        session.store().set_read_only(true);
        assert!(session.set_active_profile_pointer(Some("p2")).await.is_err());
        assert_eq!(session.active_profile_pointer().as_deref(), Some("p1"));
    }
}
