/// Test doubles for the host collaborators
use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use serde_json::Value;
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::host::{NetworkRuleProvider, TabProvider, build_block_rules, build_redirect_rules};
use crate::model::{BlockedDomain, Clock, RedirectRule};
use crate::session::Session;
use crate::storage::{KeyValueStore, MemoryStore};
use crate::tab_data::TabInfo;

/// Clock that advances one minute every time it is read
pub struct StepClock {
    next: Cell<OffsetDateTime>,
}

impl StepClock {
    pub fn new() -> Self {
        StepClock {
            next: Cell::new(datetime!(2024-05-01 9:00 UTC)),
        }
    }
}

impl Clock for StepClock {
    fn now(&self) -> OffsetDateTime {
        let now = self.next.get();
        self.next.set(now + Duration::minutes(1));
        now
    }
}

/// Window whose live tabs are fixed by the test; records what was opened
pub struct MockTabs {
    live: RefCell<Vec<TabInfo>>,
    created: RefCell<Vec<String>>,
    closed: RefCell<Vec<i32>>,
    failing: RefCell<HashSet<String>>,
}

impl MockTabs {
    pub fn new(live: Vec<TabInfo>) -> Self {
        MockTabs {
            live: RefCell::new(live),
            created: RefCell::new(Vec::new()),
            closed: RefCell::new(Vec::new()),
            failing: RefCell::new(HashSet::new()),
        }
    }

    pub fn with_urls(urls: &[&str]) -> Self {
        let live = urls
            .iter()
            .enumerate()
            .map(|(i, url)| TabInfo::new(i as i32 + 1, url.to_string(), format!("Tab {}", i + 1), None, i as i32))
            .collect();
        MockTabs::new(live)
    }

    pub fn set_live(&self, live: Vec<TabInfo>) {
        *self.live.borrow_mut() = live;
    }

    pub fn fail_on(&self, url: &str) {
        self.failing.borrow_mut().insert(url.to_string());
    }

    pub fn created(&self) -> Vec<String> {
        self.created.borrow().clone()
    }

    pub fn closed(&self) -> Vec<i32> {
        self.closed.borrow().clone()
    }
}

impl TabProvider for MockTabs {
    async fn query_current_window_tabs(&self) -> Result<Vec<TabInfo>> {
        Ok(self.live.borrow().clone())
    }

    async fn create_tab(&self, url: &str, _active: bool) -> Result<()> {
        if self.failing.borrow().contains(url) {
            return Err(Error::Host(format!("cannot open {url}")));
        }
        self.created.borrow_mut().push(url.to_string());
        Ok(())
    }

    async fn close_tabs(&self, ids: &[i32]) -> Result<()> {
        self.closed.borrow_mut().extend_from_slice(ids);
        Ok(())
    }
}

/// Records the rule sets pushed to it
#[derive(Default)]
pub struct MockRules {
    pub block_filters: RefCell<Vec<String>>,
    pub redirect_filters: RefCell<Vec<String>>,
    pub unavailable: Cell<bool>,
}

impl NetworkRuleProvider for MockRules {
    async fn update_block_rules(&self, domains: &[BlockedDomain]) -> Result<()> {
        if self.unavailable.get() {
            return Err(Error::CollaboratorUnavailable("chrome.declarativeNetRequest"));
        }
        *self.block_filters.borrow_mut() = build_block_rules(domains)
            .into_iter()
            .map(|r| r.condition.url_filter)
            .collect();
        Ok(())
    }

    async fn update_redirect_rules(&self, rules: &[RedirectRule]) -> Result<()> {
        if self.unavailable.get() {
            return Err(Error::CollaboratorUnavailable("chrome.declarativeNetRequest"));
        }
        *self.redirect_filters.borrow_mut() = build_redirect_rules(rules)
            .into_iter()
            .map(|r| r.condition.url_filter)
            .collect();
        Ok(())
    }
}

/// `MemoryStore` whose operations suspend once before completing, like a
/// real host store does
#[derive(Default)]
pub struct YieldingStore {
    inner: MemoryStore,
}

impl KeyValueStore for YieldingStore {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        tokio::task::yield_now().await;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        tokio::task::yield_now().await;
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        tokio::task::yield_now().await;
        self.inner.remove(key).await
    }
}

pub fn yielding_session(urls: &[&str]) -> Session<YieldingStore, MockTabs, MockRules, StepClock> {
    let limits = Limits {
        open_delay_ms: 0,
        ..Limits::default()
    };
    Session::new(YieldingStore::default(), MockTabs::with_urls(urls), MockRules::default(), StepClock::new(), limits)
}

pub type TestSession = Session<MemoryStore, MockTabs, MockRules, StepClock>;

pub fn session_with_tabs(urls: &[&str]) -> TestSession {
    let limits = Limits {
        open_delay_ms: 0,
        ..Limits::default()
    };
    Session::new(MemoryStore::new(), MockTabs::with_urls(urls), MockRules::default(), StepClock::new(), limits)
}

pub fn session() -> TestSession {
    session_with_tabs(&[])
}
