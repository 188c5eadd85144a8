/// Tab extractor: filter the open tabs, pick a subset and render it as text
use std::collections::HashSet;

use serde::Serialize;

use crate::error::Result;
use crate::export_format::ExportFormatProcessor;
use crate::host::{NetworkRuleProvider, TabProvider};
use crate::model::Clock;
use crate::session::Session;
use crate::storage::KeyValueStore;
use crate::tab_data::TabInfo;

/// Tabs whose URL contains `query`, ignoring case. A blank query keeps all.
pub fn filter_tabs<'a>(tabs: &'a [TabInfo], query: &str) -> Vec<&'a TabInfo> {
    let query = query.trim().to_lowercase();
    tabs.iter()
        .filter(|tab| query.is_empty() || tab.url.to_lowercase().contains(&query))
        .collect()
}

/// Set of selected tab ids
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabSelection {
    ids: HashSet<i32>,
}

impl TabSelection {
    /// Everything selected, the state the extractor opens with
    pub fn all(tabs: &[TabInfo]) -> Self {
        TabSelection {
            ids: tabs.iter().map(|t| t.id).collect(),
        }
    }

    pub fn is_selected(&self, id: i32) -> bool {
        self.ids.contains(&id)
    }

    pub fn toggle(&mut self, id: i32) {
        if !self.ids.remove(&id) {
            self.ids.insert(id);
        }
    }

    /// Select every visible tab, or clear them all when they already are
    pub fn toggle_all(&mut self, visible: &[&TabInfo]) {
        if self.all_selected(visible) {
            self.clear(visible);
        } else {
            self.select(visible);
        }
    }

    pub fn select(&mut self, visible: &[&TabInfo]) {
        self.ids.extend(visible.iter().map(|t| t.id));
    }

    /// Deselect the visible tabs; hidden ones keep their state
    pub fn clear(&mut self, visible: &[&TabInfo]) {
        for tab in visible {
            self.ids.remove(&tab.id);
        }
    }

    pub fn all_selected(&self, visible: &[&TabInfo]) -> bool {
        !visible.is_empty() && visible.iter().all(|t| self.is_selected(t.id))
    }

    pub fn count_in(&self, visible: &[&TabInfo]) -> usize {
        visible.iter().filter(|t| self.is_selected(t.id)).count()
    }

    /// Selected tabs with a URL, in window order
    pub fn selected<'a>(&self, tabs: &'a [TabInfo]) -> Vec<&'a TabInfo> {
        tabs.iter()
            .filter(|t| self.is_selected(t.id) && !t.url.is_empty())
            .collect()
    }
}

/// The extractor screen: the window's tabs, the URL filter and the selection
#[derive(Debug, Clone, Default)]
pub struct ExtractorView {
    tabs: Vec<TabInfo>,
    query: String,
    selection: TabSelection,
}

/// One visible line of the extractor list
#[derive(Debug, Serialize)]
pub struct ExtractorRow<'a> {
    #[serde(flatten)]
    pub tab: &'a TabInfo,
    pub selected: bool,
}

impl ExtractorView {
    pub fn new(tabs: Vec<TabInfo>) -> Self {
        let selection = TabSelection::all(&tabs);
        ExtractorView {
            tabs,
            query: String::new(),
            selection,
        }
    }

    pub fn set_query(&mut self, query: &str) {
        self.query = query.to_string();
    }

    pub fn rows(&self) -> Vec<ExtractorRow<'_>> {
        filter_tabs(&self.tabs, &self.query)
            .into_iter()
            .map(|tab| ExtractorRow {
                tab,
                selected: self.selection.is_selected(tab.id),
            })
            .collect()
    }

    pub fn toggle(&mut self, id: i32) {
        self.selection.toggle(id);
    }

    pub fn toggle_all(&mut self) {
        let visible = filter_tabs(&self.tabs, &self.query);
        self.selection.toggle_all(&visible);
    }

    pub fn select_visible(&mut self) {
        let visible = filter_tabs(&self.tabs, &self.query);
        self.selection.select(&visible);
    }

    pub fn clear_visible(&mut self) {
        let visible = filter_tabs(&self.tabs, &self.query);
        self.selection.clear(&visible);
    }

    pub fn all_visible_selected(&self) -> bool {
        self.selection.all_selected(&filter_tabs(&self.tabs, &self.query))
    }

    /// (selected visible, visible)
    pub fn counts(&self) -> (usize, usize) {
        let visible = filter_tabs(&self.tabs, &self.query);
        (self.selection.count_in(&visible), visible.len())
    }

    /// Every selected tab, hidden by the filter or not
    pub fn export(&self, processor: &ExportFormatProcessor, template: &str) -> Vec<String> {
        export_lines(processor, template, &self.tabs, &self.selection)
    }
}

/// Render the selected tabs with `template`
pub fn export_lines(processor: &ExportFormatProcessor, template: &str, tabs: &[TabInfo], selection: &TabSelection) -> Vec<String> {
    let selected: Vec<TabInfo> = selection.selected(tabs).into_iter().cloned().collect();
    processor.process(template, &selected)
}

impl<S, T, N, C> Session<S, T, N, C>
where
    S: KeyValueStore,
    T: TabProvider,
    N: NetworkRuleProvider,
    C: Clock,
{
    /// Web tabs of the current window, in window order
    pub async fn current_tabs(&self) -> Result<Vec<TabInfo>> {
        let mut tabs = self.tabs.query_current_window_tabs().await?;
        tabs.retain(TabInfo::is_web_page);
        tabs.sort_by_key(|t| t.index);
        Ok(tabs)
    }

    /// Selected tabs rendered with the saved export format, one per line
    pub async fn export_selected(&self, tabs: &[TabInfo], selection: &TabSelection) -> Result<String> {
        let state = self.load_state().await?;
        let processor = ExportFormatProcessor::with_padding(self.limits.index_padding);
        Ok(export_lines(&processor, &state.export_format, tabs, selection).join("\n"))
    }

    /// Extractor over the current window, everything selected
    pub async fn open_extractor(&self) -> Result<ExtractorView> {
        Ok(ExtractorView::new(self.current_tabs().await?))
    }

    pub async fn export_view(&self, view: &ExtractorView) -> Result<String> {
        let state = self.load_state().await?;
        let processor = ExportFormatProcessor::with_padding(self.limits.index_padding);
        Ok(view.export(&processor, &state.export_format).join("\n"))
    }
}
