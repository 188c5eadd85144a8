/// Tunable limits and palettes for the popup features
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub const ID_PLACEHOLDER: &str = "{id}";
pub const DEFAULT_EXPORT_FORMAT: &str = "<url>";

/// Offset applied to redirect rule ids so they never collide with block rules
pub const REDIRECT_RULE_ID_OFFSET: u32 = 100_000;

pub const INSTANCE_COLORS: [&str; 16] = [
    "#000000", "#42A5F5", "#66BB6A", "#EF5350", "#FFA726", "#AB47BC", "#26C6DA", "#EC407A",
    "#8D6E63", "#78909C", "#5C6BC0", "#FFEE58", "#D4E157", "#29B6F6", "#7E57C2", "#FFCA28",
];

pub const INSTANCE_ICONS: [&str; 10] = [
    "WorkspacesIcon",
    "WorkIcon",
    "HomeIcon",
    "SchoolIcon",
    "ShoppingCartIcon",
    "SportsEsportsIcon",
    "CodeIcon",
    "DesignServicesIcon",
    "MusicNoteIcon",
    "LocalCafeIcon",
];

pub const DEFAULT_INSTANCE_NAME: &str = "Untitled Instance";
pub const DEFAULT_INSTANCE_COLOR: &str = "#1976d2";
pub const DEFAULT_INSTANCE_ICON: &str = "WorkspacesIcon";

/// Limits applied by the session. Every field has a default, so a host can
/// override only what it cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Limits {
    pub max_urls: u64,
    pub generate_warning_threshold: usize,
    pub open_all_warning_threshold: usize,
    pub default_batch_size: usize,
    pub index_padding: usize,
    pub open_delay_ms: u32,
    pub min_name_length: usize,
}

impl Limits {
    pub fn from_json(json: &str) -> Result<Limits> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_urls: 10_000,
            generate_warning_threshold: 500,
            open_all_warning_threshold: 50,
            default_batch_size: 8,
            index_padding: 2,
            open_delay_ms: 50,
            min_name_length: 2,
        }
    }
}
