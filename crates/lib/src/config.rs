//! View configuration.

use serde::{Deserialize, Serialize};

/// Default name for the dedicated writer thread.
pub const DEFAULT_WRITER_THREAD_NAME: &str = "sortview-writer";

/// Behaviour switches for a [`ViewState`](crate::ViewState).
///
/// Every field has a default, so a partial JSON document is a valid config:
///
/// ```
/// use sortview::ViewConfig;
///
/// let config: ViewConfig = serde_json::from_str(r#"{ "live_filtering": false }"#).unwrap();
/// assert!(config.live_sorting);
/// assert!(!config.live_filtering);
/// assert_eq!(config.writer_thread_name, "sortview-writer");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Reposition items when a sort field changes
    pub live_sorting: bool,
    /// Re-test items when a filter field changes
    pub live_filtering: bool,
    /// Thread name used by [`LiveView::spawn_thread`](crate::LiveView::spawn_thread)
    pub writer_thread_name: String,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            live_sorting: true,
            live_filtering: true,
            writer_thread_name: DEFAULT_WRITER_THREAD_NAME.to_string(),
        }
    }
}

impl ViewConfig {
    pub fn with_live_sorting(mut self, enabled: bool) -> Self {
        self.live_sorting = enabled;
        self
    }

    pub fn with_live_filtering(mut self, enabled: bool) -> Self {
        self.live_filtering = enabled;
        self
    }

    pub fn with_writer_thread_name(mut self, name: impl Into<String>) -> Self {
        self.writer_thread_name = name.into();
        self
    }
}
