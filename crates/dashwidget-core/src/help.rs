//! Help topic lookup for the widget configuration dialog.

use crate::model::WidgetType;

/// Immutable widget type to help topic table, keyed by type string.
#[derive(Debug, Clone, Copy)]
pub struct HelpTopics {
    entries: &'static [(&'static str, &'static str)],
    fallback: &'static str,
}

/// Standard help topics for widget configuration.
pub const WIDGET_HELP_TOPICS: HelpTopics = HelpTopics::new(
    &[
        ("timeseries", "widgetsConfigTimeseries"),
        ("latest", "widgetsConfigLatest"),
        ("rpc", "widgetsConfigRpc"),
        ("static", "widgetsConfigStatic"),
    ],
    "widgetsConfig",
);

impl HelpTopics {
    pub const fn new(entries: &'static [(&'static str, &'static str)], fallback: &'static str) -> Self {
        Self { entries, fallback }
    }

    /// Topic for a widget type; unknown or missing types get the fallback.
    pub fn topic_for(&self, widget_type: Option<&WidgetType>) -> &'static str {
        widget_type
            .and_then(|wt| {
                self.entries
                    .iter()
                    .find(|(name, _)| *name == wt.as_str())
                    .map(|(_, topic)| *topic)
            })
            .unwrap_or(self.fallback)
    }
}

impl Default for HelpTopics {
    fn default() -> Self {
        WIDGET_HELP_TOPICS
    }
}
