//! Output formatting for XFRM events (text and JSON).

pub mod monitor;

pub use monitor::{MonitorConfig, MonitorEvent, print_event, print_monitor_start, write_timestamp};

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Options that tune how events are rendered.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputOptions {
    /// Pretty-print JSON output.
    pub pretty: bool,
    /// Suppress key material in text output.
    pub hide_keys: bool,
}
