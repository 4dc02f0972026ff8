//! Operational alerts - infrastructure-wide failures reported to operators
//! instead of callers.

mod alert_monitor;
mod alerts_model;

pub use alert_monitor::AlertMonitor;
pub use alerts_model::{AlertSink, LogAlertSink, OperationalAlert, RecordingAlertSink};
