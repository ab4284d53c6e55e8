//! Push notification types.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use super::Filter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One row-level change notification as delivered by the push channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "eventType")]
    pub event_type: ChangeKind,
    pub table: String,
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default)]
    pub new: Option<Value>,
    #[serde(default)]
    pub old: Option<Value>,
}

fn default_schema() -> String {
    "public".to_string()
}

impl ChangeEvent {
    pub fn new(event_type: ChangeKind, table: &str, new: Option<Value>, old: Option<Value>) -> Self {
        Self {
            event_type,
            table: table.to_string(),
            schema: default_schema(),
            new,
            old,
        }
    }

    /// The row the event is about: `new` for inserts/updates, `old` for deletes.
    pub fn row(&self) -> Option<&Value> {
        self.new.as_ref().or(self.old.as_ref())
    }
}

/// A table the push channel listens to, optionally narrowed to one column value.
#[derive(Debug, Clone, PartialEq)]
pub struct TableFilter {
    pub table: String,
    pub filter: Option<Filter>,
}

impl TableFilter {
    pub fn all(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filter: None,
        }
    }

    pub fn year(table: &str, year: i32) -> Self {
        Self {
            table: table.to_string(),
            filter: Some(Filter::eq("event_year", year)),
        }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        match &self.filter {
            None => true,
            Some(filter) => {
                event.new.as_ref().is_some_and(|row| filter.matches(row))
                    || event.old.as_ref().is_some_and(|row| filter.matches(row))
            }
        }
    }
}

/// Releases a push subscription on the source side. Runs at most once,
/// either through [`PushCloser::close`] or on drop.
pub struct PushCloser {
    channel: String,
    close: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl PushCloser {
    pub fn new(channel: &str, close: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            channel: channel.to_string(),
            close: Some(Box::new(close)),
        }
    }

    pub fn close(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(close) = self.close.take() {
            debug!(channel = %self.channel, "Closing push channel");
            close();
        }
    }
}

impl Drop for PushCloser {
    fn drop(&mut self) {
        self.run();
    }
}

impl fmt::Debug for PushCloser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushCloser")
            .field("channel", &self.channel)
            .field("open", &self.close.is_some())
            .finish()
    }
}

/// An open push channel: the event stream plus its closer.
#[derive(Debug)]
pub struct PushSubscription {
    pub channel: String,
    pub events: mpsc::UnboundedReceiver<ChangeEvent>,
    pub closer: PushCloser,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_change_event_wire_shape() {
        let json = r#"{"eventType":"UPDATE","table":"companies","schema":"public","new":{"id":1},"old":{"id":1}}"#;
        let event: ChangeEvent = serde_json::from_str(json).expect("parse change event");
        assert_eq!(event.event_type, ChangeKind::Update);
        assert_eq!(event.table, "companies");
        assert_eq!(event.row(), Some(&json!({"id": 1})));
    }

    #[test]
    fn test_table_filter_matches_year_on_old_row() {
        let filter = TableFilter::year("assignments", 2026);
        let delete = ChangeEvent::new(
            ChangeKind::Delete,
            "assignments",
            None,
            Some(json!({"id": 3, "event_year": 2026})),
        );
        assert!(filter.matches(&delete));

        let other_year = ChangeEvent::new(
            ChangeKind::Insert,
            "assignments",
            Some(json!({"id": 4, "event_year": 2025})),
            None,
        );
        assert!(!filter.matches(&other_year));
        assert!(!TableFilter::all("companies").matches(&other_year));
    }

    #[test]
    fn test_closer_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let closer = PushCloser::new("markers-2026", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        closer.close();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        let counter = Arc::clone(&count);
        drop(PushCloser::new("markers-2026", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
