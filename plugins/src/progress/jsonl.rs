use std::io::Write;

use chrono::Local;
use serde_json::{json, Value};
use weaver_core::executor::{ProgressEvent, ProgressSink};

/// One JSON object per event on stdout, stamped with version and time.
pub struct JsonlProgress {
    run_id: String,
}

impl JsonlProgress {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub(crate) fn event_to_json(&self, event: &ProgressEvent) -> Value {
        let mut value = serde_json::to_value(event).unwrap_or_else(|e| {
            json!({ "event": "serialize-error", "error": e.to_string() })
        });
        if let Value::Object(map) = &mut value {
            map.insert("v".into(), json!(1));
            map.insert("ts".into(), json!(Local::now().to_rfc3339()));
            map.insert("run_id".into(), json!(self.run_id));
        }
        value
    }
}

impl ProgressSink for JsonlProgress {
    fn name(&self) -> &str {
        "jsonl"
    }

    fn emit(&self, event: &ProgressEvent) {
        let line = self.event_to_json(event).to_string();
        let mut out = std::io::stdout().lock();
        let _ = writeln!(out, "{line}");
        let _ = out.flush();
    }
}
