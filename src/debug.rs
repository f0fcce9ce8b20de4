use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// JSON-lines trace of scanner and planner decisions.
#[derive(Clone)]
pub(crate) struct DebugLogger {
    inner: Arc<Mutex<DebugState>>,
}

struct DebugState {
    writer: BufWriter<File>,
    counters: BTreeMap<String, u64>,
}

impl DebugLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(DebugState {
                writer: BufWriter::new(file),
                counters: BTreeMap::new(),
            })),
        })
    }

    pub fn log_json(&self, value: &Value) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = writeln!(state.writer, "{value}");
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let counts: Map<String, Value> = std::mem::take(&mut state.counters)
                .into_iter()
                .map(|(key, value)| (key, Value::from(value)))
                .collect();
            let line = json!({
                "type": "debug.summary",
                "context": context,
                "counts": counts,
            });
            let _ = writeln!(state.writer, "{line}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_drains_counters_into_one_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("trace.jsonl");
        let logger = DebugLogger::new(&path).expect("logger");
        logger.log_json(&json!({"type": "scan", "candidates": 3}));
        logger.increment("plan.fallback", 2);
        logger.increment("plan.fallback", 1);
        logger.emit_summary("export");
        logger.flush();

        let text = std::fs::read_to_string(&path).expect("read");
        let lines: Vec<Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1]["type"], "debug.summary");
        assert_eq!(lines[1]["counts"]["plan.fallback"], 3);
    }
}
