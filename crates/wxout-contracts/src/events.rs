use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

/// Things worth recording while loading one model output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadEvent {
    FilesFound {
        family: String,
        format: String,
        valid_time: String,
        files: Vec<String>,
    },
    FileOpened {
        path: String,
    },
    FileReadFailed {
        path: String,
        error: String,
    },
    AttributesResolved {
        category: String,
        names: Vec<String>,
    },
}

/// Append-only writer for a load's `events.jsonl`.
///
/// - every line carries `type`, `load_id` and `ts`
/// - event fields are merged after `load_id`/`ts` and win on conflict
/// - one compact JSON object per line
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    load_id: String,
    lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, load_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                load_id: load_id.into(),
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn load_id(&self) -> &str {
        &self.inner.load_id
    }

    pub fn emit(&self, event: &LoadEvent) -> anyhow::Result<Value> {
        let mut line = Map::new();
        line.insert(
            "load_id".to_string(),
            Value::String(self.inner.load_id.clone()),
        );
        line.insert("ts".to_string(), Value::String(now_utc_iso()));
        if let Value::Object(fields) = serde_json::to_value(event)? {
            for (key, value) in fields {
                line.insert(key, value);
            }
        }

        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let encoded = serde_json::to_string(&line)?;
        let _guard = self
            .inner
            .lock
            .lock()
            .map_err(|_| anyhow::anyhow!("event writer lock poisoned"))?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)?;
        file.write_all(encoded.as_bytes())?;
        file.write_all(b"\n")?;

        Ok(Value::Object(line))
    }
}

fn now_utc_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::DateTime;
    use serde_json::{json, Value};

    use super::*;

    #[test]
    fn emit_writes_compact_jsonl_line() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("logs").join("events.jsonl");
        let writer = EventWriter::new(&path, "load-1");

        let emitted = writer.emit(&LoadEvent::FileOpened {
            path: "/data/wrfout_d01".to_string(),
        })?;

        let content = fs::read_to_string(&path)?;
        let line = content.lines().next().unwrap_or("");
        let parsed: Value = serde_json::from_str(line)?;

        assert_eq!(parsed, emitted);
        assert_eq!(parsed["type"], json!("file_opened"));
        assert_eq!(parsed["load_id"], json!("load-1"));
        assert_eq!(parsed["path"], json!("/data/wrfout_d01"));

        let ts = parsed["ts"].as_str().unwrap_or("");
        DateTime::parse_from_rfc3339(ts)?;
        Ok(())
    }

    #[test]
    fn structured_fields_are_kept() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let writer = EventWriter::new(temp.path().join("events.jsonl"), "load-1");

        let emitted = writer.emit(&LoadEvent::AttributesResolved {
            category: "dims".to_string(),
            names: vec!["nz".to_string(), "nx".to_string()],
        })?;

        assert_eq!(emitted["type"], json!("attributes_resolved"));
        assert_eq!(emitted["names"], json!(["nz", "nx"]));
        Ok(())
    }

    #[test]
    fn emit_appends_lines() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("events.jsonl");
        let writer = EventWriter::new(&path, "load-1");

        writer.emit(&LoadEvent::FilesFound {
            family: "wrf".to_string(),
            format: "netcdf".to_string(),
            valid_time: "2021-01-01_22:00:00".to_string(),
            files: Vec::new(),
        })?;
        writer.emit(&LoadEvent::FileReadFailed {
            path: "/data/broken".to_string(),
            error: "not a netcdf file".to_string(),
        })?;

        let content = fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: Value = serde_json::from_str(lines[0])?;
        let second: Value = serde_json::from_str(lines[1])?;
        assert_eq!(first["type"], json!("files_found"));
        assert_eq!(second["type"], json!("file_read_failed"));
        assert_eq!(second["error"], json!("not a netcdf file"));
        Ok(())
    }
}
