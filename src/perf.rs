use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;

pub(crate) const DEFAULT_PERF_LOG: &str = "pageanchor_perf.log";

#[derive(Clone)]
pub(crate) struct PerfLogger {
    inner: Arc<Mutex<PerfState>>,
}

struct PerfState {
    writer: BufWriter<File>,
    path: PathBuf,
    span_totals: HashMap<String, f64>,
    span_counts: HashMap<String, u64>,
    count_totals: HashMap<String, u64>,
}

impl PerfLogger {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(PerfState {
                writer: BufWriter::new(file),
                path,
                span_totals: HashMap::new(),
                span_counts: HashMap::new(),
                count_totals: HashMap::new(),
            })),
        })
    }

    pub fn log_span_ms(&self, name: &str, url: Option<&str>, ms: f64) {
        let line = json!({
            "type": "perf.span",
            "name": name,
            "url": url,
            "unit": "ms",
            "ms": (ms * 1000.0).round() / 1000.0,
        });
        if let Ok(mut state) = self.inner.lock() {
            *state.span_totals.entry(name.to_string()).or_insert(0.0) += ms;
            let entry = state.span_counts.entry(name.to_string()).or_insert(0);
            *entry = entry.saturating_add(1);
            let _ = writeln!(state.writer, "{line}");
        }
    }

    pub fn log_since(&self, name: &str, url: Option<&str>, started: Instant) {
        self.log_span_ms(name, url, started.elapsed().as_secs_f64() * 1000.0);
    }

    pub fn log_counts(&self, name: &str, url: Option<&str>, counts: &[(&str, u64)]) {
        let mut fields = Map::new();
        for (key, value) in counts {
            fields.insert((*key).to_string(), Value::from(*value));
        }
        let line = json!({
            "type": "perf.counts",
            "name": name,
            "url": url,
            "counts": fields,
        });
        if let Ok(mut state) = self.inner.lock() {
            for (key, value) in counts {
                let entry = state.count_totals.entry(format!("{name}.{key}")).or_insert(0);
                *entry = entry.saturating_add(*value);
            }
            let _ = writeln!(state.writer, "{line}");
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            let _ = state.writer.flush();
        }
    }
}

// Runs once the last logger clone is gone; the hot file ranks spans by total time.
impl Drop for PerfState {
    fn drop(&mut self) {
        let _ = self.writer.flush();
        let Ok(file) = File::create(hot_path_for(&self.path)) else {
            return;
        };
        let mut writer = BufWriter::new(file);

        let mut spans: Vec<(&String, &f64)> = self.span_totals.iter().collect();
        spans.sort_by(|a, b| b.1.partial_cmp(a.1).unwrap_or(std::cmp::Ordering::Equal));
        for (rank, (name, ms)) in spans.into_iter().take(100).enumerate() {
            let count = self.span_counts.get(name).copied().unwrap_or(1);
            let avg = if count == 0 { 0.0 } else { ms / count as f64 };
            let line = json!({
                "type": "perf.hot.span",
                "rank": rank + 1,
                "name": name,
                "agg": "sum",
                "ms": ms,
                "count": count,
                "avg_ms": avg,
            });
            let _ = writeln!(writer, "{line}");
        }

        let mut counts: Vec<(&String, &u64)> = self.count_totals.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (rank, (name, value)) in counts.into_iter().take(100).enumerate() {
            let line = json!({
                "type": "perf.hot.count",
                "rank": rank + 1,
                "name": name,
                "value": value,
            });
            let _ = writeln!(writer, "{line}");
        }
    }
}

fn hot_path_for(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(DEFAULT_PERF_LOG);
    let stem = file_name
        .rsplit_once('.')
        .map(|(s, _)| s)
        .unwrap_or(file_name);
    path.with_file_name(format!("{stem}_hot.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hot_path_keeps_directory_and_stem() {
        let path = Path::new("/tmp/logs/run.perf.jsonl");
        assert_eq!(hot_path_for(path), PathBuf::from("/tmp/logs/run.perf_hot.log"));
        assert_eq!(
            hot_path_for(Path::new("plain")),
            PathBuf::from("plain_hot.log")
        );
    }

    #[test]
    fn dropping_logger_writes_ranked_hot_file() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("pageanchor_perf_test_{}.log", std::process::id()));
        let logger = PerfLogger::new(&path).expect("perf logger");
        logger.log_span_ms("reconcile", Some("https://example.com/"), 2.0);
        logger.log_span_ms("reconcile", None, 4.0);
        logger.log_span_ms("capture", None, 1.0);
        logger.log_counts("reconcile", None, &[("anchored", 3), ("fallback", 1)]);
        drop(logger);

        let hot_path = hot_path_for(&path);
        let hot = std::fs::read_to_string(&hot_path).expect("hot log");
        let lines: Vec<Value> = hot
            .lines()
            .map(|line| serde_json::from_str(line).expect("json"))
            .collect();
        assert_eq!(lines[0]["name"], "reconcile");
        assert_eq!(lines[0]["count"], 2);
        assert_eq!(lines[0]["avg_ms"], 3.0);
        assert!(
            lines
                .iter()
                .any(|l| l["name"] == "reconcile.anchored" && l["value"] == 3)
        );
        let _ = std::fs::remove_file(path);
        let _ = std::fs::remove_file(hot_path);
    }
}
