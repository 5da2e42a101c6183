use crate::media::MediaKind;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

const DEFAULT_MAX_BYTES: u64 = 1024 * 1024;

/// Append-only JSON-lines record of records the enricher could not measure.
/// The file is truncated once the next line would push it past `max_bytes`.
#[derive(Clone)]
pub struct FailureLog {
    path: PathBuf,
    max_bytes: u64,
    guard: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
pub struct EnrichmentFailure {
    pub timestamp: String,
    pub timestamp_ms: u64,
    pub url: String,
    pub kind: MediaKind,
    pub reason: String,
}

impl EnrichmentFailure {
    pub fn new(url: &str, kind: MediaKind, reason: impl ToString) -> Self {
        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string());
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis() as u64)
            .unwrap_or(0);
        Self {
            timestamp,
            timestamp_ms,
            url: url.to_string(),
            kind,
            reason: reason.to_string(),
        }
    }
}

impl FailureLog {
    pub fn new(path: PathBuf, max_bytes: u64) -> Option<Self> {
        if path.as_os_str().is_empty() {
            return None;
        }
        let max_bytes = if max_bytes == 0 {
            DEFAULT_MAX_BYTES
        } else {
            max_bytes
        };
        Some(Self {
            path,
            max_bytes,
            guard: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn write(&self, entry: EnrichmentFailure) {
        let line = match serde_json::to_string(&entry) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = ?err, "failed to serialize failure log entry");
                return;
            }
        };
        let _guard = self.guard.lock().await;
        if let Some(parent) = self.path.parent() {
            if let Err(err) = fs::create_dir_all(parent).await {
                warn!(
                    error = ?err,
                    path = %self.path.display(),
                    "failed to create failure log dir"
                );
                return;
            }
        }
        let line_len = line.len() as u64 + 1;
        match fs::metadata(&self.path).await {
            Ok(metadata) if metadata.len().saturating_add(line_len) > self.max_bytes => {
                if let Err(err) = fs::write(&self.path, b"").await {
                    warn!(
                        error = ?err,
                        path = %self.path.display(),
                        "failed to truncate failure log"
                    );
                    return;
                }
            }
            Ok(_) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(error = ?err, path = %self.path.display(), "failed to stat failure log");
                return;
            }
        }
        let mut file = match fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
        {
            Ok(file) => file,
            Err(err) => {
                warn!(error = ?err, path = %self.path.display(), "failed to open failure log");
                return;
            }
        };
        let mut bytes = line.into_bytes();
        bytes.push(b'\n');
        if let Err(err) = file.write_all(&bytes).await {
            warn!(error = ?err, path = %self.path.display(), "failed to write failure log");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn empty_path_disables_log() {
        assert!(FailureLog::new(PathBuf::new(), 10).is_none());
    }

    #[tokio::test]
    async fn appends_json_lines() {
        let dir = tempdir().unwrap();
        let log = FailureLog::new(dir.path().join("logs/failures.jsonl"), 0).unwrap();
        log.write(EnrichmentFailure::new("https://x/a.mp4", MediaKind::Video, "ffprobe exited 1"))
            .await;
        log.write(EnrichmentFailure::new("https://x/b.svg", MediaKind::Svg, "no size"))
            .await;
        let contents = std::fs::read_to_string(log.path()).unwrap();
        let lines: Vec<serde_json::Value> = contents
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["url"], "https://x/a.mp4");
        assert_eq!(lines[0]["kind"], "video");
        assert_eq!(lines[1]["reason"], "no size");
        assert!(lines[1]["timestamp"].as_str().unwrap().contains('T'));
    }

    #[tokio::test]
    async fn truncates_when_full() {
        let dir = tempdir().unwrap();
        let log = FailureLog::new(dir.path().join("failures.jsonl"), 200).unwrap();
        for index in 0..5 {
            log.write(EnrichmentFailure::new(
                &format!("https://x/{index}.mp4"),
                MediaKind::Video,
                "timeout",
            ))
            .await;
        }
        let contents = std::fs::read_to_string(log.path()).unwrap();
        assert!(contents.len() as u64 <= 200);
        assert!(contents.contains("https://x/4.mp4"));
        assert!(!contents.contains("https://x/0.mp4"));
    }
}
