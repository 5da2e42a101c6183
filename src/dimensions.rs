//! Pixel dimensions for records the resolver already classified.
//!
//! SVG and iframe markup is parsed in-process; every other kind is measured
//! by `ffprobe`, which is killed if the caller's deadline passes first.

use crate::capabilities::FetchBody;
use crate::config::Config;
use crate::error::MediaError;
use crate::failure_log::{EnrichmentFailure, FailureLog};
use crate::media::{Dimensions, MediaKind, MediaRecord};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio::time::{Instant, timeout, timeout_at};
use tracing::{debug, info, warn};

const SVGO_SUFFIX: &str = "<!-- Generated by SVGo -->";

#[derive(Debug, Error)]
pub enum DimensionError {
    #[error(transparent)]
    Fetch(#[from] MediaError),
    #[error("no dimensions found for {url}")]
    Missing { url: String },
    #[error("invalid markup for {url}: {reason}")]
    Markup { url: String, reason: String },
    #[error("invalid dimension value {value:?}")]
    Value { value: String },
    #[error("ffprobe failed for {url}: {reason}")]
    Ffprobe { url: String, reason: String },
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl DimensionError {
    pub fn is_deadline(&self) -> bool {
        matches!(
            self,
            DimensionError::DeadlineExceeded | DimensionError::Fetch(MediaError::DeadlineExceeded)
        )
    }
}

impl From<tokio::time::error::Elapsed> for DimensionError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::DeadlineExceeded
    }
}

#[derive(Clone)]
pub struct DimensionEnricher {
    body: Arc<dyn FetchBody>,
    ffprobe_path: PathBuf,
    ffprobe_timeout: Duration,
    workers: usize,
    failure_log: Option<FailureLog>,
}

impl DimensionEnricher {
    pub fn new(body: Arc<dyn FetchBody>, config: &Config) -> Self {
        let failure_log = config
            .failure_log_path
            .clone()
            .and_then(|path| FailureLog::new(path, config.failure_log_max_bytes));
        Self {
            body,
            ffprobe_path: config.ffprobe_path.clone(),
            ffprobe_timeout: config.ffprobe_timeout,
            workers: config.enrich_workers.max(1),
            failure_log,
        }
    }

    /// True when the record is left alone: it is already measured, has no
    /// URL, or has no usable kind.
    pub fn should_skip(record: &MediaRecord) -> bool {
        record.dimensions.is_some()
            || record.primary_url.trim().is_empty()
            || !record.kind.is_valid()
    }

    /// Returns an enriched copy of `record`. Skipped records come back unchanged.
    pub async fn enrich(
        &self,
        record: &MediaRecord,
        deadline: Instant,
    ) -> Result<MediaRecord, DimensionError> {
        if Self::should_skip(record) {
            return Ok(record.clone());
        }
        let url = record.primary_url.as_str();
        let dimensions = timeout_at(deadline, async {
            match record.kind {
                MediaKind::Svg => self.svg_dimensions(url).await,
                MediaKind::Html => self.html_dimensions(url).await,
                _ => self.ffprobe_dimensions(url).await,
            }
        })
        .await??;
        debug!(url = %url, width = dimensions.width, height = dimensions.height, "measured media");
        Ok(record.with_dimensions(dimensions))
    }

    /// Enriches every record with bounded concurrency. Failures are logged and
    /// recorded; the failed record is returned as it came in. Output order
    /// matches input order.
    pub async fn enrich_batch(
        &self,
        records: Vec<MediaRecord>,
        deadline: Instant,
    ) -> Vec<MediaRecord> {
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let mut join_set = JoinSet::new();
        let mut tasks: HashMap<task::Id, usize> = HashMap::new();
        let mut results = records.clone();
        for (idx, record) in records.into_iter().enumerate() {
            if Self::should_skip(&record) {
                continue;
            }
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let enricher = self.clone();
            let handle = join_set.spawn(async move {
                let _permit = permit;
                enricher.enrich(&record, deadline).await
            });
            tasks.insert(handle.id(), idx);
        }
        let mut enriched = 0usize;
        let mut failed = 0usize;
        while let Some(joined) = join_set.join_next_with_id().await {
            let (id, outcome) = match joined {
                Ok((id, outcome)) => (id, outcome.map_err(|err| err.to_string())),
                Err(err) => (err.id(), Err(format!("enrichment task failed: {err}"))),
            };
            let Some(&idx) = tasks.get(&id) else {
                continue;
            };
            match outcome {
                Ok(updated) => {
                    enriched += 1;
                    results[idx] = updated;
                }
                Err(reason) => {
                    failed += 1;
                    let record = &results[idx];
                    warn!(
                        error = %reason,
                        url = %record.primary_url,
                        kind = %record.kind,
                        "failed to enrich dimensions"
                    );
                    if let Some(log) = &self.failure_log {
                        log.write(EnrichmentFailure::new(&record.primary_url, record.kind, reason))
                            .await;
                    }
                }
            }
        }
        info!(total = results.len(), enriched, failed, "dimension enrichment finished");
        results
    }

    /// Markup stored directly in the URL slot is parsed as-is; anything else
    /// (http, ipfs, ar, data URIs) goes through the body fetcher.
    async fn svg_dimensions(&self, url: &str) -> Result<Dimensions, DimensionError> {
        let markup = if url.trim_start().starts_with('<') {
            url.to_string()
        } else {
            let body = self.body.fetch_body(url).await?;
            String::from_utf8_lossy(&body).into_owned()
        };
        let trimmed = markup.trim_end();
        let markup = trimmed.strip_suffix(SVGO_SUFFIX).unwrap_or(trimmed);
        svg_dimensions_from_markup(url, markup.as_bytes())
    }

    async fn html_dimensions(&self, url: &str) -> Result<Dimensions, DimensionError> {
        let body = self.body.fetch_body(url).await?;
        iframe_dimensions_from_markup(url, &body)
    }

    async fn ffprobe_dimensions(&self, url: &str) -> Result<Dimensions, DimensionError> {
        let mut cmd = Command::new(&self.ffprobe_path);
        cmd.args(["-hide_banner", "-loglevel", "error", "-show_streams", url])
            .args(["-print_format", "json"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = cmd.spawn().map_err(|err| DimensionError::Ffprobe {
            url: url.to_string(),
            reason: format!("failed to spawn {}: {err}", self.ffprobe_path.display()),
        })?;
        let output = timeout(self.ffprobe_timeout, child.wait_with_output())
            .await
            .map_err(|_| DimensionError::Ffprobe {
                url: url.to_string(),
                reason: format!("timed out after {}s", self.ffprobe_timeout.as_secs()),
            })?
            .map_err(|err| DimensionError::Ffprobe {
                url: url.to_string(),
                reason: err.to_string(),
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DimensionError::Ffprobe {
                url: url.to_string(),
                reason: format!("{}: {}", output.status, stderr.trim()),
            });
        }
        parse_ffprobe_output(url, &output.stdout)
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    #[serde(default)]
    width: u32,
    #[serde(default)]
    height: u32,
}

/// First stream in `ffprobe -show_streams -print_format json` output with a
/// non-zero size.
pub fn parse_ffprobe_output(url: &str, stdout: &[u8]) -> Result<Dimensions, DimensionError> {
    let output: FfprobeOutput =
        serde_json::from_slice(stdout).map_err(|err| DimensionError::Ffprobe {
            url: url.to_string(),
            reason: format!("unreadable output: {err}"),
        })?;
    output
        .streams
        .iter()
        .find_map(|stream| Dimensions::new(stream.width, stream.height))
        .ok_or_else(|| DimensionError::Missing {
            url: url.to_string(),
        })
}

/// Root `<svg>` width and height; `viewBox` fills in when either is missing.
pub fn svg_dimensions_from_markup(
    url: &str,
    markup: &[u8],
) -> Result<Dimensions, DimensionError> {
    let root = root_attributes(url, markup, b"svg", false)?;
    if let (Some(width), Some(height)) = (root.get("width"), root.get("height")) {
        return to_dimensions(url, width, height);
    }
    let Some(view_box) = root.get("viewBox") else {
        return Err(DimensionError::Missing {
            url: url.to_string(),
        });
    };
    let parts: Vec<&str> = view_box
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|part| !part.is_empty())
        .collect();
    let [_, _, width, height] = parts.as_slice() else {
        return Err(DimensionError::Markup {
            url: url.to_string(),
            reason: format!("invalid viewBox {view_box:?}"),
        });
    };
    to_dimensions(url, width, height)
}

/// Width and height attributes of an `<iframe>` document root.
pub fn iframe_dimensions_from_markup(
    url: &str,
    markup: &[u8],
) -> Result<Dimensions, DimensionError> {
    let root = root_attributes(url, markup, b"iframe", true)?;
    match (root.get("width"), root.get("height")) {
        (Some(width), Some(height)) => to_dimensions(url, width, height),
        _ => Err(DimensionError::Missing {
            url: url.to_string(),
        }),
    }
}

struct RootAttributes(Vec<(String, String)>);

impl RootAttributes {
    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, value)| key == name && !value.trim().is_empty())
            .map(|(_, value)| value.trim())
    }
}

fn root_attributes(
    url: &str,
    markup: &[u8],
    expected: &[u8],
    html: bool,
) -> Result<RootAttributes, DimensionError> {
    let mut reader = Reader::from_reader(markup);
    reader.config_mut().trim_text(true);
    loop {
        match reader.read_event() {
            Ok(Event::Start(elem)) | Ok(Event::Empty(elem)) => {
                if !elem.local_name().as_ref().eq_ignore_ascii_case(expected) {
                    return Err(DimensionError::Markup {
                        url: url.to_string(),
                        reason: format!(
                            "root element is <{}>",
                            String::from_utf8_lossy(elem.local_name().as_ref())
                        ),
                    });
                }
                return Ok(collect_attributes(&elem, html));
            }
            Ok(Event::Eof) => {
                return Err(DimensionError::Markup {
                    url: url.to_string(),
                    reason: "no root element".to_string(),
                });
            }
            Err(err) => {
                return Err(DimensionError::Markup {
                    url: url.to_string(),
                    reason: err.to_string(),
                });
            }
            Ok(_) => {}
        }
    }
}

fn collect_attributes(elem: &BytesStart<'_>, html: bool) -> RootAttributes {
    let attributes = if html {
        elem.html_attributes()
    } else {
        elem.attributes()
    };
    RootAttributes(
        attributes
            .flatten()
            .map(|attr| {
                (
                    String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned(),
                    String::from_utf8_lossy(&attr.value).into_owned(),
                )
            })
            .collect(),
    )
}

fn to_dimensions(url: &str, width: &str, height: &str) -> Result<Dimensions, DimensionError> {
    Dimensions::new(parse_length(width)?, parse_length(height)?).ok_or_else(|| {
        DimensionError::Missing {
            url: url.to_string(),
        }
    })
}

/// Parses `300`, `300px` or `299.6`; percentages and other units are rejected.
fn parse_length(value: &str) -> Result<u32, DimensionError> {
    let invalid = || DimensionError::Value {
        value: value.to_string(),
    };
    let number = value.trim();
    let number = number.strip_suffix("px").unwrap_or(number).trim();
    let parsed: f64 = number.parse().map_err(|_| invalid())?;
    if !parsed.is_finite() || parsed < 0.0 || parsed > f64::from(u32::MAX) {
        return Err(invalid());
    }
    Ok(parsed.round() as u32)
}
