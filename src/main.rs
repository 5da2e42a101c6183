//! Reads `MediaRecord`s as NDJSON on stdin, fills in missing dimensions and
//! writes the records back out in the same order. An unreadable line stops
//! the run before anything past it is written.

use anyhow::{Context, Result};
use std::sync::Arc;
use token_media::config::Config;
use token_media::{MediaPipeline, MediaRecord};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::time::Instant;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Arc::new(Config::from_env()?);
    let chunk_size = config.enrich_workers.max(1);
    let chunk_budget = config.ffprobe_timeout + config.http_timeout;
    let pipeline = MediaPipeline::from_config(config.clone())?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let mut pending = Vec::with_capacity(chunk_size);
    let mut line_number = 0usize;
    let mut written = 0usize;

    while let Some(line) = lines.next_line().await.context("read stdin")? {
        line_number += 1;
        let Some(record) = parse_record(line_number, &line)? else {
            continue;
        };
        pending.push(record);
        if pending.len() >= chunk_size {
            let batch = std::mem::take(&mut pending);
            written += flush(&pipeline, batch, chunk_budget, &mut stdout).await?;
        }
    }
    if !pending.is_empty() {
        written += flush(&pipeline, pending, chunk_budget, &mut stdout).await?;
    }
    info!(records = written, "backfill complete");
    Ok(())
}

async fn flush(
    pipeline: &MediaPipeline,
    batch: Vec<MediaRecord>,
    budget: std::time::Duration,
    stdout: &mut tokio::io::Stdout,
) -> Result<usize> {
    let enriched = pipeline.enrich_batch(batch, Instant::now() + budget).await;
    for record in &enriched {
        let mut line = serde_json::to_vec(record).context("serialize record")?;
        line.push(b'\n');
        stdout.write_all(&line).await.context("write stdout")?;
    }
    stdout.flush().await.context("flush stdout")?;
    Ok(enriched.len())
}

/// Blank lines carry no record.
fn parse_record(line_number: usize, line: &str) -> Result<Option<MediaRecord>> {
    if line.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .with_context(|| format!("invalid media record on line {line_number}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use token_media::MediaKind;

    #[test]
    fn blank_lines_are_skipped() {
        assert!(parse_record(1, "   ").unwrap().is_none());
    }

    #[test]
    fn records_parse() {
        let line = r#"{"kind":"svg","content_type":"image/svg+xml","primary_url":"ipfs://a.svg","thumbnail_url":null,"dimensions":null}"#;
        let record = parse_record(2, line).unwrap().unwrap();
        assert_eq!(record.kind, MediaKind::Svg);
        assert_eq!(record.primary_url, "ipfs://a.svg");
    }

    #[test]
    fn unreadable_line_is_an_error_with_its_number() {
        let err = parse_record(7, "{not json").unwrap_err();
        assert!(err.to_string().contains("line 7"));
    }
}
