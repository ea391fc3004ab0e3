//! Source ingestion: files, directories and URLs into the retrieval engine.
//!
//! Each source is loaded, chunked on paragraph boundaries, and added to the
//! [`RetrievalEngine`]. A source that cannot be read, fetched, or embedded
//! is listed in [`IngestReport::failed`]; the rest of the batch continues.
//!
//! Only plain text is accepted (`.txt`, `.md`, `.markdown`, `.text`, and
//! `text/*` HTTP bodies). Other formats fail with "unsupported format".

use anyhow::{anyhow, bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use walkdir::WalkDir;

use research_harness_core::chunk::chunk_source;

use crate::config::IngestConfig;
use crate::error::ResearchError;
use crate::harness::Harness;
use crate::retrieval::RetrievalEngine;

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "text"];

/// Where content comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    File(PathBuf),
    Directory(PathBuf),
    Url(String),
}

impl SourceDescriptor {
    /// `http(s)://` strings are URLs, existing directories are directories,
    /// everything else is treated as a file path.
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Self::Url(raw.to_string());
        }
        let path = PathBuf::from(raw);
        if path.is_dir() {
            Self::Directory(path)
        } else {
            Self::File(path)
        }
    }

    pub fn label(&self) -> String {
        match self {
            Self::File(p) | Self::Directory(p) => p.display().to_string(),
            Self::Url(u) => u.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedSource {
    pub source: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    /// False only when sources were given and none could be ingested.
    pub success: bool,
    /// Files or URLs ingested without error, in ingestion order.
    pub processed: Vec<String>,
    pub failed: Vec<FailedSource>,
    /// Chunk ids returned by the engine (existing ids for re-ingested text).
    pub total_chunks: usize,
    pub chunk_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Ingestor<'a> {
    engine: &'a RetrievalEngine,
    settings: &'a IngestConfig,
    max_tokens: usize,
    http: reqwest::Client,
}

impl<'a> Ingestor<'a> {
    pub fn new(engine: &'a RetrievalEngine, settings: &'a IngestConfig, max_tokens: usize) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.fetch_timeout_secs))
            .build()?;
        Ok(Self {
            engine,
            settings,
            max_tokens,
            http,
        })
    }

    pub async fn ingest(&self, sources: &[SourceDescriptor]) -> IngestReport {
        let mut report = IngestReport::default();

        for descriptor in sources {
            let documents = match self.load(descriptor).await {
                Ok(docs) => docs,
                Err(e) => {
                    record_failure(&mut report, descriptor.label(), e);
                    continue;
                }
            };

            for (origin, text) in documents {
                match text {
                    Ok(text) => match self.add_text(&origin, &text).await {
                        Ok(ids) => {
                            info!(source = %origin, chunks = ids.len(), "ingested");
                            report.processed.push(origin);
                            report.total_chunks += ids.len();
                            report.chunk_ids.extend(ids);
                        }
                        Err(e) => record_failure(&mut report, origin, e),
                    },
                    Err(e) => record_failure(&mut report, origin, e),
                }
            }
        }

        report.success = !report.processed.is_empty() || report.failed.is_empty();
        if !report.success {
            report.error = Some("no sources could be ingested".to_string());
        }
        report
    }

    async fn add_text(&self, origin: &str, text: &str) -> Result<Vec<String>> {
        let chunks = chunk_source(origin, text, self.max_tokens);
        if chunks.is_empty() {
            bail!("no text content");
        }
        self.engine.add(chunks).await
    }

    /// Resolve one descriptor into `(origin, text)` pairs. A directory yields
    /// one pair per matching file, each with its own read result.
    async fn load(&self, descriptor: &SourceDescriptor) -> Result<Vec<(String, Result<String>)>> {
        match descriptor {
            SourceDescriptor::File(path) => {
                Ok(vec![(path.display().to_string(), read_text_file(path))])
            }
            SourceDescriptor::Directory(root) => {
                let files = scan_directory(root, self.settings)?;
                Ok(files
                    .into_iter()
                    .map(|p| {
                        let text = read_text_file(&p);
                        (p.display().to_string(), text)
                    })
                    .collect())
            }
            SourceDescriptor::Url(url) => Ok(vec![(url.clone(), self.fetch(url).await)]),
        }
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self.http.get(url).send().await?.error_for_status()?;
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/plain")
            .to_ascii_lowercase();
        if !content_type.starts_with("text/") {
            bail!("unsupported format: {}", content_type);
        }
        Ok(response.text().await?)
    }
}

fn record_failure(report: &mut IngestReport, origin: String, err: anyhow::Error) {
    let failure = ResearchError::Ingestion {
        origin: origin.clone(),
        reason: format!("{:#}", err),
    };
    warn!(error = %failure, "ingestion failed");
    report.failed.push(FailedSource {
        source: origin,
        reason: format!("{:#}", err),
    });
}

fn read_text_file(path: &Path) -> Result<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !TEXT_EXTENSIONS.contains(&ext.as_str()) {
        if !path.exists() {
            bail!("file not found");
        }
        bail!("unsupported format: .{}", ext);
    }
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => anyhow!("file not found"),
        _ => anyhow!(e).context(format!("Failed to read {}", path.display())),
    })
}

/// Files under `root` matching the include globs and not the exclude globs,
/// sorted by path.
pub fn scan_directory(root: &Path, settings: &IngestConfig) -> Result<Vec<PathBuf>> {
    let include_set = build_globset(&settings.include_globs)?;
    let mut excludes = vec!["**/.git/**".to_string(), "**/target/**".to_string()];
    excludes.extend(settings.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(settings.follow_symlinks) {
        let entry = entry.with_context(|| format!("Failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path).to_string_lossy().to_string();
        if exclude_set.is_match(&relative) || !include_set.is_match(&relative) {
            continue;
        }
        files.push(path.to_path_buf());
    }
    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// `rsh ingest <sources...>`
pub async fn run_ingest(harness: &Harness, sources: &[String], json: bool) -> Result<()> {
    let descriptors: Vec<SourceDescriptor> = sources.iter().map(|s| SourceDescriptor::parse(s)).collect();
    let ingestor = Ingestor::new(
        &harness.engine,
        &harness.config.ingest,
        harness.config.chunking.max_tokens,
    )?;
    let report = ingestor.ingest(&descriptors).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("processed: {}", report.processed.len());
        for origin in &report.processed {
            println!("  {}", origin);
        }
        println!("failed: {}", report.failed.len());
        println!("chunks: {}", report.total_chunks);
        for failure in &report.failed {
            println!("  {}: {}", failure.source, failure.reason);
        }
    }

    match report.error {
        Some(e) => bail!(e),
        None => Ok(()),
    }
}

/// `rsh delete <source>`
pub async fn run_delete(harness: &Harness, source: &str) -> Result<()> {
    let removed = harness.engine.delete(source).await?;
    println!("Deleted {} chunks from {}.", removed, source);
    Ok(())
}

/// `rsh clear`
pub async fn run_clear(harness: &Harness) -> Result<()> {
    let removed = harness.engine.clear_all().await?;
    println!("Cleared {} chunks.", removed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use async_trait::async_trait;
    use research_harness_core::embedding::Embedder;
    use research_harness_core::store::memory::InMemoryChunkStore;
    use std::sync::Arc;

    struct LengthEmbedder;

    #[async_trait]
    impl Embedder for LengthEmbedder {
        fn model_name(&self) -> &str {
            "length"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![1.0, t.len() as f32]).collect())
        }
    }

    fn engine() -> RetrievalEngine {
        RetrievalEngine::new(
            Arc::new(InMemoryChunkStore::new()),
            Arc::new(LengthEmbedder),
            RetrievalConfig::default(),
        )
    }

    #[test]
    fn descriptors_are_classified() {
        let dir = tempfile::TempDir::new().unwrap();
        assert_eq!(
            SourceDescriptor::parse("https://example.com/a.txt"),
            SourceDescriptor::Url("https://example.com/a.txt".to_string())
        );
        assert!(matches!(
            SourceDescriptor::parse(dir.path().to_str().unwrap()),
            SourceDescriptor::Directory(_)
        ));
        assert!(matches!(SourceDescriptor::parse("missing.txt"), SourceDescriptor::File(_)));
    }

    #[tokio::test]
    async fn directory_ingest_skips_unmatched_files() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.md"), "# Alpha\n\nFirst note.").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), "Second note.").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let engine = engine();
        let settings = IngestConfig::default();
        let ingestor = Ingestor::new(&engine, &settings, 250).unwrap();
        let report = ingestor
            .ingest(&[SourceDescriptor::Directory(dir.path().to_path_buf())])
            .await;

        assert!(report.success);
        let root = dir.path();
        assert_eq!(
            report.processed,
            vec![
                root.join("a.md").display().to_string(),
                root.join("sub/b.txt").display().to_string(),
            ]
        );
        assert!(report.failed.is_empty());
        assert_eq!(report.total_chunks, 2);
        assert_eq!(engine.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn failures_are_per_source() {
        let dir = tempfile::TempDir::new().unwrap();
        let good = dir.path().join("good.txt");
        std::fs::write(&good, "Useful content.").unwrap();
        let pdf = dir.path().join("paper.pdf");
        std::fs::write(&pdf, "%PDF-1.4").unwrap();
        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, "  \n\n ").unwrap();

        let engine = engine();
        let settings = IngestConfig::default();
        let ingestor = Ingestor::new(&engine, &settings, 250).unwrap();
        let report = ingestor
            .ingest(&[
                SourceDescriptor::File(good.clone()),
                SourceDescriptor::File(pdf),
                SourceDescriptor::File(dir.path().join("missing.txt")),
                SourceDescriptor::File(empty),
            ])
            .await;

        assert!(report.success);
        assert_eq!(report.processed, vec![good.display().to_string()]);
        assert_eq!(report.failed.len(), 3);
        assert!(report.failed[0].reason.contains("unsupported format"));
        assert!(report.failed[1].reason.contains("not found"));
        assert!(report.failed[2].reason.contains("no text content"));
    }

    #[tokio::test]
    async fn all_failed_is_unsuccessful() {
        let engine = engine();
        let settings = IngestConfig::default();
        let ingestor = Ingestor::new(&engine, &settings, 250).unwrap();
        let report = ingestor
            .ingest(&[SourceDescriptor::File(PathBuf::from("/nonexistent/x.txt"))])
            .await;
        assert!(!report.success);
        assert!(report.error.is_some());
        assert!(report.processed.is_empty());
        assert_eq!(report.total_chunks, 0);
    }
}
