pub mod parser;
pub mod render;

use crate::config::ReconcilerConfig;
use crate::domain::Domain;
use crate::error::{Error, FetchError, Result};
use crate::store::{RunGuard, StoreSet};
use futures::{stream, StreamExt};
use reqwest::Client;
use rustc_hash::FxHashSet;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Block,
    Allow,
}

/// A remote feed. Every feed goes through the same line parser, which
/// understands all supported formats.
#[derive(Debug, Clone)]
pub struct RemoteSource {
    pub name: String,
    pub url: String,
    pub kind: SourceKind,
}

impl RemoteSource {
    pub fn block(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            kind: SourceKind::Block,
        }
    }

    pub fn allow(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            kind: SourceKind::Allow,
        }
    }
}

#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// (source name, parsed domain count) for every source that loaded.
    pub sources_ok: Vec<(String, usize)>,
    pub sources_failed: Vec<String>,
    /// Domains in the new Final artifact.
    pub blocked: usize,
    /// Block candidates removed by allow signals.
    pub auto_fixed: usize,
    /// False when the artifact already had identical content.
    pub written: bool,
}

pub struct Reconciler {
    client: Client,
    sources: Vec<RemoteSource>,
    stores: StoreSet,
    concurrent_downloads: usize,
}

impl Reconciler {
    pub fn new(
        client: Client,
        sources: Vec<RemoteSource>,
        stores: StoreSet,
        concurrent_downloads: usize,
    ) -> Self {
        Self {
            client,
            sources,
            stores,
            concurrent_downloads: concurrent_downloads.max(1),
        }
    }

    pub fn from_config(config: &ReconcilerConfig, stores: StoreSet) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent("DnsWarden/0.1")
            .timeout(Duration::from_secs(config.fetch_timeout_secs))
            .build()?;

        let mut sources: Vec<RemoteSource> = config
            .blocklists_sorted()
            .into_iter()
            .map(|(name, url)| RemoteSource::block(name, url))
            .collect();
        sources.extend(
            config
                .allowlists_sorted()
                .into_iter()
                .map(|(name, url)| RemoteSource::allow(name, url)),
        );

        Ok(Self::new(
            client,
            sources,
            stores,
            config.concurrent_downloads,
        ))
    }

    /// Fetches every source, merges with the local stores and replaces the
    /// Final artifact in one step.
    ///
    /// Cancellation is honoured only while sources are being fetched; once
    /// the merge starts the run completes.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<ReconcileReport> {
        let _guard = RunGuard::try_acquire(self.stores.data_dir(), "reconciler")?;
        info!("Reconciler started: {} remote sources", self.sources.len());

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Reconcile cancelled while fetching sources; Final left untouched");
                return Err(Error::Cancelled);
            }
            fetched = self.fetch_all() => fetched,
        };

        let mut report = ReconcileReport::default();
        let mut block_domains = FxHashSet::default();
        let mut allow_domains = FxHashSet::default();

        for (source, outcome) in fetched {
            match outcome {
                Ok(domains) => {
                    info!("Found {} domains in '{}'", domains.len(), source.name);
                    report.sources_ok.push((source.name, domains.len()));
                    match source.kind {
                        SourceKind::Block => block_domains.extend(domains),
                        SourceKind::Allow => allow_domains.extend(domains),
                    }
                }
                Err(e) => {
                    error!("Skipping source '{}' ({}): {}", source.name, source.url, e);
                    report.sources_failed.push(source.name);
                }
            }
        }
        report.sources_ok.sort();
        report.sources_failed.sort();

        let stores = self.stores.clone();
        let (blocked, auto_fixed, written) = tokio::task::spawn_blocking(move || {
            write_final(&stores, block_domains, allow_domains)
        })
        .await??;

        report.blocked = blocked;
        report.auto_fixed = auto_fixed;
        report.written = written;

        info!(
            "Reconcile complete: {} domains blocked, {} removed by allow signals, {} sources failed",
            report.blocked,
            report.auto_fixed,
            report.sources_failed.len()
        );
        Ok(report)
    }

    async fn fetch_all(&self) -> Vec<(RemoteSource, std::result::Result<FxHashSet<Domain>, FetchError>)> {
        let tasks = self.sources.iter().cloned().map(|source| {
            let client = self.client.clone();
            async move {
                let outcome = fetch_and_parse(&client, &source).await;
                (source, outcome)
            }
        });

        stream::iter(tasks)
            .buffer_unordered(self.concurrent_downloads)
            .collect()
            .await
    }
}

async fn fetch_and_parse(
    client: &Client,
    source: &RemoteSource,
) -> std::result::Result<FxHashSet<Domain>, FetchError> {
    info!("Downloading '{}' from {}", source.name, source.url);
    let resp = client.get(&source.url).send().await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    let stream = resp
        .bytes_stream()
        .map(|result| result.map_err(std::io::Error::other));
    let mut reader = BufReader::new(StreamReader::new(stream));
    let mut buf = Vec::new();
    let mut domains = FxHashSet::default();

    // Lists are decoded line by line and leniently; a stray non-UTF-8 byte
    // only affects its own line. A stream error mid-body still fails the
    // whole source.
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        if let Some(domain) = parser::parse_line(&String::from_utf8_lossy(&buf)) {
            domains.insert(domain);
        }
    }
    Ok(domains)
}

/// `(blocks ∪ suspect ∪ blacklist) − (allows ∪ whitelist)`, sorted.
pub fn merge(
    mut block: FxHashSet<Domain>,
    local_block: impl IntoIterator<Item = Domain>,
    mut allow: FxHashSet<Domain>,
    local_allow: impl IntoIterator<Item = Domain>,
) -> (BTreeSet<Domain>, usize) {
    block.extend(local_block);
    allow.extend(local_allow);

    let candidates = block.len();
    let merged: BTreeSet<Domain> = block.into_iter().filter(|d| !allow.contains(d)).collect();
    let auto_fixed = candidates - merged.len();
    (merged, auto_fixed)
}

fn write_final(
    stores: &StoreSet,
    block: FxHashSet<Domain>,
    allow: FxHashSet<Domain>,
) -> Result<(usize, usize, bool)> {
    let suspect = stores.suspect.load()?;
    let blacklist = stores.blacklist.load()?;
    let whitelist = stores.whitelist.load()?;

    let (merged, auto_fixed) = merge(
        block,
        suspect.into_iter().chain(blacklist),
        allow,
        whitelist,
    );
    let body = render::render_body(&merged);

    info!("Writing {} domains to {}", merged.len(), stores.final_list.path().display());
    let written = stores.final_list.update_raw(|current| match current {
        Some(existing) if render::existing_body(existing) == body => None,
        _ => Some(render::render_final(&render::timestamp_now(), &body)),
    })?;
    if !written {
        info!("Final artifact unchanged; keeping existing file");
    }

    Ok((merged.len(), auto_fixed, written))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> FxHashSet<Domain> {
        items.iter().map(|s| Domain::parse(s).unwrap()).collect()
    }

    #[test]
    fn test_merge_whitelist_vetoes_every_block_signal() {
        let (merged, fixed) = merge(
            set(&["a.com", "b.com", "shared.com"]),
            set(&["local-block.com", "shared.com"]),
            set(&["a.com"]),
            set(&["shared.com"]),
        );
        let names: Vec<_> = merged.iter().map(|d| d.as_str()).collect();
        assert_eq!(names, vec!["b.com", "local-block.com"]);
        assert_eq!(fixed, 2);
    }

    #[test]
    fn test_merge_empty_inputs() {
        let (merged, fixed) = merge(set(&[]), set(&[]), set(&["a.com"]), set(&[]));
        assert!(merged.is_empty());
        assert_eq!(fixed, 0);
    }
}
