use super::traits::EvidenceSource;
use crate::config::ArbiterConfig;
use regex::Regex;
use reqwest::{Client, StatusCode};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

/// Network error, timeout or unreadable body.
pub const OFFLINE: &str = "Offline/Blocked";
/// The site answered with something other than 200.
pub const NO_DATA: &str = "No Data";

const NO_TITLE: &str = "No Title";
const NO_DESCRIPTION: &str = "No Description";
const BODY_CAP: usize = 256 * 1024;

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("title pattern"));
static META_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("meta pattern"));
static DESCRIPTION_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bname\s*=\s*["']?description["'\s/>]"#).expect("name pattern")
});
static CONTENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)\bcontent\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("content pattern")
});

/// Fetches `http://{domain}` and summarizes its title and meta description.
pub struct HttpEvidence {
    client: Client,
    title_max: usize,
    description_max: usize,
}

impl HttpEvidence {
    pub fn new(config: &ArbiterConfig) -> reqwest::Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.evidence_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            title_max: config.title_max_chars,
            description_max: config.description_max_chars,
        })
    }

    async fn fetch(&self, url: &str) -> reqwest::Result<Option<String>> {
        let mut resp = self.client.get(url).send().await?;
        if resp.status() != StatusCode::OK {
            return Ok(None);
        }

        let mut body = Vec::new();
        while let Some(chunk) = resp.chunk().await? {
            body.extend_from_slice(&chunk);
            if body.len() >= BODY_CAP {
                body.truncate(BODY_CAP);
                break;
            }
        }
        Ok(Some(String::from_utf8_lossy(&body).into_owned()))
    }
}

#[async_trait::async_trait]
impl EvidenceSource for HttpEvidence {
    async fn gather(&self, domain: &str) -> String {
        let url = format!("http://{domain}");
        match self.fetch(&url).await {
            Ok(Some(html)) => summarize(&html, self.title_max, self.description_max),
            Ok(None) => NO_DATA.to_string(),
            Err(e) => {
                debug!("Evidence fetch for {} failed: {}", domain, e);
                OFFLINE.to_string()
            }
        }
    }
}

/// `Title: <title> | Description: <meta description>`, each truncated.
pub fn summarize(html: &str, title_max: usize, description_max: usize) -> String {
    let title = extract_title(html)
        .map(|t| truncate_chars(&t, title_max))
        .unwrap_or_else(|| NO_TITLE.to_string());
    let description = extract_description(html)
        .map(|d| truncate_chars(&d, description_max))
        .unwrap_or_else(|| NO_DESCRIPTION.to_string());
    format!("Title: {title} | Description: {description}")
}

fn extract_title(html: &str) -> Option<String> {
    let raw = TITLE_RE.captures(html)?.get(1)?.as_str();
    non_empty(collapse_whitespace(raw))
}

fn extract_description(html: &str) -> Option<String> {
    META_RE
        .find_iter(html)
        .map(|tag| tag.as_str())
        .filter(|tag| DESCRIPTION_NAME_RE.is_match(tag))
        .find_map(|tag| {
            let caps = CONTENT_RE.captures(tag)?;
            let value = caps.get(1).or_else(|| caps.get(2))?.as_str();
            non_empty(collapse_whitespace(value))
        })
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}
