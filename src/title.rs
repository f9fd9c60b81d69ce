//! Page title lookup for URL bookmarks.
//!
//! Fetches the page and takes, in order: the `<title>` element, the
//! `og:title` meta property, the `title` meta name. Any failure (network,
//! status, no title) falls back to the URL itself, so resolving never
//! fails.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;

use stash_core::store::{TitleResolver, UrlAsTitle};

use crate::config::ServerConfig;

const USER_AGENT: &str = "Mozilla/5.0 (compatible; StashBot/1.0)";

/// Download cap per page; the rest of the body is never read.
const MAX_BODY_BYTES: usize = 512 * 1024;

pub struct HttpTitleResolver {
    client: reqwest::Client,
}

impl HttpTitleResolver {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }

    async fn fetch_title(&self, url: &str) -> Result<Option<String>, reqwest::Error> {
        let resp = self.client.get(url).send().await?.error_for_status()?;
        let body = read_capped(resp, MAX_BODY_BYTES).await?;
        Ok(extract_title(&String::from_utf8_lossy(&body)))
    }
}

#[async_trait]
impl TitleResolver for HttpTitleResolver {
    async fn resolve(&self, url: &str) -> String {
        match self.fetch_title(url).await {
            Ok(Some(title)) => title,
            Ok(None) => {
                tracing::debug!(url, "no title found, using url");
                url.to_string()
            }
            Err(e) => {
                tracing::warn!(url, error = %e, "title fetch failed, using url");
                url.to_string()
            }
        }
    }
}

/// The resolver the server uses for `config`.
pub fn resolver_for(config: &ServerConfig) -> anyhow::Result<Arc<dyn TitleResolver>> {
    if config.fetch_titles {
        Ok(Arc::new(HttpTitleResolver::new(Duration::from_secs(
            config.title_timeout_secs,
        ))?))
    } else {
        Ok(Arc::new(UrlAsTitle))
    }
}

/// Reads at most `cap` bytes of the body, chunk by chunk.
async fn read_capped(mut resp: reqwest::Response, cap: usize) -> Result<Vec<u8>, reqwest::Error> {
    let mut body = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        let room = cap - body.len();
        if chunk.len() >= room {
            body.extend_from_slice(&chunk[..room]);
            break;
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

lazy_static! {
    static ref TITLE_TAG: Regex = Regex::new(r"(?is)<title[^>]*>(.*?)</title\s*>").unwrap();
    static ref META_TAG: Regex = Regex::new(r"(?is)<meta\b[^>]*>").unwrap();
    static ref ATTRIBUTE: Regex =
        Regex::new(r#"(?is)([a-z:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).unwrap();
}

/// Title of an HTML document, if it has a non-blank one.
pub fn extract_title(html: &str) -> Option<String> {
    if let Some(caps) = TITLE_TAG.captures(html) {
        let title = clean(&caps[1]);
        if !title.is_empty() {
            return Some(title);
        }
    }

    let mut og_title = None;
    let mut name_title = None;
    for tag in META_TAG.find_iter(html) {
        let mut key = None;
        let mut content = None;
        for attr in ATTRIBUTE.captures_iter(tag.as_str()) {
            let value = attr.get(2).or_else(|| attr.get(3)).map(|m| m.as_str());
            match attr[1].to_ascii_lowercase().as_str() {
                "property" | "name" => {
                    if let Some(v) = value {
                        key.get_or_insert_with(|| v.to_ascii_lowercase());
                    }
                }
                "content" => content = value,
                _ => {}
            }
        }
        let Some(content) = content.map(clean).filter(|c| !c.is_empty()) else {
            continue;
        };
        match key.as_deref() {
            Some("og:title") if og_title.is_none() => og_title = Some(content),
            Some("title") if name_title.is_none() => name_title = Some(content),
            _ => {}
        }
    }
    og_title.or(name_title)
}

/// Collapses whitespace and decodes the handful of entities common in titles.
fn clean(raw: &str) -> String {
    let decoded = raw
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&#x27;", "'")
        .replace("&nbsp;", " ");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
