use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use serde::Deserialize;

use crate::core::errors::SyncError;
use crate::core::transfer::DocumentPageAccessor;

/// What the extension's page script reports about the active editor tab.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSnapshot {
    #[serde(default)]
    pub url: Option<String>,
    /// Set when the page script already resolved the download link itself.
    #[serde(default)]
    pub download_url: Option<String>,
    /// Markup of the editor toolbar (or the whole page) to scan for the link.
    #[serde(default)]
    pub html: Option<String>,
}

/// Finds the compiled-PDF download link in a page snapshot.
pub struct SnapshotPageAccessor {
    snapshot: PageSnapshot,
}

impl SnapshotPageAccessor {
    pub fn new(snapshot: PageSnapshot) -> Self {
        Self { snapshot }
    }

    fn link_from_html(&self) -> Option<String> {
        let html = self.snapshot.html.as_deref()?;
        let href = download_anchor_href(html)?;
        resolve(self.snapshot.url.as_deref(), &href)
    }
}

fn anchor_pattern() -> &'static Regex {
    static ANCHOR: OnceLock<Regex> = OnceLock::new();
    ANCHOR.get_or_init(|| Regex::new(r"(?is)<a\b[^>]*>").expect("valid anchor regex"))
}

fn label_pattern() -> &'static Regex {
    static LABEL: OnceLock<Regex> = OnceLock::new();
    LABEL.get_or_init(|| {
        Regex::new(r#"(?i)\baria-label\s*=\s*["']Download PDF["']"#).expect("valid label regex")
    })
}

fn href_pattern() -> &'static Regex {
    static HREF: OnceLock<Regex> = OnceLock::new();
    HREF.get_or_init(|| {
        Regex::new(r#"(?i)\bhref\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid href regex")
    })
}

/// The `href` of the first `<a aria-label="Download PDF">` in `html`.
fn download_anchor_href(html: &str) -> Option<String> {
    anchor_pattern()
        .find_iter(html)
        .map(|tag| tag.as_str())
        .filter(|tag| label_pattern().is_match(tag))
        .find_map(|tag| {
            let captures = href_pattern().captures(tag)?;
            let raw = captures.get(1).or_else(|| captures.get(2))?.as_str();
            let href = raw.replace("&amp;", "&");
            (!href.trim().is_empty()).then_some(href)
        })
}

/// Makes `href` absolute, using the page URL as the base for relative links.
fn resolve(base: Option<&str>, href: &str) -> Option<String> {
    if let Ok(url) = Url::parse(href) {
        return Some(url.to_string());
    }
    let base = Url::parse(base?).ok()?;
    base.join(href).ok().map(|url| url.to_string())
}

#[async_trait]
impl DocumentPageAccessor for SnapshotPageAccessor {
    fn page_url(&self) -> Option<&str> {
        self.snapshot.url.as_deref()
    }

    async fn find_download_link(&self) -> Result<Option<String>, SyncError> {
        if let Some(url) = self
            .snapshot
            .download_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
        {
            return Ok(resolve(self.snapshot.url.as_deref(), url));
        }
        Ok(self.link_from_html())
    }
}
