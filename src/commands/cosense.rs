//! Cosense (Scrapbox) wiki commands.
//!
//! Two read-only endpoints are used:
//! - `GET {base}/pages/{project}/search/query?q=...` — structured search result
//! - `GET {base}/pages/{project}/{title}/text` — raw page text
//!
//! Anything other than HTTP 200 is an absent result, not an error: the
//! model gets `null` back and can decide how to answer without the page.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};
use url::Url;

use super::Handler;
use crate::config::CosenseConfig;

/// Read access to one Cosense project.
#[async_trait]
pub trait CosenseApi: Send + Sync {
    /// Full-text search. Whitespace-separated terms are ANDed and a
    /// leading `-` excludes a term; the backend interprets the syntax.
    async fn search(&self, query: &str) -> Result<Option<Value>>;

    /// Plain text of the page titled `title`.
    async fn page_text(&self, title: &str) -> Result<Option<String>>;
}

// ── CosenseClient ────────────────────────────────────────

/// HTTP client for the Cosense REST API.
pub struct CosenseClient {
    client: Client,
    base_url: Url,
    project: String,
}

impl CosenseClient {
    pub fn new(config: &CosenseConfig) -> Result<Self> {
        if config.project.is_empty() {
            anyhow::bail!("invalid project name");
        }
        let base_url = Url::parse(&config.base_url)
            .map_err(|e| anyhow!("invalid Cosense base URL '{}': {e}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("invalid Cosense base URL '{}'", config.base_url);
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            project: config.project.clone(),
        })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// `{base}/pages/{project}/{segments...}`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Checked in `new()`: the base URL can always take path segments
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["pages", self.project.as_str()])
                .extend(segments);
        }
        url
    }
}

#[async_trait]
impl CosenseApi for CosenseClient {
    async fn search(&self, query: &str) -> Result<Option<Value>> {
        let url = self.endpoint(&["search", "query"]);
        debug!("Cosense search ({}): {query}", self.project);

        let response = self.client.get(url).query(&[("q", query)]).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!("Cosense search returned {status} for '{query}'");
            return Ok(None);
        }

        Ok(Some(response.json().await?))
    }

    async fn page_text(&self, title: &str) -> Result<Option<String>> {
        let url = self.endpoint(&[title, "text"]);
        debug!("Cosense page text ({}): {title}", self.project);

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!("Cosense page '{title}' returned {status}");
            return Ok(None);
        }

        Ok(Some(response.text().await?))
    }
}

// ── Commands ─────────────────────────────────────────────

#[derive(Debug, Deserialize, PartialEq)]
pub struct SearchArgs {
    pub query: String,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct PageTextArgs {
    #[serde(rename = "pageTitle")]
    pub page_title: String,
}

/// `search_stackchan_cosense` — summary search over the wiki.
pub struct SearchCommand {
    api: Arc<dyn CosenseApi>,
}

impl SearchCommand {
    pub fn new(api: Arc<dyn CosenseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Handler for SearchCommand {
    type Args = SearchArgs;
    type Output = Option<Value>;

    fn name(&self) -> &'static str {
        "search_stackchan_cosense"
    }

    fn description(&self) -> &'static str {
        "ｽﾀｯｸﾁｬﾝのCosense（wikiページ）から関連情報のサマリを検索します。\
         詳細は検索結果のpages[].titleを用いてget_stackchan_cosense_page_textで取得できます。"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "検索キーワード。スペース区切りでand、ハイフンでexclude。"
                }
            },
            "required": ["query"]
        })
    }

    async fn run(&self, args: SearchArgs) -> Result<Option<Value>> {
        self.api.search(&args.query).await
    }
}

/// `get_stackchan_cosense_page_text` — full text of one wiki page.
pub struct PageTextCommand {
    api: Arc<dyn CosenseApi>,
}

impl PageTextCommand {
    pub fn new(api: Arc<dyn CosenseApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Handler for PageTextCommand {
    type Args = PageTextArgs;
    type Output = Option<String>;

    fn name(&self) -> &'static str {
        "get_stackchan_cosense_page_text"
    }

    fn description(&self) -> &'static str {
        "ｽﾀｯｸﾁｬﾝのScrapbox（wikiページ）で特定のページのテキストを取得します。"
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pageTitle": {
                    "type": "string",
                    "description": "ページ名。"
                }
            },
            "required": ["pageTitle"]
        })
    }

    async fn run(&self, args: PageTextArgs) -> Result<Option<String>> {
        self.api.page_text(&args.page_title).await
    }
}
