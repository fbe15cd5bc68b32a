//! Web search over DuckDuckGo's HTML endpoint.
//!
//! The results page is scraped for titles, links and snippets; no API key is
//! needed.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use super::registry::Tool;
use super::types::{ToolDefinition, ToolResult};

pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

const MAX_RESULTS: usize = 5;
const REQUEST_TIMEOUT_SECS: u64 = 15;

static RESULT_LINK: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"(?s)<a([^>]*class="[^"]*result__a[^"]*"[^>]*)>(.*?)</a>"#).ok());
static RESULT_SNIPPET: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r#"(?s)class="[^"]*result__snippet[^"]*"[^>]*>(.*?)</(?:a|td|div|span)>"#).ok());
static HREF: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r#"href="([^"]*)""#).ok());
static TAG: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"<[^>]+>").ok());

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub struct WebSearchTool {
    endpoint: String,
    max_results: usize,
}

impl WebSearchTool {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            max_results: MAX_RESULTS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Params {
    query: String,
}

#[async_trait]
impl Tool for WebSearchTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "web_search".to_string(),
            description: "Searches the web and returns the top results with their links. \
                Use it to check current CRA rules, rates and limits."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {"type": "string", "description": "The search query"}
                },
                "required": ["query"]
            }),
        }
    }

    async fn execute(&self, params: Value) -> ToolResult {
        let params: Params = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };
        let query = params.query.trim();
        if query.is_empty() {
            return ToolResult::error("'query' is required");
        }

        let url = format!("{}?q={}", self.endpoint, urlencoding::encode(query));
        let response = match crate::http::shared_client()
            .get(&url)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .header("User-Agent", "Mozilla/5.0 (compatible; FinancialAdvisor/1.0)")
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("Search request failed: {}", e)),
        };

        if !response.status().is_success() {
            return ToolResult::error(format!("Search failed with status {}", response.status()));
        }

        let html = match response.text().await {
            Ok(body) => body,
            Err(e) => return ToolResult::error(format!("Failed to read search results: {}", e)),
        };

        let hits = parse_results(&html, self.max_results);
        log::info!("[TOOLS] web_search '{}' returned {} result(s)", query, hits.len());
        if hits.is_empty() {
            return ToolResult::error(format!("No results found for '{}'. Try a less specific query.", query));
        }

        ToolResult::success(format_hits(&hits))
    }
}

fn format_hits(hits: &[SearchHit]) -> String {
    let entries: Vec<String> = hits
        .iter()
        .map(|h| {
            if h.snippet.is_empty() {
                format!("[{}]({})", h.title, h.url)
            } else {
                format!("[{}]({})\n{}", h.title, h.url, h.snippet)
            }
        })
        .collect();
    format!("## Search Results\n\n{}", entries.join("\n\n"))
}

/// Pull result titles, links and snippets out of a results page.
fn parse_results(html: &str, limit: usize) -> Vec<SearchHit> {
    let (Some(link_re), Some(snippet_re)) = (RESULT_LINK.as_ref(), RESULT_SNIPPET.as_ref()) else {
        return Vec::new();
    };

    let links: Vec<_> = link_re.captures_iter(html).collect();
    let mut hits = Vec::new();

    for (i, caps) in links.iter().enumerate() {
        let (Some(whole), Some(attrs), Some(title)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let Some(url) = HREF
            .as_ref()
            .and_then(|re| re.captures(attrs.as_str()))
            .and_then(|c| c.get(1))
            .map(|m| resolve_link(m.as_str()))
        else {
            continue;
        };

        // The snippet belongs to this result if it sits before the next title
        let section_end = links
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(html.len());
        let snippet = snippet_re
            .captures(&html[whole.end()..section_end])
            .and_then(|c| c.get(1))
            .map(|m| clean_text(m.as_str()))
            .unwrap_or_default();

        hits.push(SearchHit {
            title: clean_text(title.as_str()),
            url,
            snippet,
        });
        if hits.len() >= limit {
            break;
        }
    }
    hits
}

/// Unwrap DuckDuckGo's `/l/?uddg=` redirect links.
fn resolve_link(href: &str) -> String {
    let href = decode_entities(href);
    if let Some(start) = href.find("uddg=") {
        let encoded = href[start + 5..].split('&').next().unwrap_or_default();
        if let Ok(decoded) = urlencoding::decode(encoded) {
            return decoded.into_owned();
        }
    }
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{}", rest);
    }
    href
}

fn clean_text(fragment: &str) -> String {
    let stripped = match TAG.as_ref() {
        Some(re) => re.replace_all(fragment, ""),
        None => fragment.into(),
    };
    decode_entities(&stripped)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn decode_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
