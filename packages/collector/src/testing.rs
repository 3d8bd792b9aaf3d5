//! Testing utilities including mock implementations.
//!
//! These are useful for testing applications that use the collection
//! engine without a network or a browser: a canned-document fetcher,
//! a scripted page driver, and sample document generators.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{FetchError, FetchResult};
use crate::extract::dom;
use crate::fetch::{DomainPolicy, FetchRequest, Fetcher, PageAction, PageDriver};
use crate::types::config::{ScrollDirection, SelectChoice};
use crate::types::document::{Document, ResponseDocument};

/// Record of a call made to a mock fetcher.
#[derive(Debug, Clone)]
pub enum MockFetchCall {
    Fetch { url: String },
    CurrentDocument,
    Perform { action: String },
    Close,
}

/// A fetcher serving canned documents by URL.
///
/// Tracks every call for assertions. Unknown URLs return a 404-class
/// error; page actions are unsupported, matching the HTTP strategies.
#[derive(Default)]
pub struct MockFetcher {
    documents: HashMap<String, ResponseDocument>,
    policy: DomainPolicy,
    last: Option<ResponseDocument>,
    calls: Arc<RwLock<Vec<MockFetchCall>>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a document for a URL.
    pub fn with_document(mut self, url: impl Into<String>, document: Document) -> Self {
        let url = url.into();
        self.documents
            .insert(url.clone(), ResponseDocument::new(url, document));
        self
    }

    pub fn with_policy(mut self, policy: DomainPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Shared handle to the call log.
    pub fn calls(&self) -> Arc<RwLock<Vec<MockFetchCall>>> {
        self.calls.clone()
    }

    fn record(&self, call: MockFetchCall) {
        if let Ok(mut calls) = self.calls.write() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&mut self, request: &FetchRequest) -> FetchResult<ResponseDocument> {
        self.record(MockFetchCall::Fetch {
            url: request.url.clone(),
        });
        self.policy.check(&request.url)?;

        let document = self
            .documents
            .get(&request.url)
            .cloned()
            .ok_or_else(|| FetchError::Status {
                status: 404,
                url: request.url.clone(),
            })?;
        self.last = Some(document.clone());
        Ok(document)
    }

    async fn current_document(&mut self) -> FetchResult<ResponseDocument> {
        self.record(MockFetchCall::CurrentDocument);
        self.last.clone().ok_or(FetchError::NoDocument)
    }

    async fn perform(&mut self, action: &PageAction) -> FetchResult<usize> {
        self.record(MockFetchCall::Perform {
            action: action.describe(),
        });
        Err(FetchError::Unsupported {
            strategy: "mock".to_string(),
            action: action.describe(),
        })
    }

    async fn close(&mut self) -> FetchResult<()> {
        self.record(MockFetchCall::Close);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// One page the scripted driver can be on.
#[derive(Debug, Clone)]
pub struct PageState {
    pub url: String,
    pub html: String,
}

impl PageState {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }
}

/// A page driver over scripted page states.
///
/// Navigation looks pages up by URL; clicks consume per-selector
/// transition scripts. Everything else evaluates against the current
/// page's HTML, so wait and miss behavior matches a real page without
/// a browser.
pub struct ScriptedDriver {
    current: PageState,
    pages: HashMap<String, String>,
    click_scripts: HashMap<String, VecDeque<PageState>>,
    actions: Arc<RwLock<Vec<String>>>,
}

impl ScriptedDriver {
    pub fn new(initial: PageState) -> Self {
        let mut pages = HashMap::new();
        pages.insert(initial.url.clone(), initial.html.clone());
        Self {
            current: initial,
            pages,
            click_scripts: HashMap::new(),
            actions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Add a page reachable by navigation.
    pub fn with_page(mut self, state: PageState) -> Self {
        self.pages.insert(state.url.clone(), state.html);
        self
    }

    /// Script the next click on a selector to land on a page state.
    /// Repeated calls queue further transitions for the same selector.
    pub fn on_click(mut self, selector: impl Into<String>, next: PageState) -> Self {
        self.click_scripts
            .entry(selector.into())
            .or_default()
            .push_back(next);
        self
    }

    /// Shared handle to the action log.
    pub fn actions(&self) -> Arc<RwLock<Vec<String>>> {
        self.actions.clone()
    }

    fn log(&self, action: String) {
        if let Ok(mut actions) = self.actions.write() {
            actions.push(action);
        }
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn goto(&mut self, url: &str) -> FetchResult<()> {
        self.log(format!("goto {url}"));
        let html = self.pages.get(url).cloned().unwrap_or_default();
        self.current = PageState::new(url, html);
        Ok(())
    }

    async fn content(&mut self) -> FetchResult<String> {
        Ok(self.current.html.clone())
    }

    async fn current_url(&mut self) -> FetchResult<String> {
        Ok(self.current.url.clone())
    }

    async fn click(&mut self, selector: &str, all_matching: bool) -> FetchResult<usize> {
        self.log(format!("click {selector}"));

        if let Some(queue) = self.click_scripts.get_mut(selector) {
            if let Some(next) = queue.pop_front() {
                self.pages.insert(next.url.clone(), next.html.clone());
                self.current = next;
                return Ok(1);
            }
        }

        let matches = dom::count_matches(&self.current.html, selector);
        if all_matching {
            Ok(matches)
        } else {
            Ok(matches.min(1))
        }
    }

    async fn fill(&mut self, selector: &str, value: &str, _clear_first: bool) -> FetchResult<()> {
        self.log(format!("fill {selector}={value}"));
        if dom::count_matches(&self.current.html, selector) == 0 {
            return Err(FetchError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        Ok(())
    }

    async fn select_option(&mut self, selector: &str, choice: &SelectChoice) -> FetchResult<()> {
        self.log(format!("select {selector} {choice:?}"));
        if dom::count_matches(&self.current.html, selector) == 0 {
            return Err(FetchError::ElementNotFound {
                selector: selector.to_string(),
            });
        }
        Ok(())
    }

    async fn scroll(
        &mut self,
        direction: ScrollDirection,
        _amount: Option<u32>,
        _selector: Option<&str>,
    ) -> FetchResult<()> {
        self.log(format!("scroll {direction:?}"));
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> FetchResult<()> {
        self.log(format!("wait {selector}"));
        if dom::count_matches(&self.current.html, selector) > 0 {
            return Ok(());
        }
        // The page never changes on its own, so a miss is a timeout.
        tokio::time::sleep(timeout).await;
        Err(FetchError::Timeout {
            url: self.current.url.clone(),
        })
    }

    async fn close(&mut self) -> FetchResult<()> {
        self.log("close".to_string());
        Ok(())
    }
}

/// Generate a bookmaker-style odds page with `n` market rows.
pub fn sample_odds_html(n: usize) -> String {
    let mut rows = String::new();
    for i in 0..n {
        rows.push_str(&format!(
            r#"<div class="market" data-id="m{i}">
                 <span class="name">Team {i} v Team {next}</span>
                 <span class="price">{price:.2}</span>
               </div>"#,
            i = i,
            next = i + 1,
            price = 1.5 + i as f64 * 0.25,
        ));
    }
    format!(r#"<html><body><div class="markets">{rows}</div></body></html>"#)
}

/// Generate a prediction-market API response with `n` markets.
pub fn sample_markets_json(n: usize) -> serde_json::Value {
    let markets: Vec<serde_json::Value> = (0..n)
        .map(|i| {
            serde_json::json!({
                "id": format!("{}", 1000 + i),
                "question": format!("Will outcome {i} happen?"),
                "outcomePrices": format!("[{:.2}, {:.2}]", 0.3 + i as f64 * 0.01, 0.7 - i as f64 * 0.01),
                "volume": 50_000 + i * 1_000,
                "active": true,
            })
        })
        .collect();
    serde_json::Value::Array(markets)
}
