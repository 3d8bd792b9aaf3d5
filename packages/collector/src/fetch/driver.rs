//! Page driver seam for browser-backed strategies.
//!
//! The engine never talks to a browser process. Browser and
//! interactive fetchers drive whatever implements [`PageDriver`]:
//! the CDP driver behind the `browser` feature in production, a
//! scripted driver in tests.

use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::error::FetchResult;
use crate::types::config::{FetcherConfig, ScrollDirection, SelectChoice};

/// A live browser page the engine can read and drive.
///
/// The engine reads page state (element counts, select options)
/// from `content()` snapshots, so the surface stays write-oriented.
#[async_trait]
pub trait PageDriver: Send {
    async fn goto(&mut self, url: &str) -> FetchResult<()>;

    /// Current rendered markup.
    async fn content(&mut self) -> FetchResult<String>;

    async fn current_url(&mut self) -> FetchResult<String>;

    /// Click matching elements. Returns how many were clicked;
    /// zero means the selector missed.
    async fn click(&mut self, selector: &str, all_matching: bool) -> FetchResult<usize>;

    async fn fill(&mut self, selector: &str, value: &str, clear_first: bool) -> FetchResult<()>;

    async fn select_option(&mut self, selector: &str, choice: &SelectChoice) -> FetchResult<()>;

    async fn scroll(
        &mut self,
        direction: ScrollDirection,
        amount: Option<u32>,
        selector: Option<&str>,
    ) -> FetchResult<()>;

    /// Block until the selector matches or the timeout passes.
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> FetchResult<()>;

    async fn close(&mut self) -> FetchResult<()>;
}

pub type BoxedDriver = Box<dyn PageDriver>;

pub type DriverFuture = Pin<Box<dyn Future<Output = FetchResult<BoxedDriver>> + Send>>;

/// Builds a fresh page driver for a run. Supplied by the embedding
/// application; the library ships none by default.
pub type DriverFactory = Arc<dyn Fn(&FetcherConfig) -> DriverFuture + Send + Sync>;
