//! Browser-backed fetch strategies.
//!
//! Both strategies drive a [`PageDriver`](super::PageDriver) and
//! never touch a browser process directly. `browser` renders a page
//! per navigation; `interactive` keeps the session and additionally
//! forwards page actions, which is what pagination and dropdown
//! loops need.

use async_trait::async_trait;
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::types::document::{Document, ResponseDocument};

use super::{BoxedDriver, DomainPolicy, FetchRequest, Fetcher, PageAction};

struct DriverSession {
    driver: BoxedDriver,
    policy: DomainPolicy,
    visited: bool,
}

impl DriverSession {
    async fn render(&mut self, request: &FetchRequest) -> FetchResult<ResponseDocument> {
        self.policy.check(&request.url)?;

        tokio::time::timeout(request.timeout, self.driver.goto(&request.url))
            .await
            .map_err(|_| FetchError::Timeout {
                url: request.url.clone(),
            })??;
        self.visited = true;

        debug!(url = %request.url, "rendered page");
        self.snapshot().await
    }

    /// Re-read the live page. The DOM may have changed since the last
    /// navigation, so this never caches.
    async fn snapshot(&mut self) -> FetchResult<ResponseDocument> {
        if !self.visited {
            return Err(FetchError::NoDocument);
        }
        let content = self.driver.content().await?;
        let url = self.driver.current_url().await?;
        Ok(ResponseDocument::new(url, Document::html(content)))
    }
}

pub struct BrowserFetcher {
    session: DriverSession,
}

impl BrowserFetcher {
    pub fn new(driver: BoxedDriver, policy: DomainPolicy) -> Self {
        Self {
            session: DriverSession {
                driver,
                policy,
                visited: false,
            },
        }
    }
}

#[async_trait]
impl Fetcher for BrowserFetcher {
    async fn fetch(&mut self, request: &FetchRequest) -> FetchResult<ResponseDocument> {
        self.session.render(request).await
    }

    async fn current_document(&mut self) -> FetchResult<ResponseDocument> {
        self.session.snapshot().await
    }

    async fn close(&mut self) -> FetchResult<()> {
        self.session.driver.close().await
    }

    fn name(&self) -> &'static str {
        "browser"
    }
}

pub struct InteractiveFetcher {
    session: DriverSession,
}

impl InteractiveFetcher {
    pub fn new(driver: BoxedDriver, policy: DomainPolicy) -> Self {
        Self {
            session: DriverSession {
                driver,
                policy,
                visited: false,
            },
        }
    }
}

#[async_trait]
impl Fetcher for InteractiveFetcher {
    async fn fetch(&mut self, request: &FetchRequest) -> FetchResult<ResponseDocument> {
        self.session.render(request).await
    }

    async fn current_document(&mut self) -> FetchResult<ResponseDocument> {
        self.session.snapshot().await
    }

    async fn perform(&mut self, action: &PageAction) -> FetchResult<usize> {
        if !self.session.visited {
            return Err(FetchError::NoDocument);
        }

        let driver = &mut self.session.driver;
        match action {
            PageAction::Click {
                selector,
                all_matching,
            } => driver.click(selector, *all_matching).await,
            PageAction::Fill {
                selector,
                value,
                clear_first,
            } => {
                driver.fill(selector, value, *clear_first).await?;
                Ok(1)
            }
            PageAction::SelectOption { selector, choice } => {
                driver.select_option(selector, choice).await?;
                Ok(1)
            }
            PageAction::Scroll {
                direction,
                amount,
                selector,
            } => {
                driver
                    .scroll(*direction, *amount, selector.as_deref())
                    .await?;
                Ok(1)
            }
            PageAction::WaitForSelector { selector, timeout } => {
                driver.wait_for_selector(selector, *timeout).await?;
                Ok(1)
            }
        }
    }

    async fn close(&mut self) -> FetchResult<()> {
        self.session.driver.close().await
    }

    fn name(&self) -> &'static str {
        "interactive"
    }
}
