//! Chrome DevTools Protocol page driver, behind the `browser` feature.
//!
//! Launches a Chromium instance per driver via chromiumoxide. Element
//! interactions that chromiumoxide does not expose directly (clearing
//! inputs, selecting options, scrolling) go through page JavaScript.

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::error::{FetchError, FetchResult};
use crate::types::config::{FetcherConfig, ScrollDirection, SelectChoice};

use super::driver::{BoxedDriver, DriverFactory, PageDriver};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct CdpDriver {
    browser: Browser,
    page: Page,
    event_task: JoinHandle<()>,
    last_url: String,
}

fn session_err(e: impl std::fmt::Display) -> FetchError {
    FetchError::Session(e.to_string())
}

/// Embed a string into generated JavaScript safely.
fn js_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

impl CdpDriver {
    pub async fn launch(config: &FetcherConfig) -> FetchResult<Self> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .request_timeout(Duration::from_millis(config.timeout_ms));
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(viewport) = config.viewport {
            builder = builder.window_size(viewport.width, viewport.height);
        }

        let browser_config = builder.build().map_err(FetchError::Session)?;
        let (browser, mut events) = Browser::launch(browser_config).await.map_err(session_err)?;

        let event_task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(session_err)?;

        Ok(Self {
            browser,
            page,
            event_task,
            last_url: String::new(),
        })
    }

    /// A driver factory wiring this driver into `build_fetcher`.
    pub fn factory() -> DriverFactory {
        Arc::new(|config: &FetcherConfig| {
            let config = config.clone();
            Box::pin(async move {
                let driver = CdpDriver::launch(&config).await?;
                Ok(Box::new(driver) as BoxedDriver)
            })
        })
    }
}

#[async_trait]
impl PageDriver for CdpDriver {
    async fn goto(&mut self, url: &str) -> FetchResult<()> {
        self.page.goto(url).await.map_err(session_err)?;
        self.last_url = url.to_string();
        Ok(())
    }

    async fn content(&mut self) -> FetchResult<String> {
        self.page.content().await.map_err(session_err)
    }

    async fn current_url(&mut self) -> FetchResult<String> {
        let url = self.page.url().await.map_err(session_err)?;
        Ok(url.unwrap_or_else(|| self.last_url.clone()))
    }

    async fn click(&mut self, selector: &str, all_matching: bool) -> FetchResult<usize> {
        if all_matching {
            let elements = self
                .page
                .find_elements(selector)
                .await
                .unwrap_or_default();
            let total = elements.len();
            for element in elements {
                element.click().await.map_err(session_err)?;
            }
            Ok(total)
        } else {
            match self.page.find_element(selector).await {
                Ok(element) => {
                    element.click().await.map_err(session_err)?;
                    Ok(1)
                }
                Err(_) => Ok(0),
            }
        }
    }

    async fn fill(&mut self, selector: &str, value: &str, clear_first: bool) -> FetchResult<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| FetchError::ElementNotFound {
                selector: selector.to_string(),
            })?;

        if clear_first {
            let js = format!(
                "document.querySelector({}).value = ''",
                js_string(selector)
            );
            self.page.evaluate(js).await.map_err(session_err)?;
        }

        element.click().await.map_err(session_err)?;
        element.type_str(value).await.map_err(session_err)?;
        Ok(())
    }

    async fn select_option(&mut self, selector: &str, choice: &SelectChoice) -> FetchResult<()> {
        let pick = match choice {
            SelectChoice::Value { value } => format!("el.value = {};", js_string(value)),
            SelectChoice::Text { text } => format!(
                "const want = {}; \
                 for (let i = 0; i < el.options.length; i++) {{ \
                   if (el.options[i].textContent.trim() === want) {{ el.selectedIndex = i; break; }} \
                 }}",
                js_string(text)
            ),
            SelectChoice::Index { index } => format!("el.selectedIndex = {index};"),
        };

        let js = format!(
            "(() => {{ const el = document.querySelector({}); if (!el) return false; \
             {} el.dispatchEvent(new Event('change', {{bubbles: true}})); return true; }})()",
            js_string(selector),
            pick
        );

        let found: bool = self
            .page
            .evaluate(js)
            .await
            .map_err(session_err)?
            .into_value()
            .map_err(session_err)?;

        if found {
            Ok(())
        } else {
            Err(FetchError::ElementNotFound {
                selector: selector.to_string(),
            })
        }
    }

    async fn scroll(
        &mut self,
        direction: ScrollDirection,
        amount: Option<u32>,
        selector: Option<&str>,
    ) -> FetchResult<()> {
        let js = match direction {
            ScrollDirection::Down => match amount {
                Some(px) => format!("window.scrollBy(0, {px});"),
                None => "window.scrollBy(0, window.innerHeight);".to_string(),
            },
            ScrollDirection::Up => match amount {
                Some(px) => format!("window.scrollBy(0, -{px});"),
                None => "window.scrollBy(0, -window.innerHeight);".to_string(),
            },
            ScrollDirection::ToElement => {
                let Some(selector) = selector else {
                    // Also rejected at validation; the session is still fine.
                    return Err(FetchError::Unsupported {
                        strategy: "browser".to_string(),
                        action: "scroll to_element without a selector".to_string(),
                    });
                };
                format!(
                    "(() => {{ const el = document.querySelector({}); \
                     if (el) el.scrollIntoView(); return !!el; }})()",
                    js_string(selector)
                )
            }
        };

        self.page.evaluate(js).await.map_err(session_err)?;
        Ok(())
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> FetchResult<()> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.page.find_element(selector).await.is_ok() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(FetchError::Timeout {
                    url: self.last_url.clone(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn close(&mut self) -> FetchResult<()> {
        let _ = self.browser.close().await;
        self.event_task.abort();
        Ok(())
    }
}
