//! Run a paginated scrape end to end without a network or a browser.
//!
//! A scripted page driver stands in for Chromium: the config walks
//! two pages of markets via a pagination loop and prints the outcome.
//!
//! Run with: cargo run --example run_scripted

use std::sync::Arc;

use collector::testing::{PageState, ScriptedDriver};
use collector::{DriverFactory, PageDriver, Pipeline, ScrapeConfig};

const CONFIG: &str = r#"
meta:
  name: scripted-bookmaker
  start_url: https://book.test/markets
fetcher:
  type: interactive
instructions:
  - type: loop
    iterator: pagination
    next_selector: ".next"
    max_iterations: 5
    instructions:
      - type: collect
        name: odds
        container_selector: ".markets"
        item_selector: ".market"
        fields:
          event:
            selector: ".name"
            required: true
          price:
            selector: ".price"
            processors: [number]
            default: 0
"#;

fn page(url: &str, rows: &[(&str, &str)], has_next: bool) -> PageState {
    let mut markets = String::new();
    for (name, price) in rows {
        markets.push_str(&format!(
            r#"<div class="market"><span class="name">{name}</span><span class="price">{price}</span></div>"#
        ));
    }
    let next = if has_next {
        r#"<a class="next">more</a>"#
    } else {
        ""
    };
    PageState::new(
        url,
        format!(r#"<div class="markets">{markets}</div>{next}"#),
    )
}

fn driver_factory() -> DriverFactory {
    Arc::new(|_config| {
        Box::pin(async {
            let driver = ScriptedDriver::new(page(
                "https://book.test/markets",
                &[("Lakers v Celtics", "2.10"), ("Heat v Bulls", "1.85")],
                true,
            ))
            .on_click(
                ".next",
                page(
                    "https://book.test/markets?page=2",
                    &[("Knicks v Nets", "3.40")],
                    false,
                ),
            );
            Ok(Box::new(driver) as Box<dyn PageDriver>)
        })
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("collector=debug")
        .init();

    let config = ScrapeConfig::from_yaml(CONFIG)?;
    let outcome = Pipeline::new()
        .with_driver_factory(driver_factory())
        .run(&config)
        .await?;

    println!(
        "run {:?}: {} records, {} failures",
        outcome.status,
        outcome.record_count(),
        outcome.failures.len()
    );
    for record in &outcome.records {
        println!(
            "  {} @ {}",
            record
                .field_value("event")
                .and_then(|v| v.as_str())
                .unwrap_or("?"),
            record.field_value("price").map(ToString::to_string).unwrap_or_default()
        );
    }
    Ok(())
}
