//! Built-in processors.
//!
//! The text transforms are intentionally forgiving; the parsing
//! transforms (`number`, `date`, `odds`) fail closed so a garbled
//! value falls back to the field default instead of landing in a
//! record looking legitimate.

use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::sync::Arc;

use crate::error::ProcessorFailure;

use super::{Processor, ProcessorArgs, Registry};

/// Register every built-in. Names are the public contract configs use.
pub fn register_builtins(registry: &mut Registry) {
    // Fresh registry, no duplicates possible.
    let entries: Vec<(&str, Arc<dyn Processor>)> = vec![
        ("trim", Arc::new(Trim)),
        ("clean_text", Arc::new(CleanText)),
        ("uppercase", Arc::new(Uppercase)),
        ("lowercase", Arc::new(Lowercase)),
        ("replace", Arc::new(Replace)),
        ("regex", Arc::new(RegexExtract)),
        ("strip_html", Arc::new(StripHtml)),
        ("absolute_url", Arc::new(AbsoluteUrl)),
        ("number", Arc::new(NumberCoerce)),
        ("date", Arc::new(DateParse)),
        ("split", Arc::new(Split)),
        ("odds", Arc::new(Odds)),
        ("outcome_prices", Arc::new(OutcomePrices)),
        ("volume", Arc::new(Volume)),
        ("market_status", Arc::new(MarketStatus)),
    ];
    for (name, processor) in entries {
        let _ = registry.register(name, processor);
    }
}

/// Render any JSON value as the string a text transform works on.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Emit whole numbers as integers so hashes and output stay tidy.
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

struct Trim;

impl Processor for Trim {
    fn apply(&self, value: Value, _: &ProcessorArgs) -> Result<Value, ProcessorFailure> {
        Ok(Value::String(as_text(&value).trim().to_string()))
    }
}

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("static regex"));

struct CleanText;

impl Processor for CleanText {
    fn apply(&self, value: Value, _: &ProcessorArgs) -> Result<Value, ProcessorFailure> {
        let text = as_text(&value);
        Ok(Value::String(
            WHITESPACE.replace_all(text.trim(), " ").into_owned(),
        ))
    }
}

struct Uppercase;

impl Processor for Uppercase {
    fn apply(&self, value: Value, _: &ProcessorArgs) -> Result<Value, ProcessorFailure> {
        Ok(Value::String(as_text(&value).to_uppercase()))
    }
}

struct Lowercase;

impl Processor for Lowercase {
    fn apply(&self, value: Value, _: &ProcessorArgs) -> Result<Value, ProcessorFailure> {
        Ok(Value::String(as_text(&value).to_lowercase()))
    }
}

struct Replace;

impl Processor for Replace {
    fn apply(&self, value: Value, args: &ProcessorArgs) -> Result<Value, ProcessorFailure> {
        let from = args
            .str("from")
            .ok_or_else(|| ProcessorFailure::new("replace", "missing 'from' arg"))?;
        let to = args.str("to").unwrap_or("");
        Ok(Value::String(as_text(&value).replace(from, to)))
    }
}

struct RegexExtract;

impl Processor for RegexExtract {
    fn apply(&self, value: Value, args: &ProcessorArgs) -> Result<Value, ProcessorFailure> {
        let pattern = args
            .str("pattern")
            .ok_or_else(|| ProcessorFailure::new("regex", "missing 'pattern' arg"))?;
        let re = Regex::new(pattern)
            .map_err(|e| ProcessorFailure::new("regex", format!("invalid pattern: {e}")))?;

        let text = as_text(&value);
        let captures = re
            .captures(&text)
            .ok_or_else(|| ProcessorFailure::new("regex", format!("no match in '{text}'")))?;

        // First capture group if the pattern has one, else the whole match.
        let matched = captures
            .get(1)
            .or_else(|| captures.get(0))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        Ok(Value::String(matched))
    }
}

static TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("static regex"));

struct StripHtml;

impl Processor for StripHtml {
    fn apply(&self, value: Value, _: &ProcessorArgs) -> Result<Value, ProcessorFailure> {
        let text = as_text(&value);
        let stripped = TAGS.replace_all(&text, " ");
        Ok(Value::String(
            WHITESPACE.replace_all(stripped.trim(), " ").into_owned(),
        ))
    }
}

struct AbsoluteUrl;

impl Processor for AbsoluteUrl {
    fn apply(&self, value: Value, args: &ProcessorArgs) -> Result<Value, ProcessorFailure> {
        let base = args
            .str("base")
            .ok_or_else(|| ProcessorFailure::new("absolute_url", "missing 'base' arg"))?;
        let base = url::Url::parse(base)
            .map_err(|e| ProcessorFailure::new("absolute_url", format!("invalid base: {e}")))?;
        let joined = base
            .join(as_text(&value).trim())
            .map_err(|e| ProcessorFailure::new("absolute_url", format!("join failed: {e}")))?;
        Ok(Value::String(joined.to_string()))
    }
}

struct NumberCoerce;

impl Processor for NumberCoerce {
    fn apply(&self, value: Value, args: &ProcessorArgs) -> Result<Value, ProcessorFailure> {
        if value.is_number() {
            return Ok(value);
        }

        let text = as_text(&value);
        let cleaned: String = text
            .chars()
            .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | '%' | ' ' | '\u{a0}'))
            .collect();

        if cleaned.trim().is_empty() {
            // Empty input coerces to the sentinel, not an error.
            let sentinel = args.f64("empty").unwrap_or(0.0);
            return Ok(number_value(sentinel));
        }

        cleaned
            .trim()
            .parse::<f64>()
            .map(number_value)
            .map_err(|_| ProcessorFailure::new("number", format!("not numeric: '{text}'")))
    }
}

struct DateParse;

impl Processor for DateParse {
    fn apply(&self, value: Value, args: &ProcessorArgs) -> Result<Value, ProcessorFailure> {
        let input_format = args
            .str("input_format")
            .ok_or_else(|| ProcessorFailure::new("date", "missing 'input_format' arg"))?;
        let output_format = args.str("output_format").unwrap_or("%Y-%m-%dT%H:%M:%S");

        let text = as_text(&value);
        let text = text.trim();

        if let Ok(dt) = NaiveDateTime::parse_from_str(text, input_format) {
            return Ok(Value::String(dt.format(output_format).to_string()));
        }
        if let Ok(date) = NaiveDate::parse_from_str(text, input_format) {
            if let Some(dt) = date.and_hms_opt(0, 0, 0) {
                return Ok(Value::String(dt.format(output_format).to_string()));
            }
        }

        // Fail closed: a guessed date is worse than no date.
        Err(ProcessorFailure::new(
            "date",
            format!("'{text}' does not match '{input_format}'"),
        ))
    }
}

struct Split;

impl Processor for Split {
    fn apply(&self, value: Value, args: &ProcessorArgs) -> Result<Value, ProcessorFailure> {
        let delimiter = args
            .str("delimiter")
            .ok_or_else(|| ProcessorFailure::new("split", "missing 'delimiter' arg"))?;
        let index = args.i64("index").unwrap_or(0);

        let text = as_text(&value);
        let parts: Vec<&str> = text.split(delimiter).collect();

        let resolved = if index < 0 {
            parts.len() as i64 + index
        } else {
            index
        };

        parts
            .get(usize::try_from(resolved).ok().unwrap_or(usize::MAX))
            .map(|part| Value::String(part.to_string()))
            .ok_or_else(|| {
                ProcessorFailure::new(
                    "split",
                    format!("index {index} out of range for {} parts", parts.len()),
                )
            })
    }
}

struct Odds;

impl Processor for Odds {
    fn apply(&self, value: Value, _: &ProcessorArgs) -> Result<Value, ProcessorFailure> {
        let text = as_text(&value);
        let text = text.trim();

        // Fractional: "5/2" → 1 + 5/2
        if let Some((num, den)) = text.split_once('/') {
            let num: f64 = num
                .trim()
                .parse()
                .map_err(|_| ProcessorFailure::new("odds", format!("bad fraction: '{text}'")))?;
            let den: f64 = den
                .trim()
                .parse()
                .map_err(|_| ProcessorFailure::new("odds", format!("bad fraction: '{text}'")))?;
            if den == 0.0 {
                return Err(ProcessorFailure::new("odds", "zero denominator"));
            }
            return Ok(Value::from(1.0 + num / den));
        }

        // American: "+150" / "-200"
        if text.starts_with('+') || text.starts_with('-') {
            if let Ok(american) = text.parse::<f64>() {
                let decimal = if american > 0.0 {
                    1.0 + american / 100.0
                } else {
                    1.0 + 100.0 / american.abs()
                };
                return Ok(Value::from(decimal));
            }
        }

        // Already decimal.
        text.parse::<f64>()
            .map(Value::from)
            .map_err(|_| ProcessorFailure::new("odds", format!("unrecognized odds: '{text}'")))
    }
}

struct OutcomePrices;

impl Processor for OutcomePrices {
    fn apply(&self, value: Value, args: &ProcessorArgs) -> Result<Value, ProcessorFailure> {
        let index = args.u64("index").unwrap_or(0) as usize;

        // Prices arrive either as a real array or a JSON-encoded string.
        let prices: Vec<Value> = match &value {
            Value::Array(items) => items.clone(),
            Value::String(s) => serde_json::from_str(s).map_err(|_| {
                ProcessorFailure::new("outcome_prices", format!("not a price array: '{s}'"))
            })?,
            other => {
                return Err(ProcessorFailure::new(
                    "outcome_prices",
                    format!("not a price array: {other}"),
                ))
            }
        };

        let price = prices.get(index).ok_or_else(|| {
            ProcessorFailure::new(
                "outcome_prices",
                format!("index {index} out of range for {} prices", prices.len()),
            )
        })?;

        match price {
            Value::Number(n) => Ok(Value::Number(n.clone())),
            Value::String(s) => s.trim().parse::<f64>().map(Value::from).map_err(|_| {
                ProcessorFailure::new("outcome_prices", format!("non-numeric price: '{s}'"))
            }),
            other => Err(ProcessorFailure::new(
                "outcome_prices",
                format!("non-numeric price: {other}"),
            )),
        }
    }
}

struct Volume;

impl Processor for Volume {
    fn apply(&self, value: Value, _: &ProcessorArgs) -> Result<Value, ProcessorFailure> {
        let volume = match &value {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map_err(|_| ProcessorFailure::new("volume", format!("not numeric: '{s}'")))?,
            other => {
                return Err(ProcessorFailure::new(
                    "volume",
                    format!("not numeric: {other}"),
                ))
            }
        };

        let formatted = if volume >= 1_000_000.0 {
            format!("{:.1}M", volume / 1_000_000.0)
        } else if volume >= 1_000.0 {
            format!("{:.1}K", volume / 1_000.0)
        } else {
            format!("{volume:.0}")
        };
        Ok(Value::String(formatted))
    }
}

struct MarketStatus;

impl Processor for MarketStatus {
    fn apply(&self, value: Value, _: &ProcessorArgs) -> Result<Value, ProcessorFailure> {
        let status = match &value {
            Value::Bool(true) => "open",
            Value::Bool(false) => "closed",
            other => match as_text(other).trim().to_lowercase().as_str() {
                "active" | "open" | "true" | "trading" => "open",
                "closed" | "resolved" | "false" | "settled" | "inactive" => "closed",
                unknown => {
                    return Err(ProcessorFailure::new(
                        "market_status",
                        format!("unrecognized status: '{unknown}'"),
                    ))
                }
            },
        };
        Ok(Value::String(status.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{global_registry, ProcessorChain};
    use crate::types::config::ProcessorSpec;
    use proptest::prelude::*;
    use serde_json::json;

    fn run(name: &str, value: Value, args: serde_json::Map<String, Value>) -> Result<Value, ProcessorFailure> {
        let processor = global_registry().get(name).unwrap();
        processor.apply(value, &ProcessorArgs::new(&args))
    }

    fn no_args() -> serde_json::Map<String, Value> {
        serde_json::Map::new()
    }

    fn args(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_trim_and_clean_text() {
        assert_eq!(run("trim", json!("  a b  "), no_args()).unwrap(), json!("a b"));
        assert_eq!(
            run("clean_text", json!("  a \n\t b  "), no_args()).unwrap(),
            json!("a b")
        );
    }

    #[test]
    fn test_number_tolerates_currency_and_separators() {
        assert_eq!(run("number", json!("1,234.50"), no_args()).unwrap(), json!(1234.5));
        assert_eq!(run("number", json!("$2,000"), no_args()).unwrap(), json!(2000));
        assert_eq!(run("number", json!("€15.99"), no_args()).unwrap(), json!(15.99));
        assert_eq!(run("number", json!(42), no_args()).unwrap(), json!(42));
    }

    #[test]
    fn test_number_empty_coerces_to_sentinel() {
        assert_eq!(run("number", json!(""), no_args()).unwrap(), json!(0));
        assert_eq!(
            run("number", json!("  "), args(&[("empty", json!(-1.0))])).unwrap(),
            json!(-1)
        );
    }

    #[test]
    fn test_number_fails_on_garbage() {
        assert!(run("number", json!("n/a"), no_args()).is_err());
    }

    #[test]
    fn test_date_parses_and_fails_closed() {
        let ok = run(
            "date",
            json!("2026-03-15"),
            args(&[("input_format", json!("%Y-%m-%d")), ("output_format", json!("%d/%m/%Y"))]),
        )
        .unwrap();
        assert_eq!(ok, json!("15/03/2026"));

        let err = run(
            "date",
            json!("March 15th"),
            args(&[("input_format", json!("%Y-%m-%d"))]),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_split_with_negative_index() {
        let a = args(&[("delimiter", json!(" - ")), ("index", json!(0))]);
        assert_eq!(run("split", json!("Lakers - Celtics"), a).unwrap(), json!("Lakers"));

        let b = args(&[("delimiter", json!(" - ")), ("index", json!(-1))]);
        assert_eq!(run("split", json!("Lakers - Celtics"), b).unwrap(), json!("Celtics"));

        let c = args(&[("delimiter", json!("|")), ("index", json!(5))]);
        assert!(run("split", json!("a|b"), c).is_err());
    }

    #[test]
    fn test_odds_formats() {
        assert_eq!(run("odds", json!("2.5"), no_args()).unwrap(), json!(2.5));
        assert_eq!(run("odds", json!("5/2"), no_args()).unwrap(), json!(3.5));
        assert_eq!(run("odds", json!("+150"), no_args()).unwrap(), json!(2.5));
        assert_eq!(run("odds", json!("-200"), no_args()).unwrap(), json!(1.5));
        assert!(run("odds", json!("evens-ish"), no_args()).is_err());
    }

    #[test]
    fn test_outcome_prices_from_encoded_string() {
        let encoded = json!("[0.45, 0.60]");
        assert_eq!(
            run("outcome_prices", encoded.clone(), no_args()).unwrap(),
            json!(0.45)
        );
        assert_eq!(
            run("outcome_prices", encoded, args(&[("index", json!(1))])).unwrap(),
            json!(0.6)
        );
        assert!(run("outcome_prices", json!("[0.45]"), args(&[("index", json!(3))])).is_err());
    }

    #[test]
    fn test_volume_magnitudes() {
        assert_eq!(run("volume", json!(1_230_000), no_args()).unwrap(), json!("1.2M"));
        assert_eq!(run("volume", json!(45_300), no_args()).unwrap(), json!("45.3K"));
        assert_eq!(run("volume", json!(850), no_args()).unwrap(), json!("850"));
    }

    #[test]
    fn test_market_status_normalization() {
        assert_eq!(run("market_status", json!("Active"), no_args()).unwrap(), json!("open"));
        assert_eq!(run("market_status", json!(false), no_args()).unwrap(), json!("closed"));
        assert!(run("market_status", json!("limbo"), no_args()).is_err());
    }

    #[test]
    fn test_strip_html_and_regex() {
        assert_eq!(
            run("strip_html", json!("<b>Lakers</b> <i>win</i>"), no_args()).unwrap(),
            json!("Lakers win")
        );
        assert_eq!(
            run(
                "regex",
                json!("Volume: $1.2M traded"),
                args(&[("pattern", json!(r"\$([\d.]+M)"))])
            )
            .unwrap(),
            json!("1.2M")
        );
    }

    #[test]
    fn test_absolute_url() {
        let a = args(&[("base", json!("https://example.com/events/"))]);
        assert_eq!(
            run("absolute_url", json!("../markets/42"), a).unwrap(),
            json!("https://example.com/markets/42")
        );
    }

    #[test]
    fn test_failed_chain_then_default_scenario() {
        // The engine falls back to the field default when a chain
        // fails; here we just confirm the chain reports the failure.
        let specs = vec![ProcessorSpec::named("number")];
        let chain = ProcessorChain::resolve(&specs, global_registry()).unwrap();
        assert!(chain.run(json!("not a number")).is_err());
    }

    proptest! {
        #[test]
        fn number_never_panics(input in ".*") {
            let _ = run("number", json!(input), no_args());
        }

        #[test]
        fn odds_never_panics(input in ".*") {
            let _ = run("odds", json!(input), no_args());
        }
    }
}
