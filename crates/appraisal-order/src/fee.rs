//! Fee resolution.
//!
//! The fee display does not reliably expose its value through any single text
//! accessor, so a fixed chain of strategies is tried in order and the first
//! one yielding a currency-like value wins. The order reflects what has
//! worked against the live form so far; it is a heuristic, not a contract.

use crate::errors::ExtractionError;
use crate::locator::Locator;
use crate::platforms::{DocumentEngine, TextChannel};
use crate::selector::Selector;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// A value that is nothing but an amount, e.g. `42`, `$1,250.00`.
static WHOLE_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\$?\s*(?P<int>\d{1,3}(?:,\d{3})+|\d+)(?P<cents>\.\d{1,2})?$")
        .expect("valid amount pattern")
});

/// An amount embedded in other text. The dollar sign is mandatory here so
/// that zip codes and element ids are not mistaken for a fee.
static EMBEDDED_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\s*(?P<int>\d{1,3}(?:,\d{3})+|\d+)(?P<cents>\.\d{1,2})?")
        .expect("valid currency pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Generated content, quotes stripped
    S1,
    /// Rendered text
    S2,
    /// Raw text content
    S3,
    /// Currency pattern over rendered text
    S4,
    /// Currency pattern over generated content
    S5,
    /// Serialized content range
    S6,
}

impl Strategy {
    pub const ORDER: [Strategy; 6] = [
        Strategy::S1,
        Strategy::S2,
        Strategy::S3,
        Strategy::S4,
        Strategy::S5,
        Strategy::S6,
    ];

    /// The channel this strategy reads. S4 and S5 reuse the reads of S2 and S1.
    pub fn channel(&self) -> TextChannel {
        match self {
            Strategy::S1 | Strategy::S5 => TextChannel::GeneratedContent,
            Strategy::S2 | Strategy::S4 => TextChannel::RenderedText,
            Strategy::S3 => TextChannel::TextContent,
            Strategy::S6 => TextChannel::RangeText,
        }
    }

    /// Try to pull a normalized amount out of what the channel returned.
    pub fn extract(&self, raw: &str) -> Option<String> {
        match self {
            Strategy::S1 => whole_amount(&clean_generated(raw)),
            Strategy::S2 | Strategy::S3 => whole_amount(raw),
            Strategy::S4 | Strategy::S6 => embedded_amount(raw),
            Strategy::S5 => embedded_amount(&clean_generated(raw)),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeExtractionResult {
    pub strategy: Strategy,
    /// The channel's text as read, before cleaning.
    pub raw: String,
    pub normalized: Option<String>,
}

/// Strip the quoting CSS puts around `content` values, plus escapes.
pub fn clean_generated(raw: &str) -> String {
    let trimmed = raw.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(trimmed);
    unquoted.replace('\\', "").trim().to_string()
}

/// `$` + integer digits without separators + cents if present.
pub fn normalize_amount(int_part: &str, cents: Option<&str>) -> String {
    let digits: String = int_part.chars().filter(|c| c.is_ascii_digit()).collect();
    format!("${digits}{}", cents.unwrap_or_default())
}

fn whole_amount(text: &str) -> Option<String> {
    let caps = WHOLE_AMOUNT.captures(text.trim())?;
    Some(normalize_amount(&caps["int"], caps.name("cents").map(|m| m.as_str())))
}

fn embedded_amount(text: &str) -> Option<String> {
    let caps = EMBEDDED_AMOUNT.captures(text)?;
    Some(normalize_amount(&caps["int"], caps.name("cents").map(|m| m.as_str())))
}

/// Resolves the fee from one designated display element.
pub struct FeeResolver {
    engine: Arc<dyn DocumentEngine>,
    selector: Selector,
    element_timeout: Duration,
    settle_delay: Duration,
    strategy_timeout: Duration,
}

impl FeeResolver {
    pub fn new(engine: Arc<dyn DocumentEngine>, selector: impl Into<Selector>) -> Self {
        Self {
            engine,
            selector: selector.into(),
            element_timeout: Duration::from_secs(10),
            settle_delay: Duration::from_secs(3),
            strategy_timeout: Duration::from_secs(2),
        }
    }

    /// How long the element may take to appear.
    pub fn element_timeout(mut self, timeout: Duration) -> Self {
        self.element_timeout = timeout;
        self
    }

    /// Pause between the element appearing and the first read.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn strategy_timeout(mut self, timeout: Duration) -> Self {
        self.strategy_timeout = timeout;
        self
    }

    #[instrument(level = "info", skip(self), fields(selector = %self.selector))]
    pub async fn resolve(&self) -> Result<FeeExtractionResult, ExtractionError> {
        let locator = Locator::new(self.engine.clone(), self.selector.clone())
            .set_default_timeout(self.element_timeout);
        locator
            .wait(None)
            .await
            .map_err(|e| ExtractionError::ElementMissing {
                selector: self.selector.to_string(),
                reason: e.to_string(),
            })?;

        tokio::time::sleep(self.settle_delay).await;

        let mut reads: HashMap<TextChannel, Option<String>> = HashMap::new();
        for strategy in Strategy::ORDER {
            let channel = strategy.channel();
            let text = match reads.get(&channel) {
                Some(cached) => cached.clone(),
                None => {
                    let read = match locator.read(channel, self.strategy_timeout).await {
                        Ok(text) => text,
                        Err(e) => {
                            debug!(%strategy, ?channel, "Read failed: {}", e);
                            None
                        }
                    };
                    reads.insert(channel, read.clone());
                    read
                }
            };

            let Some(raw) = text else {
                debug!(%strategy, ?channel, "Channel empty");
                continue;
            };
            if let Some(normalized) = strategy.extract(&raw) {
                info!(%strategy, fee = %normalized, "Fee resolved");
                return Ok(FeeExtractionResult {
                    strategy,
                    raw,
                    normalized: Some(normalized),
                });
            }
            debug!(%strategy, raw = %raw, "No amount in channel");
        }

        Err(ExtractionError::NoStrategyMatched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_generated_strips_quotes() {
        assert_eq!(clean_generated("\"42\""), "42");
        assert_eq!(clean_generated("'$450'"), "$450");
        assert_eq!(clean_generated("  \"\\$300\"  "), "$300");
        assert_eq!(clean_generated("plain"), "plain");
    }

    #[test]
    fn test_whole_amount_only_accepts_bare_amounts() {
        assert_eq!(whole_amount("42").as_deref(), Some("$42"));
        assert_eq!(whole_amount(" $1,250.00 ").as_deref(), Some("$1250.00"));
        assert_eq!(whole_amount("$ 475").as_deref(), Some("$475"));
        assert_eq!(whole_amount("Fee: $42"), None);
        assert_eq!(whole_amount("1,25"), None);
        assert_eq!(whole_amount(""), None);
    }

    #[test]
    fn test_embedded_amount_requires_dollar_sign() {
        assert_eq!(embedded_amount("Lender fee: $450 due").as_deref(), Some("$450"));
        assert_eq!(
            embedded_amount("<span id=\"fee9\">$2,100.5</span>").as_deref(),
            Some("$2100.5")
        );
        assert_eq!(embedded_amount("zip 07751"), None);
        assert_eq!(embedded_amount("Fee:\u{a0}$\u{a0}450").as_deref(), Some("$450"));
    }

    #[test]
    fn test_strategy_channels() {
        assert_eq!(Strategy::S1.channel(), Strategy::S5.channel());
        assert_eq!(Strategy::S2.channel(), Strategy::S4.channel());
        assert_eq!(Strategy::S3.channel(), TextChannel::TextContent);
        assert_eq!(Strategy::S6.channel(), TextChannel::RangeText);
    }

    #[test]
    fn test_extract_per_strategy() {
        assert_eq!(Strategy::S1.extract("\"42\"").as_deref(), Some("$42"));
        assert_eq!(Strategy::S1.extract("\"Fee $42\""), None);
        assert_eq!(Strategy::S5.extract("\"Fee $42\"").as_deref(), Some("$42"));
        assert_eq!(Strategy::S2.extract("Fee $42"), None);
        assert_eq!(Strategy::S4.extract("Fee $42").as_deref(), Some("$42"));
    }

    #[test]
    fn test_strategy_serializes_as_id() {
        assert_eq!(serde_json::to_string(&Strategy::S3).unwrap(), "\"S3\"");
        assert_eq!(Strategy::S6.to_string(), "S6");
    }
}
