//! Entity extraction from dream text.
//!
//! Two strategies are available:
//! - **Primary**: ask a language model for the proper nouns in the text
//! - **Fallback**: scan the text for runs of capitalized words
//!
//! The primary strategy is only tried when a [`CompletionService`] is
//! configured. Any failure on that path demotes the call to the fallback, so
//! extraction itself never fails.

use crate::config::ExtractionConfig;
use crate::normalize::normalize;
use async_trait::async_trait;
use gemini::{FinishReason, Gemini, Response};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors from the primary extraction path. These never leave this module.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("Completion service error: {0}")]
    Service(#[from] gemini::Error),

    #[error("Completion timed out after {0:?}")]
    Timeout(Duration),

    #[error("Completion was blocked: {0}")]
    Blocked(String),

    #[error("{0}")]
    Other(String),
}

/// An external text-completion oracle.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Complete a single prompt.
    async fn complete(&self, prompt: &str) -> Result<String, ExtractionError>;
}

#[async_trait]
impl CompletionService for Gemini {
    async fn complete(&self, prompt: &str) -> Result<String, ExtractionError> {
        let response = Gemini::complete(self, prompt).await?;
        completion_text(response)
    }
}

/// Text of a completion. An empty completion cut off for any reason other
/// than a normal stop or the token limit counts as blocked.
pub fn completion_text(response: Response) -> Result<String, ExtractionError> {
    let text = response.text();
    if text.trim().is_empty() {
        match response.finish_reason {
            FinishReason::Stop | FinishReason::MaxTokens => {}
            blocked => return Err(ExtractionError::Blocked(format!("{blocked:?}"))),
        }
    }
    Ok(text)
}

/// Which strategy produced an extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Primary,
    Fallback,
}

impl Strategy {
    /// Lowercase name for logs and output.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Primary => "primary",
            Strategy::Fallback => "fallback",
        }
    }
}

/// Result of an extraction, tagged with the strategy that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// `None` when the text was blank and nothing ran.
    pub used: Option<Strategy>,
    pub entities: Vec<String>,
}

/// Extracts normalized entity names from dream text.
#[derive(Clone)]
pub struct EntityExtractor {
    service: Option<Arc<dyn CompletionService>>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for EntityExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityExtractor")
            .field("primary_available", &self.primary_available())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl EntityExtractor {
    /// An extractor that only ever uses the fallback strategy.
    pub fn fallback_only() -> Self {
        Self {
            service: None,
            timeout: None,
        }
    }

    /// An extractor backed by the given completion service.
    pub fn with_service(service: Arc<dyn CompletionService>) -> Self {
        Self {
            service: Some(service),
            timeout: None,
        }
    }

    /// Build an extractor from configuration.
    ///
    /// Without an API key this is [`EntityExtractor::fallback_only`].
    pub fn from_config(config: &ExtractionConfig) -> Self {
        match &config.api_key {
            Some(key) => {
                let client = Gemini::new(key.clone())
                    .with_model(config.model.clone())
                    .with_timeout(config.timeout);
                Self::with_service(Arc::new(client)).with_timeout(config.timeout)
            }
            None => {
                tracing::warn!("no extraction API key configured, using fallback extractor");
                Self::fallback_only()
            }
        }
    }

    /// Bound every primary-path call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Whether the primary strategy will be attempted.
    pub fn primary_available(&self) -> bool {
        self.service.is_some()
    }

    /// Extract entities from `text`.
    pub async fn extract(&self, text: &str) -> Vec<String> {
        self.extract_tagged(text).await.entities
    }

    /// Extract entities from `text`, reporting which strategy was used.
    pub async fn extract_tagged(&self, text: &str) -> Extraction {
        if text.trim().is_empty() {
            return Extraction {
                used: None,
                entities: Vec::new(),
            };
        }

        let Some(service) = &self.service else {
            tracing::debug!("no completion service, using fallback extractor");
            return Extraction {
                used: Some(Strategy::Fallback),
                entities: extract_fallback(text),
            };
        };

        match self.extract_primary(service.as_ref(), text).await {
            Ok(entities) => Extraction {
                used: Some(Strategy::Primary),
                entities,
            },
            Err(e) => {
                tracing::warn!(error = %e, "primary extraction failed, using fallback extractor");
                Extraction {
                    used: Some(Strategy::Fallback),
                    entities: extract_fallback(text),
                }
            }
        }
    }

    async fn extract_primary(
        &self,
        service: &dyn CompletionService,
        text: &str,
    ) -> Result<Vec<String>, ExtractionError> {
        let prompt = extraction_prompt(text);
        let completion = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, service.complete(&prompt))
                .await
                .map_err(|_| ExtractionError::Timeout(limit))??,
            None => service.complete(&prompt).await?,
        };

        tracing::info!(response = %completion, "completion response");
        Ok(normalize(split_completion(&completion)))
    }
}

/// The instruction sent to the completion service.
pub fn extraction_prompt(text: &str) -> String {
    format!(
        "Extract all proper nouns (people, places, objects, named things) \
         from the following dream entry. Return them as a comma-separated list.\n\n\
         Dream: {text}"
    )
}

/// Split a completion into raw candidates on line breaks, commas and
/// semicolons.
pub fn split_completion(completion: &str) -> Vec<&str> {
    completion
        .split(is_line_break)
        .flat_map(|line| line.split(','))
        .flat_map(|part| part.split(';'))
        .filter(|fragment| !fragment.is_empty())
        .collect()
}

/// Run the fallback strategy and normalize its candidates.
pub fn extract_fallback(text: &str) -> Vec<String> {
    normalize(capitalized_runs(text))
}

/// Find runs of capitalized words in `text`.
///
/// A capitalized word is an ASCII uppercase letter followed by one or more
/// ASCII lowercase letters, bounded on both sides by non-word characters.
/// Consecutive such words separated only by whitespace form one run.
pub fn capitalized_runs(text: &str) -> Vec<&str> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let mut runs = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let at_boundary = i == 0 || !is_word_char(chars[i - 1].1);
        let first_word_end = if at_boundary { word_end(&chars, i) } else { None };

        let Some(mut end) = first_word_end else {
            i += 1;
            continue;
        };

        loop {
            let mut next = end;
            while next < chars.len() && chars[next].1.is_whitespace() {
                next += 1;
            }
            if next == end {
                break;
            }
            match word_end(&chars, next) {
                Some(word_end) => end = word_end,
                None => break,
            }
        }

        let start_byte = chars[i].0;
        let end_byte = chars.get(end).map_or(text.len(), |&(byte, _)| byte);
        runs.push(&text[start_byte..end_byte]);
        i = end;
    }

    runs
}

/// End index of a capitalized word starting at `start`, if one starts there.
fn word_end(chars: &[(usize, char)], start: usize) -> Option<usize> {
    if !chars.get(start)?.1.is_ascii_uppercase() {
        return None;
    }

    let mut end = start + 1;
    while end < chars.len() && chars[end].1.is_ascii_lowercase() {
        end += 1;
    }

    if end == start + 1 {
        return None;
    }
    if end < chars.len() && is_word_char(chars[end].1) {
        return None;
    }
    Some(end)
}

fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r'
            | '\u{0b}'
            | '\u{0c}'
            | '\u{1c}'..='\u{1e}'
            | '\u{85}'
            | '\u{2028}'
            | '\u{2029}'
    )
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockCompletion;

    #[test]
    fn test_capitalized_runs_basic() {
        let runs = capitalized_runs("I met Sarah Connor near the Eiffel Tower.");
        assert_eq!(runs, vec!["Sarah Connor", "Eiffel Tower"]);
    }

    #[test]
    fn test_single_letter_words_are_not_names() {
        assert!(capitalized_runs("I saw A cat").is_empty());
    }

    #[test]
    fn test_runs_stop_at_lowercase_word() {
        let runs = capitalized_runs("Paris and Rome were flooded");
        assert_eq!(runs, vec!["Paris", "Rome"]);
    }

    #[test]
    fn test_runs_span_any_whitespace() {
        let runs = capitalized_runs("The\n  Great   Gatsby danced");
        assert_eq!(runs, vec!["The\n  Great   Gatsby"]);
    }

    #[test]
    fn test_mixed_case_words_are_skipped() {
        // "McDonald" is not one capitalized word, and its tail starts mid-word.
        assert!(capitalized_runs("McDonald HTML iPhone").is_empty());
    }

    #[test]
    fn test_word_followed_by_digit_is_skipped() {
        assert_eq!(capitalized_runs("Room101 and Hall"), vec!["Hall"]);
    }

    #[test]
    fn test_run_keeps_valid_prefix() {
        assert_eq!(capitalized_runs("Sarah ConnorX"), vec!["Sarah"]);
    }

    #[test]
    fn test_non_ascii_tail_breaks_word() {
        assert_eq!(capitalized_runs("Café Luna"), vec!["Luna"]);
    }

    #[test]
    fn test_punctuation_bounds_words() {
        let runs = capitalized_runs("(Alice), \"Bob\"; Carol's dog");
        assert_eq!(runs, vec!["Alice", "Bob", "Carol"]);
    }

    #[test]
    fn test_fallback_dedupes() {
        let out = extract_fallback("Luna saw Luna and then Luna Park");
        assert_eq!(out, vec!["Luna", "Luna Park"]);
    }

    #[test]
    fn test_split_completion() {
        let parts = split_completion("Paris, Rome\nLondon; Berlin,,\n\n Oslo ");
        assert_eq!(parts, vec!["Paris", " Rome", "London", " Berlin", " Oslo "]);
    }

    #[test]
    fn test_split_completion_on_any_line_break() {
        let parts = split_completion("Paris\rRome\r\nOslo\u{2028}Lima\u{0c}Kyiv");
        assert_eq!(parts, vec!["Paris", "Rome", "Oslo", "Lima", "Kyiv"]);
        assert_eq!(
            normalize(split_completion("paris\rrome")),
            vec!["Paris", "Rome"]
        );
    }

    fn response(parts: &[&str], finish_reason: FinishReason) -> Response {
        Response {
            parts: parts.iter().map(|p| p.to_string()).collect(),
            finish_reason,
        }
    }

    #[test]
    fn test_completion_text_joins_parts() {
        let text = completion_text(response(&["Paris, ", "Rome"], FinishReason::Stop)).unwrap();
        assert_eq!(text, "Paris, Rome");
    }

    #[test]
    fn test_completion_text_with_text_ignores_finish_reason() {
        let text = completion_text(response(&["Paris"], FinishReason::Safety)).unwrap();
        assert_eq!(text, "Paris");
    }

    #[test]
    fn test_empty_completion_after_normal_stop_is_kept() {
        assert_eq!(completion_text(response(&[], FinishReason::Stop)).unwrap(), "");
        assert_eq!(
            completion_text(response(&["  "], FinishReason::MaxTokens)).unwrap(),
            "  "
        );
    }

    #[test]
    fn test_empty_completion_when_cut_off_is_blocked() {
        for reason in [
            FinishReason::Safety,
            FinishReason::Recitation,
            FinishReason::Other("BLOCKLIST".to_string()),
        ] {
            let result = completion_text(response(&[], reason));
            assert!(matches!(result, Err(ExtractionError::Blocked(_))));
        }
    }

    #[test]
    fn test_prompt_contains_text() {
        let prompt = extraction_prompt("a red door");
        assert!(prompt.contains("comma-separated list"));
        assert!(prompt.ends_with("Dream: a red door"));
    }

    #[tokio::test]
    async fn test_fallback_without_service() {
        let extractor = EntityExtractor::fallback_only();
        let result = extractor
            .extract_tagged("I met Sarah Connor near the Eiffel Tower.")
            .await;
        assert_eq!(result.used, Some(Strategy::Fallback));
        assert_eq!(result.entities, vec!["Sarah Connor", "Eiffel Tower"]);
    }

    #[tokio::test]
    async fn test_blank_text_skips_service() {
        let mock = Arc::new(MockCompletion::new(vec![Ok("Paris".to_string())]));
        let extractor = EntityExtractor::with_service(mock.clone());

        assert!(extractor.extract("").await.is_empty());
        let result = extractor.extract_tagged("   ").await;
        assert_eq!(result.used, None);
        assert!(result.entities.is_empty());
        assert_eq!(mock.calls(), 0);
    }

    #[tokio::test]
    async fn test_primary_output_is_split_and_normalized() {
        let mock = Arc::new(MockCompletion::new(vec![Ok(
            "sarah connor, EIFFEL tower\nParis; paris".to_string(),
        )]));
        let extractor = EntityExtractor::with_service(mock.clone());

        let result = extractor.extract_tagged("whatever happened").await;
        assert_eq!(result.used, Some(Strategy::Primary));
        assert_eq!(result.entities, vec!["Sarah Connor", "Eiffel Tower", "Paris"]);
        assert_eq!(mock.calls(), 1);
        assert!(mock.prompts()[0].contains("Dream: whatever happened"));
    }

    #[tokio::test]
    async fn test_primary_empty_completion_is_not_a_failure() {
        let mock = Arc::new(MockCompletion::new(vec![Ok(String::new())]));
        let extractor = EntityExtractor::with_service(mock);

        let result = extractor.extract_tagged("Nothing But Names Here").await;
        assert_eq!(result.used, Some(Strategy::Primary));
        assert!(result.entities.is_empty());
    }

    #[tokio::test]
    async fn test_service_error_demotes_to_fallback() {
        let mock = Arc::new(MockCompletion::new(vec![Err("connection refused".to_string())]));
        let extractor = EntityExtractor::with_service(mock.clone());

        let result = extractor.extract_tagged("Dinner with Frida Kahlo in Mexico").await;
        assert_eq!(result.used, Some(Strategy::Fallback));
        assert_eq!(result.entities, vec!["Dinner", "Frida Kahlo", "Mexico"]);
        assert_eq!(mock.calls(), 1);
    }

    #[tokio::test]
    async fn test_timeout_demotes_to_fallback() {
        let mock = Arc::new(
            MockCompletion::new(vec![Ok("Never Seen".to_string())])
                .with_delay(Duration::from_millis(200)),
        );
        let extractor =
            EntityExtractor::with_service(mock).with_timeout(Duration::from_millis(10));

        let result = extractor.extract_tagged("A walk through Central Park").await;
        assert_eq!(result.used, Some(Strategy::Fallback));
        assert_eq!(result.entities, vec!["Central Park"]);
    }

    #[test]
    fn test_from_config_without_key() {
        let extractor = EntityExtractor::from_config(&ExtractionConfig::default());
        assert!(!extractor.primary_available());
    }

    #[test]
    fn test_from_config_with_key() {
        let config = ExtractionConfig {
            api_key: Some("key".to_string()),
            ..ExtractionConfig::default()
        };
        let extractor = EntityExtractor::from_config(&config);
        assert!(extractor.primary_available());
        assert_eq!(extractor.timeout, Some(config.timeout));
    }

    #[test]
    fn test_strategy_names() {
        assert_eq!(Strategy::Primary.name(), "primary");
        assert_eq!(Strategy::Fallback.name(), "fallback");
        assert_eq!(serde_json::to_value(Strategy::Fallback).unwrap(), "fallback");
    }
}
