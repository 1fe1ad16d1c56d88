//! Error classification.
//!
//! Maps whatever the host reports as a session error onto a
//! [`ParsedLimitError`] or rejects it. Pure and deterministic.

mod extractors;
mod patterns;

pub use patterns::{
    contains_token_limit_error, extract_message_index, extract_tokens, is_thinking_block_error,
    TOKEN_LIMIT_KEYWORDS,
};

use extractors::{collect_sources, embedded_json, Origin, TextSource};
use patterns::{mentions_token_limit, NON_EMPTY_CONTENT_MARKER};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitErrorKind {
    /// Both token counts were extracted.
    TokenLimit,
    /// Keyword match only; counts are zero.
    TokenLimitUnknownBounds,
    /// The provider rejected an empty message.
    NonEmptyContent,
}

/// Canonical form of a context-limit error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedLimitError {
    #[serde(rename = "currentTokens")]
    pub current_tokens: u64,
    #[serde(rename = "maxTokens")]
    pub max_tokens: u64,
    pub kind: LimitErrorKind,
    #[serde(rename = "errorType")]
    pub error_type: String,
    #[serde(rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
    #[serde(rename = "modelID", skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(rename = "messageIndex", skip_serializing_if = "Option::is_none")]
    pub message_index: Option<usize>,
}

impl ParsedLimitError {
    fn new(kind: LimitErrorKind, error_type: impl Into<String>) -> Self {
        Self {
            current_tokens: 0,
            max_tokens: 0,
            kind,
            error_type: error_type.into(),
            provider_id: None,
            model_id: None,
            request_id: None,
            message_index: None,
        }
    }

    fn with_bounds(mut self, (current, max): (u64, u64)) -> Self {
        self.current_tokens = current;
        self.max_tokens = max;
        self
    }

    /// Fill in provider/model identifiers that are not already known.
    pub fn with_model(mut self, provider_id: Option<String>, model_id: Option<String>) -> Self {
        if self.provider_id.is_none() {
            self.provider_id = provider_id;
        }
        if self.model_id.is_none() {
            self.model_id = model_id;
        }
        self
    }

    pub fn is_over_limit(&self) -> bool {
        self.current_tokens > self.max_tokens
    }

    pub fn is_non_empty_content(&self) -> bool {
        self.kind == LimitErrorKind::NonEmptyContent
    }

    pub fn is_prompt_too_long(&self) -> bool {
        !self.is_non_empty_content()
    }
}

/// Full classification of a raw session error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    TokenLimit(ParsedLimitError),
    NonEmptyContent(ParsedLimitError),
    /// Thinking-block ordering errors; excluded even when they mention tokens.
    ThinkingBlockStructural,
    NotApplicable,
}

impl ErrorClass {
    pub fn into_parsed(self) -> Option<ParsedLimitError> {
        match self {
            Self::TokenLimit(parsed) | Self::NonEmptyContent(parsed) => Some(parsed),
            Self::ThinkingBlockStructural | Self::NotApplicable => None,
        }
    }
}

/// Recoverable limit error, or `None` for anything else.
pub fn parse_limit_error(error: &Value) -> Option<ParsedLimitError> {
    classify_error(error).into_parsed()
}

pub fn classify_error(error: &Value) -> ErrorClass {
    let sources = collect_sources(error);

    if sources.iter().any(|s| is_thinking_block_error(&s.text)) {
        return ErrorClass::ThinkingBlockStructural;
    }
    if !sources.iter().any(|s| mentions_token_limit(&s.text)) {
        return ErrorClass::NotApplicable;
    }

    let combined = sources
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();

    if combined.contains(NON_EMPTY_CONTENT_MARKER) {
        let mut parsed =
            ParsedLimitError::new(LimitErrorKind::NonEmptyContent, NON_EMPTY_CONTENT_MARKER);
        parsed.message_index = extract_message_index(&combined);
        return ErrorClass::NonEmptyContent(parsed);
    }

    let body = sources.iter().find(|s| s.origin == Origin::ResponseBody);
    if let Some(parsed) = body.and_then(|b| parse_structured_body(&b.text)) {
        return ErrorClass::TokenLimit(parsed);
    }

    if let Some(bounds) = first_bounds(&sources) {
        return ErrorClass::TokenLimit(
            ParsedLimitError::new(LimitErrorKind::TokenLimit, "token_limit_exceeded")
                .with_bounds(bounds),
        );
    }

    if let Some(parsed) = body.and_then(|b| parse_bedrock_body(&b.text)) {
        return ErrorClass::TokenLimit(parsed);
    }

    ErrorClass::TokenLimit(ParsedLimitError::new(
        LimitErrorKind::TokenLimitUnknownBounds,
        "token_limit_exceeded_unknown",
    ))
}

fn first_bounds(sources: &[TextSource]) -> Option<(u64, u64)> {
    sources.iter().find_map(|s| extract_tokens(&s.text))
}

/// Anthropic-style `{"error": {"type", "message"}, "request_id"}` bodies.
fn parse_structured_body(body: &str) -> Option<ParsedLimitError> {
    embedded_json(body).into_iter().find_map(|doc| {
        let message = doc.pointer("/error/message").and_then(Value::as_str)?;
        let bounds = extract_tokens(message)?;
        let error_type = doc
            .pointer("/error/type")
            .and_then(Value::as_str)
            .unwrap_or("token_limit_exceeded");

        let mut parsed =
            ParsedLimitError::new(LimitErrorKind::TokenLimit, error_type).with_bounds(bounds);
        parsed.request_id = doc
            .get("request_id")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(parsed)
    })
}

/// Bedrock reports `{"message": "Input is too long for requested model."}`
/// with no counts.
fn parse_bedrock_body(body: &str) -> Option<ParsedLimitError> {
    embedded_json(body).into_iter().find_map(|doc| {
        let message = doc.get("message").and_then(Value::as_str)?;
        if !contains_token_limit_error(message) {
            return None;
        }
        Some(ParsedLimitError::new(
            LimitErrorKind::TokenLimitUnknownBounds,
            "bedrock_input_too_long",
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_too_long_plain_message() {
        let parsed = parse_limit_error(&json!({
            "message": "prompt is too long: 205000 tokens > 200000 maximum"
        }))
        .unwrap();
        assert_eq!(parsed.kind, LimitErrorKind::TokenLimit);
        assert_eq!(parsed.current_tokens, 205_000);
        assert_eq!(parsed.max_tokens, 200_000);
        assert!(parsed.is_over_limit());
        assert!(parsed.is_prompt_too_long());
    }

    #[test]
    fn test_plain_string_error() {
        let parsed = parse_limit_error(&json!("prompt is too long: 205000 tokens > 200000 maximum"))
            .unwrap();
        assert_eq!((parsed.current_tokens, parsed.max_tokens), (205_000, 200_000));
    }

    #[test]
    fn test_non_empty_content_with_index() {
        let class = classify_error(&json!({
            "data": {"message": "messages.3: all messages must have non-empty content"}
        }));
        let ErrorClass::NonEmptyContent(parsed) = class else {
            panic!("expected non-empty content, got {class:?}");
        };
        assert_eq!(parsed.error_type, "non-empty content");
        assert_eq!(parsed.message_index, Some(3));
        assert_eq!((parsed.current_tokens, parsed.max_tokens), (0, 0));
        assert!(!parsed.is_prompt_too_long());
    }

    #[test]
    fn test_thinking_block_error_rejected_despite_keywords() {
        let class = classify_error(&json!({
            "message": "Expected thinking block but found text; prompt is too long"
        }));
        assert_eq!(class, ErrorClass::ThinkingBlockStructural);
        assert!(parse_limit_error(&json!({
            "message": "Expected thinking block but found text; prompt is too long"
        }))
        .is_none());
    }

    #[test]
    fn test_unrelated_error_not_applicable() {
        assert_eq!(
            classify_error(&json!({"name": "APIError", "data": {"message": "overloaded"}})),
            ErrorClass::NotApplicable
        );
        assert_eq!(classify_error(&Value::Null), ErrorClass::NotApplicable);
        assert_eq!(classify_error(&json!(42)), ErrorClass::NotApplicable);
    }

    #[test]
    fn test_structured_response_body_wins() {
        let body = json!({
            "type": "error",
            "error": {
                "type": "invalid_request_error",
                "message": "prompt is too long: 212345 tokens > 200000 maximum"
            },
            "request_id": "req_011"
        })
        .to_string();
        let parsed = parse_limit_error(&json!({
            "name": "APIError",
            "data": {"message": "Bad Request", "responseBody": body}
        }))
        .unwrap();
        assert_eq!(parsed.error_type, "invalid_request_error");
        assert_eq!(parsed.request_id.as_deref(), Some("req_011"));
        assert_eq!((parsed.current_tokens, parsed.max_tokens), (212_345, 200_000));
    }

    #[test]
    fn test_sse_response_body() {
        let body = "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"invalid_request_error\",\"message\":\"prompt is too long: 201000 tokens > 200000 maximum\"}}";
        let parsed = parse_limit_error(&json!({"data": {"responseBody": body}})).unwrap();
        assert_eq!(parsed.error_type, "invalid_request_error");
        assert_eq!(parsed.current_tokens, 201_000);
    }

    #[test]
    fn test_bedrock_body_without_numbers() {
        let parsed = parse_limit_error(&json!({
            "data": {"responseBody": "{\"message\":\"Input is too long for requested model.\"}"}
        }))
        .unwrap();
        assert_eq!(parsed.error_type, "bedrock_input_too_long");
        assert_eq!(parsed.kind, LimitErrorKind::TokenLimitUnknownBounds);
        assert!(!parsed.is_over_limit());
    }

    #[test]
    fn test_keyword_only_is_unknown_bounds() {
        let parsed = parse_limit_error(&json!({"error": {"message": "context_length_exceeded"}}))
            .unwrap();
        assert_eq!(parsed.kind, LimitErrorKind::TokenLimitUnknownBounds);
        assert_eq!(parsed.error_type, "token_limit_exceeded_unknown");
        assert_eq!((parsed.current_tokens, parsed.max_tokens), (0, 0));
    }

    #[test]
    fn test_nested_error_message() {
        let parsed = parse_limit_error(&json!({
            "error": {"error": {"message": "input length 150000 tokens exceeds the limit of 128000"}}
        }))
        .unwrap();
        assert_eq!((parsed.current_tokens, parsed.max_tokens), (150_000, 128_000));
    }

    #[test]
    fn test_serialized_fallback_for_unknown_shape() {
        let parsed = parse_limit_error(&json!({"status": 400, "kind": "too many tokens"})).unwrap();
        assert_eq!(parsed.kind, LimitErrorKind::TokenLimitUnknownBounds);
    }

    #[test]
    fn test_with_model_keeps_existing_identifiers() {
        let parsed = parse_limit_error(&json!("prompt is too long"))
            .unwrap()
            .with_model(Some("anthropic".into()), None)
            .with_model(Some("openai".into()), Some("claude-sonnet-4".into()));
        assert_eq!(parsed.provider_id.as_deref(), Some("anthropic"));
        assert_eq!(parsed.model_id.as_deref(), Some("claude-sonnet-4"));
    }

    #[test]
    fn test_serialized_field_names() {
        let parsed = parse_limit_error(&json!("messages.2: all messages must have non-empty content"))
            .unwrap();
        let value = serde_json::to_value(&parsed).unwrap();
        assert_eq!(value["errorType"], "non-empty content");
        assert_eq!(value["messageIndex"], 2);
        assert_eq!(value["currentTokens"], 0);
        assert_eq!(value["kind"], "non_empty_content");
    }
}
