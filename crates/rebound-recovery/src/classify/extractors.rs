//! Shape-specific text extractors.
//!
//! Each extractor inspects one known error shape and returns the text it
//! finds there. [`collect_sources`] runs them in priority order.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin {
    Plain,
    ResponseBody,
    Field(&'static str),
    Serialized,
}

#[derive(Debug, Clone)]
pub(crate) struct TextSource {
    pub origin: Origin,
    pub text: String,
}

type Extractor = fn(&Value) -> Vec<TextSource>;

const EXTRACTORS: &[Extractor] = &[
    plain_string,
    response_body,
    top_level_message,
    error_message,
    descriptive_fields,
    nested_error_message,
    data_fields,
];

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(*key))
        .and_then(Value::as_str)
}

fn field(value: &Value, path: &[&str], name: &'static str) -> Vec<TextSource> {
    str_at(value, path)
        .map(|text| TextSource {
            origin: Origin::Field(name),
            text: text.to_string(),
        })
        .into_iter()
        .collect()
}

fn plain_string(value: &Value) -> Vec<TextSource> {
    value
        .as_str()
        .map(|text| TextSource {
            origin: Origin::Plain,
            text: text.to_string(),
        })
        .into_iter()
        .collect()
}

fn response_body(value: &Value) -> Vec<TextSource> {
    str_at(value, &["data", "responseBody"])
        .map(|text| TextSource {
            origin: Origin::ResponseBody,
            text: text.to_string(),
        })
        .into_iter()
        .collect()
}

fn top_level_message(value: &Value) -> Vec<TextSource> {
    field(value, &["message"], "message")
}

fn error_message(value: &Value) -> Vec<TextSource> {
    field(value, &["error", "message"], "error.message")
}

fn descriptive_fields(value: &Value) -> Vec<TextSource> {
    ["body", "details", "reason", "description"]
        .into_iter()
        .flat_map(|key| field(value, &[key], key))
        .collect()
}

fn nested_error_message(value: &Value) -> Vec<TextSource> {
    field(value, &["error", "error", "message"], "error.error.message")
}

fn data_fields(value: &Value) -> Vec<TextSource> {
    let mut sources = field(value, &["data", "message"], "data.message");
    sources.extend(field(value, &["data", "error"], "data.error"));
    sources.extend(field(
        value,
        &["data", "error", "message"],
        "data.error.message",
    ));
    sources
}

/// All candidate texts in priority order. When no known field carries text,
/// the serialized value is the only candidate.
pub(crate) fn collect_sources(value: &Value) -> Vec<TextSource> {
    let sources: Vec<TextSource> = EXTRACTORS.iter().flat_map(|ex| ex(value)).collect();
    if !sources.is_empty() || value.is_null() {
        return sources;
    }
    vec![TextSource {
        origin: Origin::Serialized,
        text: value.to_string(),
    }]
}

/// JSON documents embedded in a response body: the body itself, the last
/// SSE `data:` payload, or the outermost `{...}` span.
pub(crate) fn embedded_json(body: &str) -> Vec<Value> {
    let mut candidates: Vec<&str> = vec![body.trim()];

    if let Some(idx) = body.rfind("data:") {
        let tail = body[idx + "data:".len()..].trim();
        if tail.starts_with('{') {
            candidates.push(tail);
        }
    }

    if let (Some(start), Some(end)) = (body.find('{'), body.rfind('}')) {
        if end > start {
            candidates.push(&body[start..=end]);
        }
    }

    candidates
        .into_iter()
        .filter_map(|c| serde_json::from_str::<Value>(c).ok())
        .filter(Value::is_object)
        .collect()
}
