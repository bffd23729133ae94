//! Model response parsing.
//!
//! Pulls the answer text out of a back-end response, strips markdown
//! decoration, and parses structured output with a tolerant grammar:
//!
//! 1. strict JSON of the whole text;
//! 2. strict JSON of the first balanced `{...}` span;
//! 3. that span after relaxation: single-quoted strings become
//!    double-quoted, `True`/`False`/`None` become `true`/`false`/`null`,
//!    and trailing commas before `}` or `]` are dropped.
//!
//! Anything else is rejected.

use serde_json::{Map, Value};

use crate::request::ApiType;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("response has no text for api type '{0}'")]
    NoText(ApiType),
    #[error("no JSON object found in model output")]
    NoObject,
    #[error("model output is not a JSON object")]
    NotAnObject,
    #[error("invalid structured output: {0}")]
    Invalid(String),
}

/// Answer text of a `generate` or `chat` response, passed through [`unmark`].
///
/// Missing fields yield an empty string; `embeddings` responses carry no
/// text and are an error.
pub fn extract_text(body: &Value, api_type: ApiType) -> Result<String, ParseError> {
    let raw = match api_type {
        ApiType::Chat => body
            .get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .unwrap_or(""),
        ApiType::Generate => body.get("response").and_then(|r| r.as_str()).unwrap_or(""),
        ApiType::Embeddings => return Err(ParseError::NoText(api_type)),
    };
    Ok(unmark(raw))
}

/// Strip markdown decoration from model output.
///
/// Drops code-fence lines, leading heading markers, and bold markers, then
/// trims the result.
pub fn unmark(text: &str) -> String {
    let mut lines = Vec::new();
    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") {
            continue;
        }
        let line = match trimmed.strip_prefix('#') {
            Some(_) => trimmed.trim_start_matches('#').trim_start(),
            None => line,
        };
        lines.push(line.replace("**", ""));
    }
    lines.join("\n").trim().to_string()
}

/// Parse model output into a JSON object.
pub fn parse_structured(text: &str) -> Result<Map<String, Value>, ParseError> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return into_object(value);
    }

    let span = first_object_span(trimmed).ok_or(ParseError::NoObject)?;
    if let Ok(value) = serde_json::from_str::<Value>(span) {
        return into_object(value);
    }

    let relaxed = relax(span);
    serde_json::from_str::<Value>(&relaxed)
        .map_err(|e| ParseError::Invalid(e.to_string()))
        .and_then(into_object)
}

fn into_object(value: Value) -> Result<Map<String, Value>, ParseError> {
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ParseError::NotAnObject),
    }
}

/// The first balanced `{...}` span, honouring both quote styles.
fn first_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + c.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Rewrite a literal-style object into strict JSON.
fn relax(span: &str) -> String {
    let chars: Vec<char> = span.chars().collect();
    let mut out = String::with_capacity(span.len());
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                i = copy_string(&chars, i, &mut out);
                continue;
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(',');
                }
            }
            c if c.is_ascii_alphabetic() => {
                let end = chars[i..]
                    .iter()
                    .position(|ch| !ch.is_ascii_alphanumeric() && *ch != '_')
                    .map(|p| i + p)
                    .unwrap_or(chars.len());
                let word: String = chars[i..end].iter().collect();
                out.push_str(match word.as_str() {
                    "True" => "true",
                    "False" => "false",
                    "None" => "null",
                    other => other,
                });
                i = end;
                continue;
            }
            _ => out.push(c),
        }
        i += 1;
    }
    out
}

/// Copy the string literal starting at `start` as a double-quoted JSON
/// string; returns the index after its closing quote.
fn copy_string(chars: &[char], start: usize, out: &mut String) -> usize {
    let quote = chars[start];
    out.push('"');
    let mut i = start + 1;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            let next = chars[i + 1];
            if next == '\'' {
                out.push('\'');
            } else {
                out.push('\\');
                out.push(next);
            }
            i += 2;
            continue;
        }
        if c == quote {
            out.push('"');
            return i + 1;
        }
        match c {
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
        i += 1;
    }
    out.push('"');
    i
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn strict_json_roundtrips() {
        let text = r#"{"title":"T","keywords":"a,b","category":"정보","summary":"S"}"#;
        let record = parse_structured(text).unwrap();
        assert_eq!(record["title"], "T");
        assert_eq!(record["keywords"], "a,b");
        assert_eq!(record["category"], "정보");
        assert_eq!(record["summary"], "S");
        assert_eq!(record.len(), 4);
    }

    #[test]
    fn literal_style_is_relaxed() {
        let text = "{'title': 'It\\'s \"quoted\"', 'done': True, 'score': 3, 'extra': None,}";
        let record = parse_structured(text).unwrap();
        assert_eq!(record["title"], "It's \"quoted\"");
        assert_eq!(record["done"], true);
        assert_eq!(record["score"], 3);
        assert_eq!(record["extra"], Value::Null);
    }

    #[test]
    fn trailing_comma_from_prompt_template() {
        let text = "{\n  \"title\": \"제목\",\n  \"summary\": \"요약\",\n}";
        let record = parse_structured(text).unwrap();
        assert_eq!(record["title"], "제목");
    }

    #[test]
    fn object_embedded_in_prose() {
        let text = "Here is the answer: {\"title\": \"A {braced} title\"} hope it helps";
        let record = parse_structured(text).unwrap();
        assert_eq!(record["title"], "A {braced} title");
    }

    #[test]
    fn rejects_non_objects() {
        assert_eq!(parse_structured("[1, 2]"), Err(ParseError::NotAnObject));
        assert_eq!(parse_structured("no json here"), Err(ParseError::NoObject));
        assert!(matches!(parse_structured("{title: }"), Err(ParseError::Invalid(_))));
    }

    #[test]
    fn unmark_strips_fences_and_headings() {
        let text = "```json\n{\"a\": \"**b**\"}\n```";
        assert_eq!(unmark(text), "{\"a\": \"b\"}");
        assert_eq!(unmark("## Title\nbody"), "Title\nbody");
    }

    #[test]
    fn extract_text_per_api_type() {
        let chat = json!({"message": {"role": "assistant", "content": "```\nhi\n```"}});
        assert_eq!(extract_text(&chat, ApiType::Chat).unwrap(), "hi");

        let generate = json!({"response": " answer "});
        assert_eq!(extract_text(&generate, ApiType::Generate).unwrap(), "answer");

        assert_eq!(extract_text(&json!({}), ApiType::Generate).unwrap(), "");
        assert!(extract_text(&json!({"embedding": [0.1]}), ApiType::Embeddings).is_err());
    }
}
