//! Webhook request-body decoding.
//!
//! Bitrix24 delivers task events in several encodings depending on the
//! subscription type: a JSON object, URL-form-encoded fields with
//! bracket-notation nested keys (`data[FIELDS_AFTER][ID]=42`), or a raw
//! query string in the body. Decoders are tried in that order; only when
//! every decoder fails is the request considered unparseable.

use std::fmt::{Display, Formatter};

use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyDecodeReasonCode {
    EmptyBody,
    NonObjectJson,
    UnsupportedEncoding,
}

impl BodyDecodeReasonCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmptyBody => "empty_body",
            Self::NonObjectJson => "non_object_json",
            Self::UnsupportedEncoding => "unsupported_encoding",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyDecodeError {
    pub code: BodyDecodeReasonCode,
    pub message: String,
}

impl BodyDecodeError {
    fn new(code: BodyDecodeReasonCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for BodyDecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for BodyDecodeError {}

/// Decodes a POST body into a JSON object, trying JSON, form data, and a
/// raw query string in order.
pub fn decode_webhook_body(raw: &str) -> Result<Value, BodyDecodeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(BodyDecodeError::new(
            BodyDecodeReasonCode::EmptyBody,
            "request body is empty",
        ));
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => return Ok(Value::Object(map)),
        Ok(_) => {
            return Err(BodyDecodeError::new(
                BodyDecodeReasonCode::NonObjectJson,
                "JSON payload must be an object",
            ));
        }
        Err(_) => {}
    }

    let pairs = parse_form_pairs(trimmed);
    if pairs.is_empty() {
        return Err(BodyDecodeError::new(
            BodyDecodeReasonCode::UnsupportedEncoding,
            "body matches no accepted encoding",
        ));
    }
    Ok(unflatten_form_pairs(pairs))
}

/// Decodes GET query parameters. An empty or pair-free query degrades to
/// an empty object, which downstream treats as a no-task skip.
pub fn decode_query_string(raw: &str) -> Value {
    unflatten_form_pairs(parse_form_pairs(raw))
}

/// Percent-decodes `key=value` segments. Segments without `=` carry no
/// field and are dropped, which keeps arbitrary garbage from passing as
/// form data.
pub fn parse_form_pairs(raw: &str) -> Vec<(String, String)> {
    raw.trim()
        .split('&')
        .filter(|segment| segment.contains('='))
        .filter_map(|segment| {
            url::form_urlencoded::parse(segment.as_bytes())
                .into_owned()
                .next()
        })
        .filter(|(key, _)| !key.is_empty())
        .collect()
}

/// Rebuilds nested objects from bracket-notation form keys: the pair
/// `("data[FIELDS_AFTER][ID]", "42")` becomes
/// `{"data":{"FIELDS_AFTER":{"ID":"42"}}}`.
pub fn unflatten_form_pairs(pairs: Vec<(String, String)>) -> Value {
    let mut root = Map::new();
    for (key, value) in pairs {
        insert_bracket_path(&mut root, &key, value);
    }
    Value::Object(root)
}

fn insert_bracket_path(root: &mut Map<String, Value>, key: &str, value: String) {
    let mut segments = parse_bracket_path(key);
    let Some(leaf) = segments.pop() else {
        return;
    };
    let mut current = root;
    for segment in segments {
        let slot = current
            .entry(segment)
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            // A scalar seen earlier under the same prefix loses to the
            // nested form.
            *slot = Value::Object(Map::new());
        }
        let Value::Object(next) = slot else {
            return;
        };
        current = next;
    }
    current.insert(leaf, Value::String(value));
}

fn parse_bracket_path(key: &str) -> Vec<String> {
    let Some(head_end) = key.find('[') else {
        return vec![key.to_string()];
    };
    let mut segments = vec![key[..head_end].to_string()];
    let mut rest = &key[head_end..];
    while let Some(stripped) = rest.strip_prefix('[') {
        match stripped.find(']') {
            Some(close) => {
                segments.push(stripped[..close].to_string());
                rest = &stripped[close + 1..];
            }
            None => {
                // Unbalanced bracket: take the remainder as one segment.
                segments.push(stripped.to_string());
                break;
            }
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unit_unflatten_builds_nested_objects_from_bracket_keys() {
        let pairs = vec![
            ("event".to_string(), "ONTASKADD".to_string()),
            ("data[FIELDS_AFTER][ID]".to_string(), "42".to_string()),
            (
                "data[FIELDS_AFTER][TITLE]".to_string(),
                "Fix the build".to_string(),
            ),
            ("auth[access_token]".to_string(), "tok".to_string()),
        ];
        let decoded = unflatten_form_pairs(pairs);
        assert_eq!(
            decoded,
            json!({
                "event": "ONTASKADD",
                "data": {"FIELDS_AFTER": {"ID": "42", "TITLE": "Fix the build"}},
                "auth": {"access_token": "tok"}
            })
        );
    }

    #[test]
    fn unit_unflatten_scalar_prefix_loses_to_nested_form() {
        let pairs = vec![
            ("data".to_string(), "undefined".to_string()),
            ("data[ID]".to_string(), "7".to_string()),
        ];
        assert_eq!(unflatten_form_pairs(pairs), json!({"data": {"ID": "7"}}));
    }

    #[test]
    fn unit_decode_json_object_body() {
        let decoded = decode_webhook_body(r#"{"event":"ONTASKADD","data":{"ID":"42"}}"#)
            .expect("json body decodes");
        assert_eq!(decoded["data"]["ID"], "42");
    }

    #[test]
    fn unit_decode_form_encoded_body_with_bracket_keys() {
        let decoded =
            decode_webhook_body("event=ONTASKUPDATE&data%5BFIELDS_AFTER%5D%5BID%5D=42")
                .expect("form body decodes");
        assert_eq!(decoded["event"], "ONTASKUPDATE");
        assert_eq!(decoded["data"]["FIELDS_AFTER"]["ID"], "42");
    }

    #[test]
    fn unit_decode_raw_query_string_body() {
        let decoded =
            decode_webhook_body("event=ONTASKADD&data[ID]=9&data[TITLE]=hello+world")
                .expect("query body decodes");
        assert_eq!(decoded["data"]["TITLE"], "hello world");
    }

    #[test]
    fn unit_decode_rejects_unparseable_body() {
        let error = decode_webhook_body("{broken json, no pairs").expect_err("must fail");
        assert_eq!(error.code, BodyDecodeReasonCode::UnsupportedEncoding);
    }

    #[test]
    fn unit_decode_rejects_empty_body() {
        let error = decode_webhook_body("  ").expect_err("must fail");
        assert_eq!(error.code, BodyDecodeReasonCode::EmptyBody);
    }

    #[test]
    fn unit_decode_rejects_non_object_json() {
        let error = decode_webhook_body("[1,2,3]").expect_err("must fail");
        assert_eq!(error.code, BodyDecodeReasonCode::NonObjectJson);
    }

    #[test]
    fn unit_decode_query_string_degrades_to_empty_object() {
        assert_eq!(decode_query_string(""), json!({}));
        assert_eq!(decode_query_string("no-pairs-here"), json!({}));
    }
}
