//! Custom value expressions
//!
//! An expression is free text with embedded JSONPath tokens, evaluated
//! against a record's plain data:
//!
//! ```text
//! $.name[0].value                      -> "IR64"
//! $.program[*].target_id               -> ["3","4"]  (JSON-encoded)
//! {"code": "$.code[0].value"}          -> parsed when `is_json` is set
//! ```
//!
//! Tokens start at `$` and run over `.field`, `.*`, `..field` and bracket
//! segments (`[0]`, `[*]`, `[1:3]`, `['a','b']`). Every token is evaluated
//! against the original data, never against partially substituted text.

use jsonpath_lib::select;
use serde_json::Value;
use tracing::warn;

/// Evaluate `expression` against `data`
///
/// Tokens that fail to parse or match nothing are left in place. With
/// `is_json` the substituted text is parsed; unparsable JSON yields null.
pub fn resolve(expression: &str, data: &Value, is_json: bool) -> Value {
    let mut output = String::with_capacity(expression.len());
    let mut rest = expression;

    while let Some(start) = rest.find('$') {
        output.push_str(&rest[..start]);
        let candidate = &rest[start..];
        let len = token_len(candidate);
        if len == 0 {
            output.push('$');
            rest = &candidate[1..];
            continue;
        }

        let token = &candidate[..len];
        match substitute(token, data) {
            Some(text) => output.push_str(&text),
            None => output.push_str(token),
        }
        rest = &candidate[len..];
    }
    output.push_str(rest);

    if !is_json {
        return Value::String(output);
    }
    match serde_json::from_str(&output) {
        Ok(value) => value,
        Err(e) => {
            warn!(expression, error = %e, "Custom value is not valid JSON");
            Value::Null
        },
    }
}

/// Text replacing `token`, or `None` to keep it literally
fn substitute(token: &str, data: &Value) -> Option<String> {
    let matches = match select(data, token) {
        Ok(matches) => matches,
        Err(e) => {
            warn!(token, error = ?e, "Invalid path in custom value");
            return None;
        },
    };

    match matches.as_slice() {
        [] => {
            warn!(token, "Path in custom value matched nothing");
            None
        },
        [Value::String(text)] => Some(text.clone()),
        [Value::Number(n)] => Some(n.to_string()),
        [Value::Bool(b)] => Some(b.to_string()),
        [Value::Null] => Some("null".to_string()),
        [single] => serde_json::to_string(single).ok(),
        many => serde_json::to_string(many).ok(),
    }
}

/// Length in bytes of the path token at the start of `s`, 0 when `s` does
/// not start with a token carrying at least one segment
fn token_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'$') {
        return 0;
    }

    let mut pos = 1;
    loop {
        let next = match bytes.get(pos) {
            Some(b'.') => dot_segment_len(&bytes[pos..]),
            Some(b'[') => bracket_segment_len(&bytes[pos..]),
            _ => 0,
        };
        if next == 0 {
            break;
        }
        pos += next;
    }

    if pos == 1 {
        0
    } else {
        pos
    }
}

fn is_name_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// `.name`, `.*`, `..name`, `..*` or `..` directly followed by a bracket
fn dot_segment_len(bytes: &[u8]) -> usize {
    let mut pos = 1;
    let recursive = bytes.get(1) == Some(&b'.');
    if recursive {
        pos = 2;
    }

    match bytes.get(pos) {
        Some(b'*') => pos + 1,
        Some(&b) if is_name_byte(b) => {
            let name = bytes[pos..].iter().take_while(|&&b| is_name_byte(b)).count();
            pos + name
        },
        Some(b'[') if recursive => pos,
        _ => 0,
    }
}

/// `[...]` up to the matching close bracket, skipping quoted text
fn bracket_segment_len(bytes: &[u8]) -> usize {
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate().skip(1) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {},
            None if b == b'\'' || b == b'"' => quote = Some(b),
            None if b == b']' => return if i > 1 { i + 1 } else { 0 },
            None if b == b'[' => return 0,
            None => {},
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plain() -> Value {
        json!({
            "id": [{"value": "7"}],
            "name": [{"value": "IR64"}],
            "program": [{"target_id": "3"}, {"target_id": "4"}],
            "user_id": [{"target_id": 42}],
            "meta": [{"value": {"origin": "IRRI"}}]
        })
    }

    #[test]
    fn test_scalar_reference_target() {
        let value = resolve("$.user_id[0].target_id", &json!({"user_id": [{"target_id": 42}]}), false);
        assert_eq!(value, json!("42"));
    }

    #[test]
    fn test_multiple_tokens_in_text() {
        let value = resolve("$.name[0].value (id $.id[0].value)", &plain(), false);
        assert_eq!(value, json!("IR64 (id 7)"));
    }

    #[test]
    fn test_multiple_matches_are_json_encoded() {
        let value = resolve("$.program[*].target_id", &plain(), false);
        assert_eq!(value, json!(r#"["3","4"]"#));

        let parsed = resolve("$.program[*].target_id", &plain(), true);
        assert_eq!(parsed, json!(["3", "4"]));
    }

    #[test]
    fn test_recursive_descent() {
        assert_eq!(resolve("$..origin", &plain(), false), json!("IRRI"));

        let donors = json!({"donors": [{"value": "A"}, {"value": "B"}]});
        assert_eq!(resolve("$..value", &donors, true), json!(["A", "B"]));
        assert_eq!(resolve("$..value", &donors, false), json!(r#"["A","B"]"#));
    }

    #[test]
    fn test_slice() {
        assert_eq!(resolve("$.program[0:1].target_id", &plain(), false), json!("3"));
        // One match substitutes bare text, which parses as a number
        assert_eq!(resolve("$.program[1:3].target_id", &plain(), true), json!(4));
    }

    #[test]
    fn test_quoted_key_union() {
        let data = json!({"id": "7", "name": "IR64", "crop": "rice"});
        let Value::Array(values) = resolve("$['id','name']", &data, true) else {
            panic!("expected an array");
        };
        assert_eq!(values.len(), 2);
        assert!(values.contains(&json!("7")));
        assert!(values.contains(&json!("IR64")));

        // The comma inside the brackets does not end the token
        let Value::String(text) = resolve("keys: $['id','name'] end", &data, false) else {
            panic!("expected text");
        };
        assert!(text.starts_with("keys: [") && text.ends_with("] end"));
        assert!(!text.contains("$["));
    }

    #[test]
    fn test_json_template() {
        let value = resolve(r#"{"name": "$.name[0].value", "origin": $.meta[0].value}"#, &plain(), true);
        assert_eq!(value, json!({"name": "IR64", "origin": {"origin": "IRRI"}}));
    }

    #[test]
    fn test_unmatched_token_left_in_place() {
        let value = resolve("code: $.missing[0].value", &plain(), false);
        assert_eq!(value, json!("code: $.missing[0].value"));
    }

    #[test]
    fn test_invalid_json_yields_null() {
        assert_eq!(resolve("{not json $.name[0].value", &plain(), true), Value::Null);
    }

    #[test]
    fn test_bare_dollar_is_not_a_token() {
        assert_eq!(resolve("costs $5", &plain(), false), json!("costs $5"));
        assert_eq!(resolve("$", &plain(), false), json!("$"));
    }

    #[test]
    fn test_token_boundaries() {
        assert_eq!(token_len("$.a[0].value-$.b"), "$.a[0].value".len());
        assert_eq!(token_len("$['a b'].c rest"), "$['a b'].c".len());
        assert_eq!(token_len("$..name, x"), "$..name".len());
        assert_eq!(token_len("$.a[1:3] tail"), "$.a[1:3]".len());
        assert_eq!(token_len("$[unclosed"), 0);
    }

    #[test]
    fn test_later_tokens_see_original_data() {
        let data = json!({"a": [{"value": "$.b[0].value"}], "b": [{"value": "x"}]});
        let value = resolve("$.a[0].value/$.b[0].value", &data, false);
        assert_eq!(value, json!("$.b[0].value/x"));
    }
}
