use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[A-Za-z]*\s*(.*?)\s*```").unwrap())
}

fn greedy_object_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").unwrap())
}

/// Parses model output that should be JSON but often is not quite.
///
/// Tries, in order: the whole text, the body of a markdown code fence, the first balanced
/// `{...}` block, and the widest `{...}` span. Returns `None` when nothing parses.
pub fn parse_json_loose(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }

    if let Some(caps) = fence_re().captures(trimmed) {
        if let Some(body) = caps.get(1) {
            if let Ok(v) = serde_json::from_str::<Value>(body.as_str().trim()) {
                return Some(v);
            }
        }
    }

    if let Some(block) = first_balanced_object(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(block) {
            return Some(v);
        }
    }

    greedy_object_re()
        .find(trimmed)
        .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
}

/// First `{...}` span whose braces balance, ignoring braces inside string literals.
fn first_balanced_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in s[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&s[start..start + offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper = false;
    for ch in key.chars() {
        if ch == '_' {
            upper = true;
        } else if upper {
            out.extend(ch.to_uppercase());
            upper = false;
        } else {
            out.push(ch);
        }
    }
    out
}

/// Looks a key up under each alias, both in snake_case and camelCase.
pub fn lookup<'a>(v: &'a Value, aliases: &[&str]) -> Option<&'a Value> {
    let obj = v.as_object()?;
    for alias in aliases {
        if let Some(found) = obj.get(*alias) {
            return Some(found);
        }
        if let Some(found) = obj.get(&camel_case(alias)) {
            return Some(found);
        }
    }
    None
}

/// Coerces a scalar into a trimmed string; null, arrays and objects become empty.
pub fn scalar_text(v: Option<&Value>) -> String {
    match v {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

pub fn text_field(v: &Value, aliases: &[&str]) -> String {
    let s = scalar_text(lookup(v, aliases));
    match s.to_ascii_lowercase().as_str() {
        "null" | "none" | "n/a" | "na" | "not available" | "not found" => String::new(),
        _ => s,
    }
}

pub fn flag_field(v: &Value, aliases: &[&str]) -> bool {
    match lookup(v, aliases) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_i64().unwrap_or(0) != 0,
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "yes" | "y" | "true" | "1" | "available" | "attached"
        ),
        _ => false,
    }
}

/// Object rows of the first alias holding an array; non-object items are dropped.
pub fn object_rows<'a>(v: &'a Value, aliases: &[&str]) -> Vec<&'a Value> {
    lookup(v, aliases)
        .and_then(|x| x.as_array())
        .map(|arr| arr.iter().filter(|row| row.is_object()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_clean_json() {
        let v = parse_json_loose(r#"{"bidder": {"company_name": "Alpha"}}"#).unwrap();
        assert_eq!(v["bidder"]["company_name"], "Alpha");
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "```json\n{\"payments\": [{\"transaction_id\": \"TXN1\"}]}\n```";
        let v = parse_json_loose(text).unwrap();
        assert_eq!(v["payments"][0]["transaction_id"], "TXN1");
    }

    #[test]
    fn test_parse_json_in_prose() {
        let text = "Sure! Here is the data you asked for: {\"a\": {\"b\": \"}\"}} Hope it helps {x}";
        let v = parse_json_loose(text).unwrap();
        assert_eq!(v["a"]["b"], "}");
    }

    #[test]
    fn test_parse_garbage_returns_none() {
        assert!(parse_json_loose("the document is unreadable").is_none());
        assert!(parse_json_loose("{not json at all").is_none());
        assert!(parse_json_loose("   ").is_none());
    }

    #[test]
    fn test_lookup_accepts_camel_case() {
        let v = json!({"companyName": "Beta", "pan": 12});
        assert_eq!(text_field(&v, &["company_name"]), "Beta");
        assert_eq!(text_field(&v, &["pan"]), "12");
        assert_eq!(text_field(&v, &["gstin"]), "");
    }

    #[test]
    fn test_text_field_drops_placeholders() {
        let v = json!({"email_id": "N/A", "contact_no": null});
        assert_eq!(text_field(&v, &["email_id"]), "");
        assert_eq!(text_field(&v, &["contact_no"]), "");
    }

    #[test]
    fn test_object_rows_drop_non_objects() {
        let v = json!({"rows": [{"a": 1}, "junk", 3, {"b": 2}]});
        assert_eq!(object_rows(&v, &["rows"]).len(), 2);
        assert!(object_rows(&v, &["missing"]).is_empty());
    }

    #[test]
    fn test_flag_field_variants() {
        let v = json!({"a": "Yes", "b": false, "c": 1, "d": "no"});
        assert!(flag_field(&v, &["a"]));
        assert!(!flag_field(&v, &["b"]));
        assert!(flag_field(&v, &["c"]));
        assert!(!flag_field(&v, &["d"]));
    }
}
