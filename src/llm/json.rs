//! Pulling a JSON document out of free-form model output.

use serde::de::DeserializeOwned;

use crate::llm::{GenerationError, Validate};

/// Remove trailing commas before `}` or `]` outside of strings
pub fn remove_trailing_commas(json: &str) -> String {
    let chars: Vec<char> = json.chars().collect();
    let mut result = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            result.push(ch);
            if escape_next {
                escape_next = false;
            } else if ch == '\\' {
                escape_next = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        if ch == '"' {
            in_string = true;
        } else if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        result.push(ch);
    }
    result
}

/// End index (exclusive) of the balanced object or array starting at `start`
fn balanced_end(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escape_next {
                escape_next = false;
            } else if ch == '\\' {
                escape_next = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Extract the first parseable JSON object or array from model output.
///
/// Handles markdown code fences, prose before and after the payload, and
/// trailing commas.
pub fn extract_json(text: &str) -> Result<String, GenerationError> {
    let cleaned = remove_trailing_commas(&text.replace("```json", "```").replace("```", " "));
    let trimmed = cleaned.trim();

    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Ok(trimmed.to_string());
    }

    for (start, ch) in trimmed.char_indices() {
        if ch != '{' && ch != '[' {
            continue;
        }
        if let Some(end) = balanced_end(trimmed, start) {
            let candidate = &trimmed[start..end];
            if serde_json::from_str::<serde_json::Value>(candidate).is_ok() {
                return Ok(candidate.to_string());
            }
        }
    }

    let preview: String = text.chars().take(80).collect();
    Err(GenerationError::Extract(preview))
}

/// Extract, deserialize and validate a model response
pub fn parse_validated<T: DeserializeOwned + Validate>(text: &str) -> Result<T, GenerationError> {
    let json = extract_json(text)?;
    let parsed: T =
        serde_json::from_str(&json).map_err(|e| GenerationError::Schema(e.to_string()))?;
    parsed.validate()?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_from_code_block() {
        let text = "Here you go:\n```json\n{\"key\": \"value\"}\n```\nEnjoy.";
        assert_eq!(extract_json(text).unwrap(), r#"{"key": "value"}"#);
    }

    #[test]
    fn test_extract_json_plain() {
        let text = r#"{"key": "value"}"#;
        assert_eq!(extract_json(text).unwrap(), text);
    }

    #[test]
    fn test_extract_json_with_surrounding_prose() {
        let text = r#"Sure! {"key": {"inner": [1, 2]}} hope that helps"#;
        assert_eq!(extract_json(text).unwrap(), r#"{"key": {"inner": [1, 2]}}"#);
    }

    #[test]
    fn test_trailing_commas_are_removed_outside_strings() {
        let text = r#"{"items": [1, 2,], "note": "a,]",}"#;
        let json = extract_json(text).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["note"], "a,]");
        assert_eq!(value["items"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_extraction() {
        let text = r#"result: {"text": "use { and } freely"} done"#;
        assert_eq!(extract_json(text).unwrap(), r#"{"text": "use { and } freely"}"#);
    }

    #[test]
    fn test_no_json_is_an_extract_error() {
        assert!(matches!(
            extract_json("I cannot help with that."),
            Err(GenerationError::Extract(_))
        ));
    }
}
