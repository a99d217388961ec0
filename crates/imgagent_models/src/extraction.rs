//! Utilities for extracting structured data from chat responses.
//!
//! Models often wrap JSON in markdown code blocks or surround it with
//! explanatory text. These helpers find the JSON and turn it into drafts.

use imgagent_core::{RoleDraft, SceneDraft};
use imgagent_error::{GenerationError, GenerationErrorKind};
use serde::Deserialize;

/// Extract JSON from a response that may contain markdown or extra text.
///
/// Strategies, in order:
/// 1. Markdown code blocks: ```json ... ```
/// 2. Balanced brackets or braces, whichever opens first
///
/// # Errors
///
/// Returns a `Malformed` error if no JSON is found.
///
/// # Examples
///
/// ```
/// use imgagent_models::extract_json;
///
/// let response = "Here you go:\n```json\n[{\"name\": \"Lin\"}]\n```";
/// let json = extract_json(response).unwrap();
/// assert!(json.starts_with('['));
/// ```
pub fn extract_json(response: &str) -> Result<String, GenerationError> {
    if let Some(json) = extract_from_code_block(response, "json") {
        return Ok(json);
    }

    let bracket_pos = response.find('[');
    let brace_pos = response.find('{');

    let order = match (bracket_pos, brace_pos) {
        (Some(b), Some(c)) if b < c => [('[', ']'), ('{', '}')],
        (Some(_), None) => [('[', ']'), ('{', '}')],
        _ => [('{', '}'), ('[', ']')],
    };
    for (open, close) in order {
        if let Some(json) = extract_balanced(response, open, close) {
            return Ok(json);
        }
    }

    tracing::error!(
        response_length = response.len(),
        "No JSON found in chat response"
    );
    Err(GenerationError::new(GenerationErrorKind::Malformed(format!(
        "No JSON found in response (length: {})",
        response.len()
    ))))
}

fn extract_from_code_block(response: &str, language: &str) -> Option<String> {
    let pattern = format!("```{}", language);

    if let Some(start) = response.find(&pattern) {
        let content_start = start + pattern.len();
        if let Some(end) = response[content_start..].find("```") {
            return Some(response[content_start..content_start + end].trim().to_string());
        }
        // Truncated response: take everything after the fence
        return Some(response[content_start..].trim().to_string());
    }

    if let Some(start) = response.find("```") {
        let content_start = start + 3;
        let skip_to = response[content_start..]
            .find('\n')
            .map(|n| content_start + n + 1)
            .unwrap_or(content_start);

        if let Some(end) = response[skip_to..].find("```") {
            return Some(response[skip_to..skip_to + end].trim().to_string());
        }
        return Some(response[skip_to..].trim().to_string());
    }

    None
}

fn extract_balanced(response: &str, open: char, close: char) -> Option<String> {
    let start = response.find(open)?;
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in response[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match ch {
            '\\' => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(response[start..start + i + ch.len_utf8()].to_string());
                }
            }
            _ => {}
        }
    }

    None
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RolesPayload {
    List(Vec<RoleDraft>),
    Wrapped { roles: Vec<RoleDraft> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScenesPayload {
    List(Vec<SceneDraft>),
    Texts(Vec<String>),
    Wrapped { scenes: Vec<SceneDraft> },
    WrappedTexts { scenes: Vec<String> },
}

fn malformed(what: &str, err: serde_json::Error) -> GenerationError {
    GenerationError::new(GenerationErrorKind::Malformed(format!(
        "Failed to parse {}: {}",
        what, err
    )))
}

/// Parse a chat response into role drafts.
///
/// Accepts a bare array or an object with a `roles` array. Drafts without a
/// name are dropped.
///
/// # Errors
///
/// Returns a `Malformed` error when no matching JSON is found.
pub fn parse_role_drafts(response: &str) -> Result<Vec<RoleDraft>, GenerationError> {
    let json = extract_json(response)?;
    let payload: RolesPayload =
        serde_json::from_str(&json).map_err(|e| malformed("roles", e))?;
    let roles = match payload {
        RolesPayload::List(roles) | RolesPayload::Wrapped { roles } => roles,
    };
    Ok(roles
        .into_iter()
        .filter(|r| !r.name.trim().is_empty())
        .collect())
}

/// Parse a chat response into ordered scene drafts.
///
/// Accepts an array of objects with `content`, an array of strings, or
/// either wrapped in an object under `scenes`. Empty scenes are dropped.
///
/// # Errors
///
/// Returns a `Malformed` error when no matching JSON is found.
pub fn parse_scene_drafts(response: &str) -> Result<Vec<SceneDraft>, GenerationError> {
    let json = extract_json(response)?;
    let payload: ScenesPayload =
        serde_json::from_str(&json).map_err(|e| malformed("scenes", e))?;
    let scenes = match payload {
        ScenesPayload::List(scenes) | ScenesPayload::Wrapped { scenes } => scenes,
        ScenesPayload::Texts(texts) | ScenesPayload::WrappedTexts { scenes: texts } => texts
            .into_iter()
            .map(|content| SceneDraft { content })
            .collect(),
    };
    Ok(scenes
        .into_iter()
        .filter(|s| !s.content.trim().is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_fenced_block() {
        let response = "Sure!\n```json\n{\"roles\": []}\n```\nAnything else?";
        assert_eq!(extract_json(response).unwrap(), "{\"roles\": []}");
    }

    #[test]
    fn test_extract_balanced_with_nested_strings() {
        let response = r#"Result: [{"content": "she said \"[hi]\""}] done"#;
        let json = extract_json(response).unwrap();
        assert!(json.ends_with("}]"));
    }

    #[test]
    fn test_no_json_is_malformed() {
        let err = extract_json("no structure here").unwrap_err();
        assert!(matches!(err.kind, GenerationErrorKind::Malformed(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_parse_roles_wrapped_and_bare() {
        let wrapped = r#"{"roles": [{"name": "Lin", "gender": "female"}, {"name": ""}]}"#;
        let roles = parse_role_drafts(wrapped).unwrap();
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].gender, "female");

        let bare = r#"[{"name": "Zhao", "character": "stubborn", "appearance": "tall"}]"#;
        assert_eq!(parse_role_drafts(bare).unwrap()[0].appearance, "tall");
    }

    #[test]
    fn test_parse_scenes_keeps_order() {
        let texts = r#"```json
{"scenes": ["dawn at the pier", "the storm", ""]}
```"#;
        let scenes = parse_scene_drafts(texts).unwrap();
        assert_eq!(scenes.len(), 2);
        assert_eq!(scenes[0].content, "dawn at the pier");

        let objects = r#"[{"content": "a"}, {"content": "b"}]"#;
        let scenes = parse_scene_drafts(objects).unwrap();
        assert_eq!(
            scenes.iter().map(|s| s.content.as_str()).collect::<Vec<_>>(),
            ["a", "b"]
        );
    }
}
