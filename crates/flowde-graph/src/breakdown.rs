use serde::de::DeserializeOwned;
use serde::Deserialize;

use flowde_core::error::{FlowError, Result};

/// Parse a JSON object out of model output.
///
/// Models often wrap the object in prose or code fences; when the whole text
/// is not valid JSON, the span from the first `{` to the last `}` is tried.
pub fn extract_json<T: DeserializeOwned>(text: &str) -> Result<T> {
    let text = text.trim();
    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(direct) => {
            let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
                return Err(FlowError::Breakdown(format!(
                    "no JSON object in reply: {}",
                    direct
                )));
            };
            if end <= start {
                return Err(FlowError::Breakdown("no JSON object in reply".into()));
            }
            serde_json::from_str(&text[start..=end])
                .map_err(|e| FlowError::Breakdown(format!("malformed JSON in reply: {}", e)))
        }
    }
}

#[derive(Debug, Deserialize)]
struct BreakdownReply {
    #[serde(default)]
    new_steps: Vec<BreakdownItem>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BreakdownItem {
    Text(String),
    Object {
        #[serde(default)]
        content: String,
    },
}

impl BreakdownItem {
    fn into_content(self) -> String {
        match self {
            Self::Text(text) | Self::Object { content: text } => text.trim().to_string(),
        }
    }
}

/// Step contents from a breakdown reply (`{"new_steps": [{"content": ...}]}`),
/// in order, with blank entries dropped.
pub fn parse_breakdown(text: &str) -> Result<Vec<String>> {
    let reply: BreakdownReply = extract_json(text)?;
    let steps: Vec<String> = reply
        .new_steps
        .into_iter()
        .map(BreakdownItem::into_content)
        .filter(|content| !content.is_empty())
        .collect();
    if steps.is_empty() {
        return Err(FlowError::Breakdown("reply contains no steps".into()));
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let steps = parse_breakdown(
            r#"{"new_steps": [{"content": "Find sources"}, {"content": "Take notes"}]}"#,
        )
        .unwrap();
        assert_eq!(steps, vec!["Find sources", "Take notes"]);
    }

    #[test]
    fn test_parse_salvages_wrapped_json() {
        let reply = "Sure! Here is the breakdown:\n```json\n{\"new_steps\": [{\"content\": \"Outline\"}]}\n```\nGood luck.";
        assert_eq!(parse_breakdown(reply).unwrap(), vec!["Outline"]);
    }

    #[test]
    fn test_parse_drops_blank_and_accepts_strings() {
        let reply = r#"{"new_steps": ["  Draft  ", {"content": ""}, {"id": 3}, {"content": "Edit"}]}"#;
        assert_eq!(parse_breakdown(reply).unwrap(), vec!["Draft", "Edit"]);
    }

    #[test]
    fn test_parse_rejects_empty_and_garbage() {
        assert!(matches!(
            parse_breakdown(r#"{"new_steps": []}"#),
            Err(FlowError::Breakdown(_))
        ));
        assert!(matches!(
            parse_breakdown("I cannot help with that."),
            Err(FlowError::Breakdown(_))
        ));
        assert!(matches!(
            parse_breakdown("} backwards {"),
            Err(FlowError::Breakdown(_))
        ));
    }
}
