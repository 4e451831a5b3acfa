use serde::Deserialize;

use va_core::error::{CoreError, Result};
use va_core::session::{validate_graph, MindMapEdge, MindMapNode};
use va_core::settings::mind_map_repair_prompt;

#[derive(Debug, Deserialize)]
struct RawMindMap {
    #[serde(default)]
    nodes: Vec<MindMapNode>,
    #[serde(default)]
    edges: Vec<MindMapEdge>,
}

/// Extracts the largest brace-balanced `{...}` substring from `text`,
/// tolerating leading/trailing commentary an LLM tends to wrap JSON in
/// (e.g. `"Sure! {...}"`). Returns `None` if no balanced object exists.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{')?;

    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut best_end = None;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    best_end = Some(start + offset + 1);
                    break;
                }
            }
            _ => {}
        }
    }

    best_end.map(|end| &text[start..end])
}

/// Parses and structurally validates a candidate mind-map JSON blob,
/// per SPEC_FULL §4.6. Returns the graph on success; callers decide
/// whether to attempt the one allowed repair.
pub fn parse_and_validate(raw_response: &str) -> Result<(Vec<MindMapNode>, Vec<MindMapEdge>)> {
    let object = extract_json_object(raw_response)
        .ok_or_else(|| CoreError::InvalidMindMap("no JSON object found in response".to_string()))?;

    let parsed: RawMindMap = serde_json::from_str(object)
        .map_err(|e| CoreError::InvalidMindMap(format!("malformed JSON: {e}")))?;

    validate_graph(&parsed.nodes, &parsed.edges)?;

    Ok((parsed.nodes, parsed.edges))
}

/// Builds the one-shot repair prompt quoting the offending raw output.
pub fn repair_prompt(raw_response: &str) -> String {
    mind_map_repair_prompt(raw_response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_balanced_object_with_surrounding_prose() {
        let text = r#"Sure! {"nodes":[{"id":"a","label":"A"}],"edges":[]} Hope that helps."#;
        let extracted = extract_json_object(text).unwrap();
        assert_eq!(extracted, r#"{"nodes":[{"id":"a","label":"A"}],"edges":[]}"#);
    }

    #[test]
    fn handles_nested_braces_in_strings() {
        let text = r#"{"nodes":[{"id":"a","label":"has a { brace in it"}],"edges":[]}"#;
        let extracted = extract_json_object(text).unwrap();
        assert_eq!(extracted, text);
    }

    #[test]
    fn no_object_returns_none() {
        assert!(extract_json_object("just some text").is_none());
    }

    #[test]
    fn parse_and_validate_accepts_well_formed_graph() {
        let text = r#"{"nodes":[{"id":"a","label":"A"},{"id":"b","label":"B"}],"edges":[{"id":"e1","source":"a","target":"b"}]}"#;
        let (nodes, edges) = parse_and_validate(text).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(edges.len(), 1);
    }

    #[test]
    fn parse_and_validate_rejects_dangling_edge() {
        let text = r#"{"nodes":[{"id":"a","label":"A"}],"edges":[{"id":"e1","source":"a","target":"missing"}]}"#;
        assert!(parse_and_validate(text).is_err());
    }

    #[test]
    fn parse_and_validate_rejects_non_json() {
        assert!(parse_and_validate("no json here").is_err());
    }
}
