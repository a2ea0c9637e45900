//! Converts a parsed ReAct `Action`/`Action Input` pair into an MCP
//! tool-call request.

use std::collections::HashMap;

use serde_json::Value;

use tarsy_domain::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallRequest {
    pub server: String,
    pub tool: String,
    pub parameters: serde_json::Map<String, Value>,
    pub reason: String,
}

/// `action` must be exactly one dot: `server.tool`. `input` is parsed
/// best-effort: JSON object first, then `k=v, k=v` / `k: v, k: v`
/// pairs, then a raw `{"input": <text>}` fallback.
pub fn convert_action_to_tool_call(action: &str, input: &str) -> Result<ToolCallRequest> {
    if action.is_empty() {
        return Err(Error::Other("Action cannot be empty".into()));
    }
    let dots = action.matches('.').count();
    let Some((server, tool)) = action.split_once('.') else {
        return Err(Error::Other("Action must be in format 'server.tool'".into()));
    };
    if dots != 1 || server.is_empty() || tool.is_empty() {
        return Err(Error::Other("Action must be in format 'server.tool'".into()));
    }

    let parameters = parse_action_input(input);

    Ok(ToolCallRequest {
        server: server.to_string(),
        tool: tool.to_string(),
        parameters,
        reason: format!("ReAct Action: {action}"),
    })
}

fn parse_action_input(input: &str) -> serde_json::Map<String, Value> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(input) {
        return map;
    }
    if let Some(pairs) = parse_key_value_pairs(input) {
        if !pairs.is_empty() {
            let mut map = serde_json::Map::new();
            for (k, v) in pairs {
                map.insert(k, Value::String(v));
            }
            return map;
        }
    }
    let mut map = serde_json::Map::new();
    map.insert("input".to_string(), Value::String(input.to_string()));
    map
}

/// Splits on commas, then each chunk on the first `=` or `:`. Chunks
/// that contain neither are dropped; if nothing parses, returns `None`
/// so the caller falls back to the raw-input wrapper.
fn parse_key_value_pairs(input: &str) -> Option<HashMap<String, String>> {
    if input.trim().is_empty() {
        return None;
    }
    let mut result = HashMap::new();
    for chunk in input.split(',') {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        let split = chunk
            .find('=')
            .map(|i| (i, '='))
            .into_iter()
            .chain(chunk.find(':').map(|i| (i, ':')))
            .min_by_key(|(i, _)| *i);
        if let Some((idx, sep)) = split {
            let key = chunk[..idx].trim().to_string();
            let value = chunk[idx + sep.len_utf8()..].trim().to_string();
            if !key.is_empty() {
                result.insert(key, value);
            }
        }
    }
    if result.is_empty() {
        None
    } else {
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_simple_action() {
        let r = convert_action_to_tool_call("kubectl.get_pods", "namespace=default").unwrap();
        assert_eq!(r.server, "kubectl");
        assert_eq!(r.tool, "get_pods");
        assert_eq!(r.parameters.get("namespace").unwrap(), "default");
        assert_eq!(r.reason, "ReAct Action: kubectl.get_pods");
    }

    #[test]
    fn converts_action_with_json_input() {
        let r = convert_action_to_tool_call("kubectl.describe_pod", r#"{"namespace": "kube-system", "pod": "coredns"}"#).unwrap();
        assert_eq!(r.parameters.get("namespace").unwrap(), "kube-system");
        assert_eq!(r.parameters.get("pod").unwrap(), "coredns");
    }

    #[test]
    fn converts_action_with_yaml_like_input() {
        let r = convert_action_to_tool_call("kubectl.apply", "apiVersion: v1, kind: Namespace, name: superman-dev").unwrap();
        assert_eq!(r.parameters.get("apiVersion").unwrap(), "v1");
        assert_eq!(r.parameters.get("kind").unwrap(), "Namespace");
        assert_eq!(r.parameters.get("name").unwrap(), "superman-dev");
    }

    #[test]
    fn converts_action_with_key_equals_value_input() {
        let r = convert_action_to_tool_call("kubectl.logs", "namespace=default, pod=nginx, container=app").unwrap();
        assert_eq!(r.parameters.get("namespace").unwrap(), "default");
        assert_eq!(r.parameters.get("pod").unwrap(), "nginx");
        assert_eq!(r.parameters.get("container").unwrap(), "app");
    }

    #[test]
    fn converts_action_with_plain_text_input() {
        let r = convert_action_to_tool_call("search.query", "kubernetes finalizer stuck").unwrap();
        assert_eq!(r.parameters.get("input").unwrap(), "kubernetes finalizer stuck");
    }

    #[test]
    fn empty_action_is_error() {
        assert!(convert_action_to_tool_call("", "some input").is_err());
    }

    #[test]
    fn action_without_dot_is_error() {
        assert!(convert_action_to_tool_call("invalid_action", "some input").is_err());
    }

    #[test]
    fn empty_input_falls_back_to_input_wrapper() {
        let r = convert_action_to_tool_call("test.action", "").unwrap();
        assert_eq!(r.parameters.get("input").unwrap(), "");
    }
}
