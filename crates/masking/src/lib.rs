//! Regex-based masking of sensitive data in MCP tool results before they
//! are written to the conversation, the history store, or streamed to a
//! client.
//!
//! Masking runs in two layers, in order: the built-in pattern groups
//! named in [`MaskingConfig::pattern_groups`](tarsy_domain::config::MaskingConfig),
//! then any `custom_patterns` configured for that MCP server. Either
//! layer can be empty; an unmasked server just echoes its tool output
//! back unchanged.

use std::sync::OnceLock;

use regex::Regex;
use tarsy_domain::config::MaskingConfig;

/// One named regex substitution.
struct Pattern {
    name: &'static str,
    regex: &'static str,
    replacement: &'static str,
}

/// Canonical registry of every builtin pattern, named once. Groups below
/// are just sets of these names — `api_key`/`password` are shared
/// between `basic` and `kubernetes` rather than redefined.
const BUILTIN_PATTERNS: &[Pattern] = &[
    Pattern {
        name: "api_key",
        regex: r#"(?i)(api[_-]?key|access[_-]?token|secret)["']?\s*[:=]\s*["']?[A-Za-z0-9\-._~+/]{8,}["']?"#,
        replacement: "$1=***MASKED_API_KEY***",
    },
    Pattern {
        name: "password",
        regex: r#"(?i)(password|passwd|pwd)["']?\s*[:=]\s*["']?[^\s"',}]{3,}["']?"#,
        replacement: "$1=***MASKED_PASSWORD***",
    },
    Pattern {
        name: "token",
        regex: r"(?i)bearer\s+[A-Za-z0-9\-._~+/]+=*",
        replacement: "Bearer ***MASKED_TOKEN***",
    },
    Pattern {
        name: "certificate",
        regex: r"-----BEGIN [A-Z ]+-----[\s\S]+?-----END [A-Z ]+-----",
        replacement: "***MASKED_CERTIFICATE***",
    },
    Pattern {
        name: "kubernetes_data_section",
        regex: r"(?m)^data:\n(?:[ \t]+\S.*\n?)+",
        replacement: "data:\n  ***MASKED_SECRET_DATA***\n",
    },
    Pattern {
        name: "kubernetes_stringdata_json",
        regex: r"(?m)^(stringData:\s*)\{[^\n]*\}",
        replacement: "${1}***MASKED_SECRET_DATA***",
    },
];

/// `basic` = `{api_key, password}`; `security` = `basic + {token,
/// certificate}`; `kubernetes` = `{kubernetes_data_section,
/// kubernetes_stringdata_json, api_key, password}` — membership matches
/// the original masking service's pattern-group expansion exactly
/// (`basic` len 2, `security`/`kubernetes` len 4).
fn group_by_name(name: &str) -> &'static [&'static str] {
    match name {
        "basic" => &["api_key", "password"],
        "security" => &["api_key", "password", "token", "certificate"],
        "kubernetes" => &["kubernetes_data_section", "kubernetes_stringdata_json", "api_key", "password"],
        other => {
            tracing::warn!(group = other, "unknown masking pattern group, skipping");
            &[]
        }
    }
}

static COMPILED: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();

fn compiled_builtins() -> &'static [(&'static str, Regex)] {
    COMPILED.get_or_init(|| {
        BUILTIN_PATTERNS.iter().map(|p| (p.name, Regex::new(p.regex).expect("builtin masking pattern compiles"))).collect()
    })
}

fn replacement_for(name: &str) -> &'static str {
    BUILTIN_PATTERNS.iter().find(|p| p.name == name).map(|p| p.replacement).unwrap_or("***MASKED***")
}

/// Apply a [`MaskingConfig`] to a piece of text, returning the masked
/// result. A no-op (`enabled == false` or empty config) returns the
/// input unchanged without allocating a new string.
pub fn mask_text(config: &MaskingConfig, input: &str) -> String {
    if !config.enabled {
        return input.to_string();
    }

    let mut text = input.to_string();

    let wanted: Vec<&'static str> = config.pattern_groups.iter().flat_map(|g| group_by_name(g).iter().copied()).collect();

    for (name, regex) in compiled_builtins() {
        if wanted.contains(name) {
            text = regex.replace_all(&text, replacement_for(name)).into_owned();
        }
    }

    for custom in &config.custom_patterns {
        match Regex::new(&custom.pattern) {
            Ok(re) => text = re.replace_all(&text, custom.replacement.as_str()).into_owned(),
            Err(e) => tracing::warn!(pattern = %custom.pattern, error = %e, "invalid custom masking pattern, skipping"),
        }
    }

    text
}

/// Apply masking to every string value in a JSON tree, recursively.
/// Keys and non-string scalars are left untouched.
pub fn mask_json(config: &MaskingConfig, value: &serde_json::Value) -> serde_json::Value {
    if !config.enabled {
        return value.clone();
    }
    match value {
        serde_json::Value::String(s) => serde_json::Value::String(mask_text(config, s)),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(|v| mask_json(config, v)).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), mask_json(config, v))).collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarsy_domain::config::CustomPattern;

    fn enabled(groups: &[&str]) -> MaskingConfig {
        MaskingConfig {
            enabled: true,
            pattern_groups: groups.iter().map(|s| s.to_string()).collect(),
            custom_patterns: vec![],
        }
    }

    #[test]
    fn disabled_config_is_noop() {
        let cfg = MaskingConfig::default();
        assert_eq!(mask_text(&cfg, "api_key=abcdefghijklmnopqrstuvwx"), "api_key=abcdefghijklmnopqrstuvwx");
    }

    #[test]
    fn basic_group_has_exactly_api_key_and_password() {
        assert_eq!(group_by_name("basic"), &["api_key", "password"]);
    }

    #[test]
    fn security_group_is_basic_plus_token_and_certificate() {
        assert_eq!(group_by_name("security"), &["api_key", "password", "token", "certificate"]);
    }

    #[test]
    fn kubernetes_group_has_exactly_four_patterns() {
        let group = group_by_name("kubernetes");
        assert_eq!(group.len(), 4);
        assert!(group.contains(&"kubernetes_data_section"));
        assert!(group.contains(&"kubernetes_stringdata_json"));
        assert!(group.contains(&"api_key"));
        assert!(group.contains(&"password"));
    }

    #[test]
    fn masks_api_key_in_basic_group() {
        let cfg = enabled(&["basic"]);
        let out = mask_text(&cfg, r#"api_key: "sk_test_123456789012345678901234567890""#);
        assert!(out.contains("***MASKED_API_KEY***"));
        assert!(!out.contains("sk_test_123456789012345678901234567890"));
    }

    #[test]
    fn masks_password_in_basic_group() {
        let cfg = enabled(&["basic"]);
        let out = mask_text(&cfg, r#""password": "mySecretPassword123""#);
        assert!(out.contains("***MASKED_PASSWORD***"));
        assert!(!out.contains("mySecretPassword123"));
    }

    #[test]
    fn basic_group_does_not_mask_certificates_or_tokens() {
        let cfg = enabled(&["basic"]);
        let input = "Authorization: Bearer sk-abcDEF1234567890";
        let out = mask_text(&cfg, input);
        assert_eq!(out, input);
    }

    #[test]
    fn masks_bearer_token_in_security_group() {
        let cfg = enabled(&["security"]);
        let out = mask_text(&cfg, "Authorization: Bearer sk-abcDEF1234567890");
        assert!(out.contains("***MASKED_TOKEN***"));
    }

    #[test]
    fn masks_certificate_in_security_group() {
        let cfg = enabled(&["security"]);
        let input = "cert: -----BEGIN CERTIFICATE-----\nMIIB...\n-----END CERTIFICATE-----";
        let out = mask_text(&cfg, input);
        assert!(out.contains("***MASKED_CERTIFICATE***"));
    }

    #[test]
    fn kubernetes_group_masks_api_key_and_password_in_a_secret() {
        let cfg = enabled(&["kubernetes"]);
        let input = "apiVersion: v1\nkind: Secret\nspec:\n  api_key: \"sk_live_abcdefghijklmnop\"\n  password: \"supersecretpassword\"";
        let out = mask_text(&cfg, input);
        assert!(out.contains("***MASKED_API_KEY***"));
        assert!(out.contains("***MASKED_PASSWORD***"));
        assert!(!out.contains("sk_live_abcdefghijklmnop"));
        assert!(!out.contains("supersecretpassword"));
    }

    #[test]
    fn kubernetes_group_masks_data_section_preserving_metadata() {
        let cfg = enabled(&["kubernetes"]);
        let input = "apiVersion: v1\ndata:\n  username: YWRtaW4=\n  password: c3VwZXJzZWNyZXRwYXNzd29yZDEyMw==\n  somekey: xyz\nkind: Secret\nmetadata:\n  name: my-secret\n  namespace: superman-dev";
        let out = mask_text(&cfg, input);
        assert!(!out.contains("YWRtaW4="));
        assert!(!out.contains("c3VwZXJzZWNyZXRwYXNzd29yZDEyMw=="));
        assert!(!out.contains("xyz"));
        assert!(out.contains("***MASKED_SECRET_DATA***"));
        assert!(out.contains("my-secret"));
        assert!(out.contains("superman-dev"));
        assert!(out.contains("Secret"));
    }

    #[test]
    fn kubernetes_group_masks_stringdata_json() {
        let cfg = enabled(&["kubernetes"]);
        let input = r#"stringData: {"password": "hunter2", "token": "abc123"}"#;
        let out = mask_text(&cfg, input);
        assert!(out.contains("***MASKED_SECRET_DATA***"));
        assert!(!out.contains("hunter2"));
    }

    #[test]
    fn custom_pattern_applies_after_builtin_groups() {
        let mut cfg = enabled(&["basic"]);
        cfg.custom_patterns.push(CustomPattern {
            pattern: r"CONF-\d+".into(),
            replacement: "***MASKED_TICKET***".into(),
        });
        let out = mask_text(&cfg, r#"see CONF-4821 for context, password: "hunter22""#);
        assert!(out.contains("***MASKED_TICKET***"));
        assert!(out.contains("***MASKED_PASSWORD***"));
    }

    #[test]
    fn mask_json_recurses_into_nested_values() {
        let cfg = enabled(&["basic"]);
        let value = serde_json::json!({
            "creds": [r#"password: "hunter22""#, "other text"],
            "count": 3,
        });
        let masked = mask_json(&cfg, &value);
        assert!(masked["creds"][0].as_str().unwrap().contains("***MASKED_PASSWORD***"));
        assert_eq!(masked["creds"][1], "other text");
        assert_eq!(masked["count"], 3);
    }

    #[test]
    fn unknown_group_name_is_ignored() {
        let cfg = enabled(&["nonexistent"]);
        let out = mask_text(&cfg, r#"password: "hunter22""#);
        assert_eq!(out, r#"password: "hunter22""#);
    }
}
