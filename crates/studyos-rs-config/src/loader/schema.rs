//! Schema validation for Study OS JSON5 configuration.
//!
//! Every layer is checked on its own so errors point at the file that
//! introduced them.

use crate::ConfigError;
use serde_json::{Map, Value};

const ROUTING_PREFERENCES: &[&str] = &["auto", "gemini", "openai", "anthropic", "ollama"];
const PERSONAS: &[&str] = &["TEACHER", "EXAMINER", "COACH", "ANALYST", "COUNCIL"];
const PROVIDER_KEYS: &[&str] = &["gemini", "openai", "anthropic", "ollama"];

/// Validate a single config layer against the schema.
pub(super) fn validate_layer_schema(value: &Value, layer: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, "")?;
    ensure_allowed_keys(
        map,
        &[
            "$schema",
            "routing",
            "providers",
            "exam",
            "chat",
            "uploads",
            "server",
            "state",
        ],
        layer,
        "",
    )?;

    if let Some(value) = map.get("$schema") {
        expect_string(value, layer, "$schema")?;
    }
    if let Some(value) = map.get("routing") {
        validate_routing(value, layer, "routing")?;
    }
    if let Some(value) = map.get("providers") {
        validate_providers(value, layer, "providers")?;
    }
    if let Some(value) = map.get("exam") {
        validate_exam(value, layer, "exam")?;
    }
    if let Some(value) = map.get("chat") {
        validate_chat(value, layer, "chat")?;
    }
    if let Some(value) = map.get("uploads") {
        validate_uploads(value, layer, "uploads")?;
    }
    if let Some(value) = map.get("server") {
        let map = expect_object(value, layer, "server")?;
        ensure_allowed_keys(map, &["bind"], layer, "server")?;
        if let Some(value) = map.get("bind") {
            expect_string(value, layer, "server.bind")?;
        }
    }
    if let Some(value) = map.get("state") {
        let map = expect_object(value, layer, "state")?;
        ensure_allowed_keys(map, &["root"], layer, "state")?;
        if let Some(value) = map.get("root") {
            expect_string(value, layer, "state.root")?;
        }
    }
    Ok(())
}

fn validate_routing(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["preference"], layer, path)?;
    if let Some(value) = map.get("preference") {
        expect_enum(
            value,
            ROUTING_PREFERENCES,
            layer,
            &join_path(path, "preference"),
        )?;
    }
    Ok(())
}

fn validate_providers(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, PROVIDER_KEYS, layer, path)?;
    for (name, provider) in map {
        let provider_path = join_path(path, name);
        let provider_map = expect_object(provider, layer, &provider_path)?;
        ensure_allowed_keys(
            provider_map,
            &[
                "api_key",
                "api_key_env",
                "model",
                "lite_model",
                "base_url",
                "base_url_env",
                "model_env",
            ],
            layer,
            &provider_path,
        )?;
        for key in [
            "api_key",
            "model",
            "lite_model",
            "base_url",
            "base_url_env",
            "model_env",
        ] {
            if let Some(value) = provider_map.get(key) {
                expect_string(value, layer, &join_path(&provider_path, key))?;
            }
        }
        if let Some(value) = provider_map.get("api_key_env") {
            validate_string_array(value, layer, &join_path(&provider_path, "api_key_env"))?;
        }
    }
    Ok(())
}

fn validate_exam(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(
        map,
        &[
            "topic",
            "duration_minutes",
            "max_violations",
            "warning_clear_ms",
            "disqualify_delay_ms",
            "denylist",
        ],
        layer,
        path,
    )?;
    if let Some(value) = map.get("topic") {
        expect_string(value, layer, &join_path(path, "topic"))?;
    }
    for key in [
        "duration_minutes",
        "max_violations",
        "warning_clear_ms",
        "disqualify_delay_ms",
    ] {
        if let Some(value) = map.get(key) {
            expect_u64(value, layer, &join_path(path, key))?;
        }
    }
    if let Some(value) = map.get("denylist") {
        validate_string_array(value, layer, &join_path(path, "denylist"))?;
    }
    Ok(())
}

fn validate_chat(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["history_limit", "default_persona"], layer, path)?;
    if let Some(value) = map.get("history_limit") {
        expect_u64(value, layer, &join_path(path, "history_limit"))?;
    }
    if let Some(value) = map.get("default_persona") {
        expect_enum(
            value,
            PERSONAS,
            layer,
            &join_path(path, "default_persona"),
        )?;
    }
    Ok(())
}

fn validate_uploads(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let map = expect_object(value, layer, path)?;
    ensure_allowed_keys(map, &["max_bytes", "allowed_extensions"], layer, path)?;
    if let Some(value) = map.get("max_bytes") {
        expect_u64(value, layer, &join_path(path, "max_bytes"))?;
    }
    if let Some(value) = map.get("allowed_extensions") {
        validate_string_array(value, layer, &join_path(path, "allowed_extensions"))?;
    }
    Ok(())
}

fn expect_object<'a>(
    value: &'a Value,
    layer: &str,
    path: &str,
) -> Result<&'a Map<String, Value>, ConfigError> {
    value
        .as_object()
        .ok_or_else(|| invalid_field(layer, path, "expected object"))
}

fn expect_string(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    match value {
        Value::String(_) => Ok(()),
        _ => Err(invalid_field(layer, path, "expected string")),
    }
}

/// Non-negative integer.
fn expect_u64(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    if value.is_u64() {
        Ok(())
    } else {
        Err(invalid_field(layer, path, "expected non-negative integer"))
    }
}

/// String drawn from a fixed set of canonical spellings.
fn expect_enum(
    value: &Value,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    let Some(raw) = value.as_str() else {
        return Err(invalid_field(layer, path, "expected string"));
    };
    if allowed.contains(&raw) {
        Ok(())
    } else {
        Err(invalid_field(
            layer,
            path,
            &format!("expected one of: {}", allowed.join(", ")),
        ))
    }
}

fn validate_string_array(value: &Value, layer: &str, path: &str) -> Result<(), ConfigError> {
    let Value::Array(entries) = value else {
        return Err(invalid_field(layer, path, "expected array"));
    };
    for (idx, entry) in entries.iter().enumerate() {
        if !entry.is_string() {
            return Err(invalid_field(
                layer,
                &format!("{path}[{idx}]"),
                "expected string",
            ));
        }
    }
    Ok(())
}

fn ensure_allowed_keys(
    map: &Map<String, Value>,
    allowed: &[&str],
    layer: &str,
    path: &str,
) -> Result<(), ConfigError> {
    match map.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(key) => Err(invalid_field(layer, &join_path(path, key), "unknown key")),
        None => Ok(()),
    }
}

fn join_path(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn invalid_field(layer: &str, path: &str, message: &str) -> ConfigError {
    let path = if path.is_empty() { "root" } else { path };
    ConfigError::InvalidField {
        path: format!("{layer}:{path}"),
        message: message.to_string(),
    }
}
