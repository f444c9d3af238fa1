//! Tests for layered configuration loading.

use super::*;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use studyos_rs_protocol::{AgentRole, ProviderKind, RoutingPreference};
use tempfile::TempDir;

/// Write JSON5 contents to a path, creating parent directories if needed.
fn write_json5(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("dir");
    }
    fs::write(path, contents).expect("write");
}

fn topic_layer(topic: &str) -> String {
    format!("{{ exam: {{ topic: \"{topic}\" }} }}")
}

#[test]
fn parse_minimal_config() {
    let config = StudyOsConfig::load_from_str("{}").expect("config");
    assert_eq!(config.routing.preference, RoutingPreference::Auto);
    assert_eq!(config.exam.topic, "Cell Biology & Transport");
    assert_eq!(config.exam.max_violations, 3);
    assert_eq!(config.exam.warning_clear_ms, 4_000);
    assert_eq!(config.exam.disqualify_delay_ms, 1_500);
    assert_eq!(config.chat.default_persona, AgentRole::Council);
    assert_eq!(config.uploads.max_bytes, 5 * 1024 * 1024);
    assert_eq!(config.server.bind, "127.0.0.1:3001");
}

#[test]
fn rejects_unknown_top_level_key() {
    let err = StudyOsConfig::load_from_str("{ unexpected: true }").unwrap_err();
    assert!(format!("{err}").contains("unknown key"));
}

#[test]
fn rejects_unknown_provider_block() {
    let err = StudyOsConfig::load_from_str("{ providers: { mistral: {} } }").unwrap_err();
    assert!(format!("{err}").contains("providers.mistral"));
}

#[test]
fn rejects_invalid_routing_preference() {
    let err = StudyOsConfig::load_from_str(r#"{ routing: { preference: "fastest" } }"#)
        .unwrap_err();
    assert!(format!("{err}").contains("routing.preference"));
}

#[test]
fn rejects_non_string_denylist_entry() {
    let err = StudyOsConfig::load_from_str(r#"{ exam: { denylist: ["ok", 4] } }"#).unwrap_err();
    assert!(format!("{err}").contains("exam.denylist[1]"));
}

#[test]
fn rejects_zero_violation_limit() {
    let err = StudyOsConfig::load_from_str("{ exam: { max_violations: 0 } }").unwrap_err();
    assert!(format!("{err}").contains("exam.max_violations"));
}

#[test]
fn rejects_extension_without_dot() {
    let err = StudyOsConfig::load_from_str(r#"{ uploads: { allowed_extensions: ["pdf"] } }"#)
        .unwrap_err();
    assert!(format!("{err}").contains("must start with '.'"));
}

#[test]
fn parses_routing_and_persona() {
    let config = StudyOsConfig::load_from_str(
        r#"{ routing: { preference: "ollama" }, chat: { default_persona: "EXAMINER" } }"#,
    )
    .expect("config");
    assert_eq!(
        config.routing.preference,
        RoutingPreference::Provider(ProviderKind::Ollama)
    );
    assert_eq!(config.chat.default_persona, AgentRole::Examiner);
}

#[test]
fn partial_provider_layer_keeps_kind_defaults() {
    let config =
        StudyOsConfig::load_from_str(r#"{ providers: { gemini: { model: "gemini-custom" } } }"#)
            .expect("config");
    let gemini = config.providers.resolved(ProviderKind::Gemini);
    assert_eq!(gemini.model.as_deref(), Some("gemini-custom"));
    assert_eq!(gemini.lite_model.as_deref(), Some("gemini-flash-lite-latest"));
    assert_eq!(gemini.api_key_env, vec!["GEMINI_API_KEY", "API_KEY"]);

    let ollama = config.providers.resolved(ProviderKind::Ollama);
    assert_eq!(ollama.base_url_env.as_deref(), Some("OLLAMA_BASE_URL"));
    assert_eq!(ollama.model_env.as_deref(), Some("OLLAMA_MODEL"));
}

#[test]
fn blank_configured_key_is_treated_as_absent() {
    let config =
        StudyOsConfig::load_from_str(r#"{ providers: { openai: { api_key: "   " } } }"#)
            .expect("config");
    assert_eq!(config.providers.resolved(ProviderKind::OpenAi).api_key, None);
}

#[test]
fn layered_config_prefers_repo_over_cwd() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let project_root = root.join("project");
    fs::create_dir_all(project_root.join(".git")).expect("git");
    let cwd = project_root.join("subdir");
    fs::create_dir_all(&cwd).expect("cwd");

    let system_config = root.join("system.json5");
    write_json5(&system_config, &topic_layer("system"));
    let user_config = root.join("user.json5");
    write_json5(&user_config, &topic_layer("user"));
    write_json5(&project_root.join(CONFIG_FILE_NAME), &topic_layer("project"));
    write_json5(&cwd.join(CONFIG_FILE_NAME), &topic_layer("cwd"));
    write_json5(
        &project_root
            .join(CONFIG_DIR_NAME)
            .join(CONFIG_FILE_NAME),
        &topic_layer("repo"),
    );

    let mut options = LayeredConfigOptions::new(&cwd);
    options.system_config_path = Some(system_config);
    options.user_config_path = Some(user_config);

    let layered = StudyOsConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.exam.topic, "repo");
    let sources: Vec<ConfigLayerSource> =
        layered.layers.iter().map(|layer| layer.source).collect();
    assert_eq!(
        sources,
        vec![
            ConfigLayerSource::System,
            ConfigLayerSource::User,
            ConfigLayerSource::Project,
            ConfigLayerSource::Cwd,
            ConfigLayerSource::Repo,
        ]
    );
}

#[test]
fn runtime_layer_overrides_everything() {
    let temp = TempDir::new().expect("tmp");
    let root = temp.path();
    let cwd = root.join("cwd");
    fs::create_dir_all(&cwd).expect("cwd");
    write_json5(
        &cwd.join(CONFIG_FILE_NAME),
        "{ exam: { topic: \"cwd\", duration_minutes: 20 } }",
    );
    let runtime = root.join("runtime.json5");
    write_json5(&runtime, &topic_layer("runtime"));

    let mut options = LayeredConfigOptions::new(&cwd).with_runtime_path(&runtime);
    options.system_config_path = None;
    options.user_config_path = None;

    let layered = StudyOsConfig::load_layered_with_options(options).expect("layered");
    assert_eq!(layered.config.exam.topic, "runtime");
    assert_eq!(layered.config.exam.duration_minutes, 20);
    assert_eq!(layered.layers.len(), 2);
}

#[test]
fn missing_runtime_layer_is_an_error() {
    let temp = TempDir::new().expect("tmp");
    let mut options =
        LayeredConfigOptions::new(temp.path()).with_runtime_path(temp.path().join("absent.json5"));
    options.system_config_path = None;
    options.user_config_path = None;

    let err = StudyOsConfig::load_layered_with_options(options).unwrap_err();
    assert!(matches!(err, ConfigError::ReadFailed(_)));
}

#[test]
fn schema_errors_name_the_offending_layer() {
    let temp = TempDir::new().expect("tmp");
    let cwd = temp.path().join("cwd");
    write_json5(&cwd.join(CONFIG_FILE_NAME), "{ server: { port: 3001 } }");

    let mut options = LayeredConfigOptions::new(&cwd);
    options.system_config_path = None;
    options.user_config_path = None;

    let err = StudyOsConfig::load_layered_with_options(options).unwrap_err();
    let msg = format!("{err}");
    assert!(msg.contains("cwd("));
    assert!(msg.contains("server.port"));
}
