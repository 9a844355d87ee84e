//! Tests for loading configuration from disk and building from it.

use std::io::Write;

use nudge::{NudgeError, Orchestrator, OrchestratorConfig, ProviderConfig};
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn load_from_explicit_path() {
    let file = write_config(
        r#"
        primary_provider = "local"
        cache_max_entries = 25

        [[providers]]
        type = "ollama"
        name = "local"
        model = "qwen2.5"
    "#,
    );

    let config = OrchestratorConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.primary_provider.as_deref(), Some("local"));
    assert_eq!(config.cache_max_entries, 25);
    assert_eq!(config.providers[0].kind(), "ollama");
    assert_eq!(config.providers[0].name(), "local");
}

#[test]
fn missing_explicit_path_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");
    let err = OrchestratorConfig::load(Some(&missing)).unwrap_err();
    match err {
        NudgeError::Configuration(msg) => assert!(msg.contains("not found"), "{msg}"),
        other => panic!("expected Configuration error, got {other:?}"),
    }
}

#[test]
fn invalid_toml_names_the_file() {
    let file = write_config("queue_concurrency = \"lots\"");
    let err = OrchestratorConfig::load(Some(file.path())).unwrap_err();
    match err {
        NudgeError::Configuration(msg) => {
            let name = file.path().file_name().unwrap().to_string_lossy();
            assert!(msg.contains(name.as_ref()), "{msg}");
        }
        other => panic!("expected Configuration error, got {other:?}"),
    }
}

#[test]
fn unknown_provider_type_is_rejected() {
    let err = OrchestratorConfig::from_toml(
        r#"
        [[providers]]
        type = "gemini"
    "#,
    )
    .unwrap_err();
    assert!(matches!(err, NudgeError::Configuration(_)));
}

#[test]
fn duplicate_provider_names_are_rejected() {
    let err = OrchestratorConfig::from_toml(
        r#"
        [[providers]]
        type = "ollama"

        [[providers]]
        type = "ollama"
        base_url = "http://other:11434"
    "#,
    )
    .unwrap_err();
    assert!(matches!(err, NudgeError::Configuration(msg) if msg.contains("duplicate")));
}

#[test]
fn similarity_outside_unit_interval_is_rejected() {
    for value in ["0.0", "1.5"] {
        let toml = format!(
            "shrink_similarity = {value}\n[[providers]]\ntype = \"ollama\"\n"
        );
        assert!(OrchestratorConfig::from_toml(&toml).is_err(), "{value}");
    }
}

#[test]
fn orchestrator_from_config_uses_order_and_names() {
    let config = OrchestratorConfig::from_toml(
        r#"
        primary_provider = "cloud"
        fallback_order = ["local"]

        [[providers]]
        type = "ollama"
        name = "local"

        [[providers]]
        type = "openai"
        name = "cloud"
        api_key = "sk-test"
    "#,
    )
    .unwrap();

    let orchestrator = Orchestrator::from_config(&config).unwrap();
    assert_eq!(orchestrator.providers().order(), vec!["cloud", "local"]);
    assert!(orchestrator.providers().get("cloud").is_some());
    assert_eq!(orchestrator.providers().get("local").unwrap().name(), "local");
}

#[test]
fn config_without_providers_cannot_build() {
    let config = OrchestratorConfig::from_toml("cache_enabled = false").unwrap();
    assert!(matches!(
        Orchestrator::from_config(&config),
        Err(NudgeError::Configuration(_))
    ));
}

#[test]
fn provider_entries_compare_structurally() {
    let config = OrchestratorConfig::from_toml(
        r#"
        [[providers]]
        type = "anthropic"
        api_key = "ak-test"
        timeout_secs = 20
    "#,
    )
    .unwrap();
    assert_eq!(
        config.providers,
        vec![ProviderConfig::Anthropic {
            name: None,
            api_key: Some("ak-test".into()),
            model: None,
            base_url: None,
            timeout_secs: Some(20),
        }]
    );
}
