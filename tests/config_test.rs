//! 配置加载：缺失时写默认文件、文件覆盖默认值、非法配置被拒绝

use std::fs;

use pixelprompt::config::{load_config, AppConfig, ConfigLoadError};
use pixelprompt::llm::ChatOptions;

#[test]
fn test_missing_file_writes_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let cfg = load_config(Some(path.clone())).unwrap();
    assert!(path.exists());

    let defaults = AppConfig::default();
    assert_eq!(cfg.window.fps_target, defaults.window.fps_target);
    assert_eq!(cfg.agents.len(), 1);
    assert_eq!(cfg.agents[0].id, "agent_001");
    assert_eq!(cfg.agents[0].provider, "ollama");

    // 写出的文件本身可再次加载
    let again = load_config(Some(path)).unwrap();
    assert_eq!(again.agents[0].name, cfg.agents[0].name);
}

#[test]
fn test_file_overrides_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(
        &path,
        r##"
[window]
fps_target = 30

[orchestrator]
poll_interval_ms = 200

[llm_providers.mock]
enabled = true

[[agents]]
id = "a1"
name = "Ada"
provider = "mock"
model = "echo"
spawn_position = [400.0, 300.0]
color_hex = "#FF8800"
system_prompt = "Be terse."

[[agents]]
id = "a2"
name = "Bit"
provider = "ollama"
model = "llama3.2:3b"
spawn_position = [800.0, 500.0]
color_hex = "#112233"
"##,
    )
    .unwrap();

    let cfg = load_config(Some(path)).unwrap();
    assert_eq!(cfg.window.fps_target, 30);
    // 未覆盖的字段保留默认值
    assert_eq!(cfg.window.width, 1280);
    assert_eq!(cfg.orchestrator.poll_interval_ms, 200);
    assert!(cfg.llm_providers["mock"].enabled);
    assert!(cfg.llm_providers["ollama"].enabled);

    let ids: Vec<&str> = cfg.agents.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, vec!["a1", "a2"]);
    assert_eq!(cfg.agents[0].name, "Ada");
    assert_eq!(cfg.agents[0].provider, "mock");
    assert_eq!(cfg.agents[1].spawn_position, [800.0, 500.0]);

    let names: Vec<&str> = cfg.enabled_providers().map(|(n, _)| n).collect();
    assert_eq!(names, vec!["mock", "ollama"]);
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[window]\nfps_target = 1000\n").unwrap();

    let err = load_config(Some(path)).unwrap_err();
    assert!(matches!(err, ConfigLoadError::Invalid(ref msg) if msg.contains("fps_target")), "got {err}");
}

#[test]
fn test_malformed_toml_is_a_source_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[window\nfps_target = ").unwrap();

    let err = load_config(Some(path)).unwrap_err();
    assert!(matches!(err, ConfigLoadError::Source(_)), "got {err}");
}

#[test]
fn test_non_finite_and_oversized_numbers_are_rejected() {
    let cases = [
        ("[animation]\nwander_radius = inf\n", "wander_radius"),
        ("[animation]\nidle_wait_max = inf\n", "idle_wait_max"),
        ("[animation]\nmove_speed = nan\n", "move_speed"),
        ("[animation]\nshake_rate = -4.0\n", "shake_rate"),
        ("[ui]\nbubble_lifetime_secs = 1e20\n", "bubble_lifetime_secs"),
        ("[orchestrator]\nstop_timeout_secs = inf\n", "stop_timeout_secs"),
    ];
    for (text, field) in cases {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, text).unwrap();

        let err = load_config(Some(path)).unwrap_err();
        assert!(
            matches!(err, ConfigLoadError::Invalid(ref msg) if msg.contains(field)),
            "{field}: got {err}"
        );
    }
}

#[test]
fn test_chat_options_section() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[chat]\ntemperature = 0.5\nnum_predict = 128\n").unwrap();

    let cfg = load_config(Some(path)).unwrap();
    assert_eq!(
        cfg.chat.to_options(),
        ChatOptions {
            temperature: Some(0.5),
            num_predict: Some(128),
        }
    );

    assert!(AppConfig::default().chat.to_options().is_empty());
}

#[test]
fn test_out_of_range_temperature_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    fs::write(&path, "[chat]\ntemperature = 9.0\n").unwrap();

    let err = load_config(Some(path)).unwrap_err();
    assert!(matches!(err, ConfigLoadError::Invalid(ref msg) if msg.contains("temperature")), "got {err}");
}
