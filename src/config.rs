use crate::types::ShellConfig;
use chrono::Local;
use std::{
    env,
    fs,
    io::Write,
    path::PathBuf,
};

pub fn repo_root() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn resolve_repo_path(raw: &str) -> PathBuf {
  let path = PathBuf::from(raw);
  if path.is_absolute() {
    path
  } else {
    repo_root().join(path)
  }
}

pub fn config_path() -> PathBuf {
  repo_root().join("config.json")
}

pub fn env_default(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

pub fn env_flag_true_default(key: &str, default: bool) -> bool {
  match env::var(key) {
    Ok(value) => {
      let value = value.trim().to_ascii_lowercase();
      matches!(value.as_str(), "1" | "true" | "yes" | "on")
    }
    Err(_) => default,
  }
}

pub fn apply_env_overrides(mut config: ShellConfig) -> ShellConfig {
  if let Some(value) = env_default("STORAGE_PATH") {
    config.storage_path = value;
  }
  if let Some(value) = env_default("POINT_FORMULA_1") {
    config.point_formula_1 = value;
  }
  if let Some(value) = env_default("POINT_FORMULA_2") {
    config.point_formula_2 = value;
  }
  if let Some(value) = env_default("STANDINGS_SERVER_ADDR") {
    config.standings_server_addr = value;
  }
  config.dedupe_by_seed = env_flag_true_default("DEDUPE_BY_SEED", config.dedupe_by_seed);
  config
}

pub fn load_config_inner() -> Result<ShellConfig, String> {
  let path = config_path();
  if !path.is_file() {
    return Ok(apply_env_overrides(ShellConfig::default()));
  }
  let data = fs::read_to_string(&path).map_err(|e| format!("read config {}: {e}", path.display()))?;
  let config =
    serde_json::from_str::<ShellConfig>(&data).map_err(|e| format!("parse config {}: {e}", path.display()))?;
  Ok(apply_env_overrides(config))
}

pub fn results_journal_path() -> PathBuf {
  repo_root().join("logs").join("results.log")
}

/// Append-only journal of every result report, one entry per match. The
/// journal is diagnostic only; the store stays the source of truth.
pub fn append_results_journal(label: &str, payload: &str) {
  let dir = repo_root().join("logs");
  if fs::create_dir_all(&dir).is_err() {
    return;
  }
  let path = results_journal_path();
  let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
  let entry = format!("[{timestamp}] {label}\n{payload}\n\n");
  if let Ok(mut file) = fs::OpenOptions::new().create(true).append(true).open(&path) {
    let _ = file.write_all(entry.as_bytes());
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_config_round_trips() {
    let config = ShellConfig::default();
    let payload = serde_json::to_string(&config).unwrap();
    let parsed: ShellConfig = serde_json::from_str(&payload).unwrap();
    assert_eq!(parsed.storage_path, config.storage_path);
    assert_eq!(parsed.point_formula_1, "2");
    assert_eq!(parsed.point_formula_2, "1");
    assert!(!parsed.dedupe_by_seed);
  }

  #[test]
  fn test_env_overrides_apply_to_config() {
    env::set_var("STORAGE_PATH", "/tmp/alt_store.json");
    env::set_var("POINT_FORMULA_1", "n*2");
    env::set_var("POINT_FORMULA_2", "   ");
    env::set_var("STANDINGS_SERVER_ADDR", "127.0.0.1:19920");
    env::set_var("DEDUPE_BY_SEED", "true");

    let config = apply_env_overrides(ShellConfig::default());
    assert_eq!(config.storage_path, "/tmp/alt_store.json");
    assert_eq!(config.point_formula_1, "n*2");
    // Whitespace-only values never override the default.
    assert_eq!(config.point_formula_2, "1");
    assert_eq!(config.standings_server_addr, "127.0.0.1:19920");
    assert!(config.dedupe_by_seed);

    for key in [
      "STORAGE_PATH",
      "POINT_FORMULA_1",
      "POINT_FORMULA_2",
      "STANDINGS_SERVER_ADDR",
      "DEDUPE_BY_SEED",
    ] {
      env::remove_var(key);
    }

    let config = apply_env_overrides(ShellConfig::default());
    assert_eq!(config.storage_path, "local_store.json");
    assert!(!config.dedupe_by_seed);
  }

  #[test]
  fn test_resolve_repo_path_absolute_passthrough() {
    let absolute = if cfg!(windows) { "C:\\tmp\\store.json" } else { "/tmp/store.json" };
    assert_eq!(resolve_repo_path(absolute), PathBuf::from(absolute));
    assert!(resolve_repo_path("local_store.json").ends_with("local_store.json"));
  }
}
