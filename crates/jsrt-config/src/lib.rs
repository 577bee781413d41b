use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "jsrt.json";
pub const DEFAULT_BACKEND: &str = "boa";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub backend: Option<String>,
    pub fallback: Option<Vec<String>>,
    pub log: Option<String>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EnvConfig {
    pub backend: Option<String>,
    pub fallback: Option<Vec<String>>,
    pub log: Option<String>,
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CliOverrides {
    pub backend: Option<String>,
    pub fallback: Option<Vec<String>>,
    pub verbose: Option<bool>,
}

/// Backend selection after merging CLI, environment, file and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub backend: String,
    pub fallback: Vec<String>,
    pub log: Option<String>,
    pub verbose: bool,
}

impl Default for Selection {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            fallback: Vec::new(),
            log: None,
            verbose: false,
        }
    }
}

impl Selection {
    /// Preferred backend first, then fallbacks, without repeats.
    pub fn candidates(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.fallback.len() + 1);
        for id in std::iter::once(&self.backend).chain(&self.fallback) {
            if !out.contains(id) {
                out.push(id.clone());
            }
        }
        out
    }

    /// Filter directive for the log subscriber.
    pub fn log_filter(&self) -> String {
        match (&self.log, self.verbose) {
            (Some(filter), _) => filter.clone(),
            (None, true) => "debug".to_string(),
            (None, false) => "warn".to_string(),
        }
    }
}

/// Places searched for a config file when none is given explicitly.
pub fn config_candidates(cwd: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![cwd.join(CONFIG_FILE_NAME)];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("jsrt").join(CONFIG_FILE_NAME));
    }
    candidates
}

pub fn load_file_config(explicit_path: Option<&Path>, cwd: &Path) -> Result<Option<FileConfig>> {
    let path = match explicit_path {
        Some(p) => p.to_path_buf(),
        None => match config_candidates(cwd).into_iter().find(|c| c.exists()) {
            Some(found) => found,
            None => return Ok(None),
        },
    };

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed reading config file {}", path.display()))?;
    let parsed: FileConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed parsing config file {}", path.display()))?;
    Ok(Some(parsed))
}

impl EnvConfig {
    pub fn from_current_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            backend: lookup("JSRT_BACKEND").and_then(|v| non_empty(&v)),
            fallback: lookup("JSRT_FALLBACK").map(|v| parse_list(&v)),
            log: lookup("JSRT_LOG").and_then(|v| non_empty(&v)),
            verbose: lookup("JSRT_VERBOSE").and_then(|v| parse_bool(&v)),
        }
    }
}

pub fn resolve_selection(
    cli: &CliOverrides,
    env_cfg: &EnvConfig,
    file_cfg: Option<&FileConfig>,
) -> Selection {
    let base = Selection::default();

    let backend = cli
        .backend
        .clone()
        .or_else(|| env_cfg.backend.clone())
        .or_else(|| file_cfg.and_then(|c| c.backend.clone()))
        .unwrap_or(base.backend);

    let fallback = cli
        .fallback
        .clone()
        .or_else(|| env_cfg.fallback.clone())
        .or_else(|| file_cfg.and_then(|c| c.fallback.clone()))
        .unwrap_or(base.fallback);

    let log = env_cfg
        .log
        .clone()
        .or_else(|| file_cfg.and_then(|c| c.log.clone()))
        .or(base.log);

    let verbose = cli
        .verbose
        .or(env_cfg.verbose)
        .or(file_cfg.and_then(|c| c.verbose))
        .unwrap_or(base.verbose);

    Selection {
        backend,
        fallback,
        log,
        verbose,
    }
}

pub fn parse_list(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| item.to_ascii_lowercase())
        .collect()
}

fn non_empty(input: &str) -> Option<String> {
    let trimmed = input.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn parse_bool(input: &str) -> Option<bool> {
    match input.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        CliOverrides, EnvConfig, FileConfig, Selection, load_file_config, parse_list,
        resolve_selection,
    };
    use std::collections::HashMap;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn valid_config_parses() {
        let dir = tempdir().expect("tempdir should work");
        let path = dir.path().join("jsrt.json");
        fs::write(&path, r#"{"backend":"v8","fallback":["boa"]}"#).expect("write should work");

        let parsed = load_file_config(None, dir.path())
            .expect("parse should work")
            .expect("file should exist");
        assert_eq!(parsed.backend.as_deref(), Some("v8"));
        assert_eq!(parsed.fallback, Some(vec!["boa".to_string()]));
    }

    #[test]
    fn explicit_path_wins_over_cwd() {
        let dir = tempdir().expect("tempdir should work");
        fs::write(dir.path().join("jsrt.json"), r#"{"backend":"cwd"}"#)
            .expect("write should work");
        let explicit = dir.path().join("custom.json");
        fs::write(&explicit, r#"{"backend":"explicit"}"#).expect("write should work");

        let parsed = load_file_config(Some(&explicit), dir.path())
            .expect("parse should work")
            .expect("file should exist");
        assert_eq!(parsed.backend.as_deref(), Some("explicit"));
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempdir().expect("tempdir should work");
        let err = load_file_config(Some(&dir.path().join("nope.json")), dir.path())
            .expect_err("missing file should fail");
        assert!(format!("{err:#}").contains("failed reading config file"));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let dir = tempdir().expect("tempdir should work");
        let path = dir.path().join("jsrt.json");
        fs::write(&path, r#"{"engine":"boa"}"#).expect("write should work");

        let err = load_file_config(None, dir.path()).expect_err("parse should fail");
        assert!(format!("{err:#}").contains("unknown field"));
    }

    #[test]
    fn malformed_json_has_location() {
        let dir = tempdir().expect("tempdir should work");
        let path = dir.path().join("jsrt.json");
        fs::write(&path, "{\n  \"backend\":\n").expect("write should work");

        let err = load_file_config(None, dir.path()).expect_err("parse should fail");
        assert!(
            format!("{err:#}").contains("line") || format!("{err:#}").contains("column"),
            "expected location details, got: {err}"
        );
    }

    #[test]
    fn env_values_are_normalized() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("JSRT_BACKEND", " v8 "),
            ("JSRT_FALLBACK", "Boa, ,quickjs"),
            ("JSRT_VERBOSE", "yes"),
            ("JSRT_LOG", ""),
        ]);
        let env_cfg = EnvConfig::from_lookup(|key| vars.get(key).map(|v| v.to_string()));
        assert_eq!(env_cfg.backend.as_deref(), Some("v8"));
        assert_eq!(
            env_cfg.fallback,
            Some(vec!["boa".to_string(), "quickjs".to_string()])
        );
        assert_eq!(env_cfg.verbose, Some(true));
        assert_eq!(env_cfg.log, None);
    }

    #[test]
    fn precedence_cli_env_file_defaults() {
        let file = FileConfig {
            backend: Some("file".to_string()),
            fallback: Some(vec!["file-fallback".to_string()]),
            log: Some("info".to_string()),
            verbose: Some(false),
        };
        let env_cfg = EnvConfig {
            backend: Some("env".to_string()),
            verbose: Some(false),
            ..EnvConfig::default()
        };
        let cli = CliOverrides {
            backend: Some("cli".to_string()),
            verbose: Some(true),
            ..CliOverrides::default()
        };

        let resolved = resolve_selection(&cli, &env_cfg, Some(&file));
        assert_eq!(resolved.backend, "cli");
        assert_eq!(resolved.fallback, vec!["file-fallback".to_string()]);
        assert_eq!(resolved.log.as_deref(), Some("info"));
        assert!(resolved.verbose);

        let defaults = resolve_selection(&CliOverrides::default(), &EnvConfig::default(), None);
        assert_eq!(defaults, Selection::default());
    }

    #[test]
    fn candidates_keep_order_and_drop_repeats() {
        let selection = Selection {
            backend: "v8".to_string(),
            fallback: parse_list("boa,v8,boa"),
            ..Selection::default()
        };
        assert_eq!(selection.candidates(), vec!["v8".to_string(), "boa".to_string()]);
    }

    #[test]
    fn log_filter_prefers_explicit_directive() {
        let mut selection = Selection {
            verbose: true,
            ..Selection::default()
        };
        assert_eq!(selection.log_filter(), "debug");
        selection.log = Some("jsrt_core=trace".to_string());
        assert_eq!(selection.log_filter(), "jsrt_core=trace");
        assert_eq!(Selection::default().log_filter(), "warn");
    }
}
