use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::selector::{ConfigError, FieldSelector, SelectorSet};

/// Name of the per-directory override file.
pub const LOCAL_CONFIG_FILE: &str = ".marceval.toml";

/// On-disk TOML configuration structure.
/// All fields are optional so partial configs work (merge with defaults).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigFile {
    pub evaluation: Option<EvaluationConfig>,
    /// When present, replaces the preset entirely.
    pub selectors: Option<Vec<FieldSelector>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationConfig {
    pub workers: Option<usize>,
    /// `marc` or `five_field`.
    pub preset: Option<String>,
    pub skip_withdrawn: Option<bool>,
}

impl ConfigFile {
    pub fn workers(&self) -> Option<usize> {
        self.evaluation.as_ref().and_then(|e| e.workers)
    }

    pub fn preset(&self) -> Option<&str> {
        self.evaluation.as_ref().and_then(|e| e.preset.as_deref())
    }

    pub fn skip_withdrawn(&self) -> Option<bool> {
        self.evaluation.as_ref().and_then(|e| e.skip_withdrawn)
    }

    /// Resolve the selector configuration: explicit `[[selectors]]`, else the
    /// named preset, else the MARC default.
    pub fn selector_set(&self) -> Result<SelectorSet, ConfigError> {
        match (&self.selectors, self.preset()) {
            (Some(selectors), _) => SelectorSet::new(selectors.clone()),
            (None, Some(preset)) => SelectorSet::preset(preset),
            (None, None) => Ok(SelectorSet::marc_default()),
        }
    }
}

/// Platform config directory path: `<config_dir>/marceval/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("marceval").join("config.toml"))
}

/// Load config by cascading CWD `.marceval.toml` over platform config, then
/// `explicit` over both. Missing or unreadable cascade files are skipped;
/// an explicit path that cannot be read is an error.
pub fn load_config(explicit: Option<&Path>) -> Result<ConfigFile, String> {
    let platform = config_path().and_then(|p| load_from_path(&p));
    let cwd = load_from_path(Path::new(LOCAL_CONFIG_FILE));

    let mut config = match (platform, cwd) {
        (None, None) => ConfigFile::default(),
        (Some(p), None) => p,
        (None, Some(c)) => c,
        (Some(p), Some(c)) => merge(p, c),
    };

    if let Some(path) = explicit {
        config = merge(config, read_config(path)?);
    }
    Ok(config)
}

/// Read and parse one config file.
pub fn read_config(path: &Path) -> Result<ConfigFile, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {}", path.display(), e))?;
    toml::from_str(&content).map_err(|e| format!("Failed to parse config {}: {}", path.display(), e))
}

/// Load a config from a specific path. Returns `None` if the file doesn't
/// exist or can't be parsed.
pub fn load_from_path(path: &Path) -> Option<ConfigFile> {
    match read_config(path) {
        Ok(config) => Some(config),
        Err(e) => {
            if path.exists() {
                tracing::warn!(error = %e, "ignoring config file");
            }
            None
        }
    }
}

/// Merge two configs: `overlay` values take precedence over `base`.
/// A selector list is replaced as a whole, never merged entry by entry, and
/// a `preset` in the overlay drops any selector list inherited from `base`.
pub fn merge(base: ConfigFile, overlay: ConfigFile) -> ConfigFile {
    let base_eval = base.evaluation.unwrap_or_default();
    let overlay_eval = overlay.evaluation.unwrap_or_default();

    let selectors = match (overlay.selectors, &overlay_eval.preset) {
        (Some(selectors), _) => Some(selectors),
        (None, Some(_)) => None,
        (None, None) => base.selectors,
    };

    ConfigFile {
        evaluation: Some(EvaluationConfig {
            workers: overlay_eval.workers.or(base_eval.workers),
            preset: overlay_eval.preset.or(base_eval.preset),
            skip_withdrawn: overlay_eval.skip_withdrawn.or(base_eval.skip_withdrawn),
        }),
        selectors,
    }
}

/// Save a config to `path`, or to the platform config directory.
pub fn save_config(config: &ConfigFile, path: Option<&Path>) -> Result<PathBuf, String> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => config_path().ok_or_else(|| "Could not determine config directory".to_string())?,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let content =
        toml::to_string_pretty(config).map_err(|e| format!("Failed to serialize config: {}", e))?;
    std::fs::write(&path, content).map_err(|e| format!("Failed to write config: {}", e))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::Occurrence;

    const CUSTOM: &str = r#"
[evaluation]
workers = 8
preset = "five_field"

[[selectors]]
name = "title"
tags = ["245"]
codes = "ab"
weight = 0.6

[[selectors]]
name = "subject"
tags = ["6XX"]
codes = "a"
occurrence = "all"
weight = 0.4
"#;

    #[test]
    fn parses_selectors_and_evaluation() {
        let parsed: ConfigFile = toml::from_str(CUSTOM).unwrap();
        assert_eq!(parsed.workers(), Some(8));
        let set = parsed.selector_set().unwrap();
        let names: Vec<&str> = set.names().collect();
        assert_eq!(names, vec!["title", "subject"]);
        assert_eq!(set.selectors()[1].occurrence, Occurrence::All);
    }

    #[test]
    fn preset_used_without_selectors() {
        let parsed: ConfigFile = toml::from_str("[evaluation]\npreset = \"five_field\"\n").unwrap();
        assert_eq!(parsed.selector_set().unwrap(), SelectorSet::five_field());
        assert_eq!(
            ConfigFile::default().selector_set().unwrap(),
            SelectorSet::marc_default()
        );
    }

    #[test]
    fn invalid_selectors_are_config_errors() {
        let parsed: ConfigFile = toml::from_str(
            "[[selectors]]\nname = \"title\"\ntags = [\"245\"]\nweight = -1.0\n",
        )
        .unwrap();
        assert!(matches!(
            parsed.selector_set(),
            Err(ConfigError::NegativeWeight { .. })
        ));
    }

    #[test]
    fn merge_overlay_wins() {
        let base = ConfigFile {
            evaluation: Some(EvaluationConfig {
                workers: Some(2),
                preset: Some("marc".into()),
                skip_withdrawn: Some(false),
            }),
            selectors: None,
        };
        let overlay = ConfigFile {
            evaluation: Some(EvaluationConfig {
                workers: Some(16),
                ..Default::default()
            }),
            ..Default::default()
        };
        let merged = merge(base, overlay);
        assert_eq!(merged.workers(), Some(16));
        assert_eq!(merged.preset(), Some("marc"));
        assert_eq!(merged.skip_withdrawn(), Some(false));
    }

    #[test]
    fn merge_replaces_selector_list_whole() {
        let base: ConfigFile = toml::from_str(CUSTOM).unwrap();
        let overlay: ConfigFile =
            toml::from_str("[[selectors]]\nname = \"isbn\"\ntags = [\"020\"]\nweight = 1.0\n")
                .unwrap();
        let merged = merge(base.clone(), overlay);
        assert_eq!(merged.selectors.as_ref().unwrap().len(), 1);
        assert_eq!(merged.workers(), Some(8));

        let kept = merge(base, ConfigFile::default());
        assert_eq!(kept.selectors.unwrap().len(), 2);
    }

    #[test]
    fn later_preset_drops_inherited_selectors() {
        let platform: ConfigFile = toml::from_str(CUSTOM).unwrap();
        let local: ConfigFile = toml::from_str("[evaluation]\npreset = \"marc\"\n").unwrap();
        let merged = merge(platform, local);
        assert_eq!(merged.selectors, None);
        assert_eq!(merged.preset(), Some("marc"));
        assert_eq!(merged.workers(), Some(8));
        assert_eq!(merged.selector_set().unwrap(), SelectorSet::marc_default());
    }

    #[test]
    fn save_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config: ConfigFile = toml::from_str(CUSTOM).unwrap();
        let written = save_config(&config, Some(&path)).unwrap();
        assert_eq!(written, path);
        assert_eq!(read_config(&path).unwrap(), config);
    }

    #[test]
    fn explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(load_config(Some(&missing)).is_err());
    }

    #[test]
    fn explicit_path_overlays_cascade() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "[evaluation]\nworkers = 3\n").unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.workers(), Some(3));
    }
}
