//! Project descriptor for a mine build.
//!
//! The descriptor lists the mine's sources in the order they must be
//! integrated. Order in the file is the build order, so sources are an
//! array of tables rather than a keyed table.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Top-level project descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Mine-wide settings
    pub mine: MineSettings,

    /// Sources, in integration order
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Settings shared by every step of the build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MineSettings {
    /// Mine name, e.g. "biotestmine"
    pub name: String,

    /// Path to the gradle wrapper used for schema, integrate and postprocess
    #[serde(default = "default_gradle")]
    pub gradle: PathBuf,

    /// Alias of the database section in the mine properties file
    #[serde(default = "default_db_alias")]
    pub db_alias: String,

    /// Printed once the build reaches the end
    #[serde(default = "default_post_build_hint")]
    pub post_build_hint: String,
}

fn default_gradle() -> PathBuf {
    PathBuf::from("./gradlew")
}

fn default_db_alias() -> String {
    "production".to_string()
}

fn default_post_build_hint() -> String {
    "Now run \"./gradlew tomcatStartWar\"".to_string()
}

/// One `[[sources]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Unique source name
    pub name: String,

    /// Source type as understood by the integrator
    #[serde(rename = "type")]
    pub source_type: String,

    /// Take a checkpoint after this source integrates
    #[serde(default)]
    pub dump: bool,

    /// Opaque parameters handed to the integrator
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Project {
    /// Load a project descriptor from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ProjectError> {
        let content = std::fs::read_to_string(path).map_err(|e| ProjectError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        Self::from_toml_str(&content, path)
    }

    /// Parse a project descriptor; `path` is only used for error messages.
    pub fn from_toml_str(content: &str, path: &Path) -> Result<Self, ProjectError> {
        let mut project: Project = toml::from_str(content).map_err(|e| ProjectError::Parse {
            path: path.to_owned(),
            source: e,
        })?;

        for source in &mut project.sources {
            source.params = expand_params(&source.params);
        }
        Ok(project)
    }
}

static ENV_VAR: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"));

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();

    for cap in ENV_VAR.captures_iter(s) {
        if let Ok(value) = std::env::var(&cap[1]) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

fn expand_params(params: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    params
        .iter()
        .map(|(k, v)| (k.clone(), expand_env_vars(v)))
        .collect()
}

/// Project descriptor and properties errors.
#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse project descriptor {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing property '{key}' in {path}")]
    MissingProperty { path: PathBuf, key: String },

    #[error("Invalid value for property '{key}' in {path}: {value}")]
    InvalidProperty {
        path: PathBuf,
        key: String,
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    const DESCRIPTOR: &str = r#"
[mine]
name = "biotestmine"

[[sources]]
name = "uniprot"
type = "uniprot"
dump = true
[sources.params]
"src.data.dir" = "/data/uniprot"

[[sources]]
name = "go"
type = "go"

[[sources]]
name = "entrez"
type = "entrez-organism"
dump = true
"#;

    #[test]
    fn test_sources_keep_file_order() {
        let project = Project::from_toml_str(DESCRIPTOR, Path::new("project.toml")).unwrap();
        let names: Vec<_> = project.sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["uniprot", "go", "entrez"]);
        assert!(project.sources[0].dump);
        assert!(!project.sources[1].dump);
        assert_eq!(project.sources[2].source_type, "entrez-organism");
        assert_eq!(
            project.sources[0].params.get("src.data.dir").map(String::as_str),
            Some("/data/uniprot")
        );
    }

    #[test]
    fn test_mine_defaults() {
        let project = Project::from_toml_str(DESCRIPTOR, Path::new("project.toml")).unwrap();
        assert_eq!(project.mine.gradle, PathBuf::from("./gradlew"));
        assert_eq!(project.mine.db_alias, "production");
        assert!(project.mine.post_build_hint.contains("tomcatStartWar"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = Project::from_toml_str("[mine", Path::new("broken.toml")).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_unset_env_var_left_unchanged() {
        let s = "${MINEBUILD_SURELY_UNSET_VARIABLE}/data";
        assert_eq!(expand_env_vars(s), s);
    }
}
