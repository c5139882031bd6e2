//! Configuration file
//!
//! TOML by default; files ending in `.yaml` or `.yml` are read as YAML.
//!
//! ```toml
//! [engine]
//! numeric_tolerance = { epsilon = 0.001 }
//! baseline_noise = "suppress_baseline_divergence"
//!
//! [store]
//! snapshot_ttl_secs = 30
//!
//! [summary]
//! ignorable_fields = ["timestamp"]
//!
//! [[noise]]
//! endpoint = "/users/1"
//! patterns = ["ts", "items[*].id"]
//!
//! [[transformation]]
//! injection_point = "candidate:user.email"
//! source = "trim | lower"
//! ```

use diffy_engine::{EngineConfig, SummaryOptions, TransformRuntime};
use diffy_model::{FieldPattern, InjectionPoint, NoiseRule, Transformation};
use diffy_store::StoreConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Errors loading a configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or shape error
    #[error("invalid TOML in {}: {source}", .path.display())]
    Toml {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: toml::de::Error,
    },

    /// YAML syntax or shape error
    #[error("invalid YAML in {}: {source}", .path.display())]
    Yaml {
        /// File path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: serde_yaml::Error,
    },

    /// Rules that cannot be used
    #[error("invalid configuration: {}", join_issues(.0))]
    Invalid(Vec<ConfigIssue>),
}

fn join_issues(issues: &[ConfigIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// One problem found in a configuration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    /// Where the problem is, e.g. `noise[0].patterns[2]`
    pub location: String,
    /// What is wrong
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

/// Noise patterns for one endpoint, as written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoiseEntry {
    /// Endpoint name
    pub endpoint: String,
    /// Pattern texts
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Transformation, as written
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformationEntry {
    /// Injection point text, e.g. `candidate:user.token`
    pub injection_point: String,
    /// Transformation source
    pub source: String,
}

/// Contents of a configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiffyConfig {
    /// Analyzer settings
    pub engine: EngineConfig,
    /// Snapshot cache settings
    pub store: StoreConfig,
    /// Run summary settings
    pub summary: SummaryOptions,
    /// Noise rules
    pub noise: Vec<NoiseEntry>,
    /// Transformations in declaration order
    #[serde(rename = "transformation")]
    pub transformations: Vec<TransformationEntry>,
}

impl DiffyConfig {
    /// Read configuration from `path`
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read or parsed
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let yaml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        if yaml {
            serde_yaml::from_str(&text).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })
        } else {
            Self::from_toml(&text).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// Returns the TOML error if the text is malformed
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Parsed noise rules
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] listing every malformed pattern
    pub fn noise_rules(&self) -> Result<Vec<NoiseRule>, ConfigError> {
        let mut issues = Vec::new();
        let mut rules = Vec::with_capacity(self.noise.len());
        for (i, entry) in self.noise.iter().enumerate() {
            let mut patterns = Vec::with_capacity(entry.patterns.len());
            for (j, text) in entry.patterns.iter().enumerate() {
                match text.parse::<FieldPattern>() {
                    Ok(pattern) => patterns.push(pattern),
                    Err(err) => issues.push(ConfigIssue {
                        location: format!("noise[{i}].patterns[{j}]"),
                        message: format!("'{text}': {err}"),
                    }),
                }
            }
            rules.push(NoiseRule::new(entry.endpoint.clone(), patterns));
        }
        if issues.is_empty() {
            Ok(rules)
        } else {
            Err(ConfigError::Invalid(issues))
        }
    }

    /// Parsed transformations in declaration order
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] listing every malformed injection point
    pub fn transformations(&self) -> Result<Vec<Transformation>, ConfigError> {
        let mut issues = Vec::new();
        let mut transformations = Vec::with_capacity(self.transformations.len());
        for (i, entry) in self.transformations.iter().enumerate() {
            match entry.injection_point.parse::<InjectionPoint>() {
                Ok(ip) => transformations.push(Transformation::new(ip, entry.source.clone())),
                Err(err) => issues.push(ConfigIssue {
                    location: format!("transformation[{i}].injection_point"),
                    message: format!("'{}': {err}", entry.injection_point),
                }),
            }
        }
        if issues.is_empty() {
            Ok(transformations)
        } else {
            Err(ConfigError::Invalid(issues))
        }
    }

    /// Every problem in the configuration
    ///
    /// Covers engine settings, noise patterns, injection points and
    /// transformation sources compiled with `runtime`.
    #[must_use]
    pub fn check(&self, runtime: &dyn TransformRuntime) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if let Err(err) = self.engine.validate() {
            issues.push(ConfigIssue {
                location: "engine".to_string(),
                message: err.to_string(),
            });
        }
        if self.store.snapshot_capacity == 0 {
            issues.push(ConfigIssue {
                location: "store.snapshot_capacity".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if let Err(ConfigError::Invalid(found)) = self.noise_rules() {
            issues.extend(found);
        }
        for (i, entry) in self.transformations.iter().enumerate() {
            if let Err(err) = entry.injection_point.parse::<InjectionPoint>() {
                issues.push(ConfigIssue {
                    location: format!("transformation[{i}].injection_point"),
                    message: format!("'{}': {err}", entry.injection_point),
                });
            }
            if let Err(err) = runtime.compile(&entry.source) {
                issues.push(ConfigIssue {
                    location: format!("transformation[{i}].source"),
                    message: err.to_string(),
                });
            }
        }
        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diffy_engine::{BaselineNoisePolicy, NumericTolerance, PipelineRuntime};
    use pretty_assertions::assert_eq;

    const FULL: &str = r#"
[engine]
numeric_tolerance = { epsilon = 0.01 }
baseline_noise = "suppress_baseline_divergence"

[store]
snapshot_ttl_secs = 5

[[noise]]
endpoint = "/users/1"
patterns = ["ts", "items[*].id"]

[[transformation]]
injection_point = "candidate:email"
source = "trim | lower"
"#;

    #[test]
    fn test_config_full_toml() {
        let config = DiffyConfig::from_toml(FULL).unwrap();
        assert_eq!(config.engine.numeric_tolerance, NumericTolerance::Epsilon(0.01));
        assert_eq!(
            config.engine.baseline_noise,
            BaselineNoisePolicy::SuppressBaselineDivergence
        );
        assert_eq!(config.engine.max_depth, EngineConfig::default().max_depth);
        assert_eq!(config.store.snapshot_ttl_secs, 5);
        assert_eq!(config.noise_rules().unwrap()[0].patterns.len(), 2);
        assert_eq!(
            config.transformations().unwrap()[0].injection_point.to_string(),
            "candidate:email"
        );
        assert!(config.check(&PipelineRuntime::new()).is_empty());
    }

    #[test]
    fn test_config_empty_is_default() {
        assert_eq!(DiffyConfig::from_toml("").unwrap(), DiffyConfig::default());
    }

    #[test]
    fn test_config_rejects_unknown_sections() {
        assert!(DiffyConfig::from_toml("[engin]\nmax_depth = 3\n").is_err());
    }

    #[test]
    fn test_config_check_reports_every_issue() {
        let config = DiffyConfig::from_toml(
            r#"
[engine]
max_depth = 0

[[noise]]
endpoint = "/e"
patterns = ["ok", "a..b", ""]

[[transformation]]
injection_point = "all:a..b"
source = "lower"

[[transformation]]
injection_point = "all:y"
source = "frobnicate"
"#,
        )
        .unwrap();

        let locations: Vec<_> = config
            .check(&PipelineRuntime::new())
            .into_iter()
            .map(|issue| issue.location)
            .collect();
        assert_eq!(
            locations,
            vec![
                "engine",
                "noise[0].patterns[1]",
                "noise[0].patterns[2]",
                "transformation[0].injection_point",
                "transformation[1].source",
            ]
        );
        assert!(matches!(config.noise_rules(), Err(ConfigError::Invalid(v)) if v.len() == 2));
    }

    #[test]
    fn test_config_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("diffy.yaml");
        std::fs::write(
            &path,
            "noise:\n  - endpoint: /e\n    patterns: [ts]\nsummary:\n  ignorable_fields: [ts]\n",
        )
        .unwrap();

        let config = DiffyConfig::load(&path).unwrap();
        assert_eq!(config.noise[0].patterns, vec!["ts"]);
        assert!(config.summary.ignorable_fields.contains("ts"));
    }

    #[test]
    fn test_config_missing_file() {
        let err = DiffyConfig::load(Path::new("/nonexistent/diffy.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
