//! YAML configuration loader with custom tag support
//!
//! Supports `!include`, `!secret` and `!env_var`. Unknown tags are kept as-is
//! with their inner value processed.

use crate::error::{ConfigError, ConfigResult};
use crate::secrets::Secrets;
use serde_yaml::Value;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// YAML loader with support for Home Assistant custom tags
pub struct YamlLoader {
    /// Base directory for resolving relative paths
    config_dir: PathBuf,
    secrets: Secrets,
    /// Files currently being loaded, for circular include detection
    include_stack: HashSet<PathBuf>,
}

impl YamlLoader {
    /// Create a new YAML loader for the given config directory
    pub fn new(config_dir: impl Into<PathBuf>) -> ConfigResult<Self> {
        let config_dir = config_dir.into();
        let secrets = Secrets::load(&config_dir)?;
        Ok(Self::with_secrets(config_dir, secrets))
    }

    /// Create a loader with pre-loaded secrets
    pub fn with_secrets(config_dir: impl Into<PathBuf>, secrets: Secrets) -> Self {
        Self {
            config_dir: config_dir.into(),
            secrets,
            include_stack: HashSet::new(),
        }
    }

    /// Load and process a YAML file
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> ConfigResult<Value> {
        let path = self.resolve_path(path.as_ref());
        debug!("Loading YAML file: {:?}", path);

        if self.include_stack.contains(&path) {
            return Err(ConfigError::CircularInclude { path });
        }

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadFile {
            path: path.clone(),
            source: e,
        })?;

        self.include_stack.insert(path.clone());
        let result = self.load_string(&content, &path);
        self.include_stack.remove(&path);

        result
    }

    /// Load and process YAML from a string
    pub fn load_string(&mut self, content: &str, source_path: &Path) -> ConfigResult<Value> {
        let value: Value = serde_yaml::from_str(content).map_err(|e| ConfigError::ParseYaml {
            path: source_path.to_path_buf(),
            source: e,
        })?;

        self.process_value(value, source_path)
    }

    fn process_value(&mut self, value: Value, source_path: &Path) -> ConfigResult<Value> {
        match value {
            Value::Tagged(tagged) => self.process_tagged(*tagged, source_path),
            Value::Mapping(map) => {
                let mut result = serde_yaml::Mapping::new();
                for (k, v) in map {
                    let v = self.process_value(v, source_path)?;
                    result.insert(k, v);
                }
                Ok(Value::Mapping(result))
            }
            Value::Sequence(seq) => seq
                .into_iter()
                .map(|v| self.process_value(v, source_path))
                .collect::<ConfigResult<Vec<_>>>()
                .map(Value::Sequence),
            other => Ok(other),
        }
    }

    fn process_tagged(
        &mut self,
        tagged: serde_yaml::value::TaggedValue,
        source_path: &Path,
    ) -> ConfigResult<Value> {
        let tag = tagged.tag.to_string();
        trace!("Processing tag '{}' with value {:?}", tag, tagged.value);

        match tag.as_str() {
            "!include" => {
                let path = tag_argument(&tag, &tagged.value)?;
                let base_dir = source_path.parent().unwrap_or(&self.config_dir);
                let include_path = if Path::new(path).is_absolute() {
                    PathBuf::from(path)
                } else {
                    base_dir.join(path)
                };
                debug!("Including file: {:?}", include_path);
                self.load_file(include_path)
            }
            "!secret" => {
                let key = tag_argument(&tag, &tagged.value)?;
                let secret = self.secrets.get(key)?;
                Ok(Value::String(secret.to_string()))
            }
            "!env_var" => {
                let var = tag_argument(&tag, &tagged.value)?;
                std::env::var(var)
                    .map(Value::String)
                    .map_err(|_| ConfigError::EnvVarNotFound {
                        var: var.to_string(),
                    })
            }
            _ => {
                let processed = self.process_value(tagged.value, source_path)?;
                Ok(Value::Tagged(Box::new(serde_yaml::value::TaggedValue {
                    tag: tagged.tag,
                    value: processed,
                })))
            }
        }
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_dir.join(path)
        }
    }

    /// Get the config directory
    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }
}

fn tag_argument<'a>(tag: &str, value: &'a Value) -> ConfigResult<&'a str> {
    value.as_str().ok_or_else(|| {
        if tag == "!include" {
            ConfigError::InvalidIncludePath {
                path: format!("{:?}", value),
                reason: "path must be a string".to_string(),
            }
        } else {
            ConfigError::InvalidValue {
                key: tag.to_string(),
                reason: "argument must be a string".to_string(),
            }
        }
    })
}

/// Load a YAML file with full tag processing
pub fn load_yaml(config_dir: impl Into<PathBuf>, file: impl AsRef<Path>) -> ConfigResult<Value> {
    let mut loader = YamlLoader::new(config_dir)?;
    loader.load_file(file)
}

/// Load a YAML string with tag processing
pub fn load_yaml_string(
    config_dir: impl Into<PathBuf>,
    content: &str,
    source_name: &str,
) -> ConfigResult<Value> {
    let mut loader = YamlLoader::new(config_dir)?;
    loader.load_string(content, Path::new(source_name))
}

/// Convert a processed YAML document to JSON
///
/// Mapping keys must be scalars. Tags left over from unknown tag handling are
/// rejected.
pub fn to_json(value: &Value) -> ConfigResult<serde_json::Value> {
    Ok(match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => serde_json::to_value(n).map_err(|e| ConfigError::InvalidValue {
            key: n.to_string(),
            reason: e.to_string(),
        })?,
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Sequence(seq) => {
            serde_json::Value::Array(seq.iter().map(to_json).collect::<ConfigResult<_>>()?)
        }
        Value::Mapping(map) => {
            let mut object = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                let key = match k {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => {
                        return Err(ConfigError::InvalidValue {
                            key: format!("{:?}", other),
                            reason: "mapping keys must be scalars".to_string(),
                        })
                    }
                };
                object.insert(key, to_json(v)?);
            }
            serde_json::Value::Object(object)
        }
        Value::Tagged(tagged) => {
            return Err(ConfigError::InvalidValue {
                key: tagged.tag.to_string(),
                reason: "unsupported tag".to_string(),
            })
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_include_relative_to_source() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "packages/almond.yaml", "type: local\n");
        write_file(
            dir.path(),
            "configuration.yaml",
            "almond: !include packages/almond.yaml\n",
        );

        let value = load_yaml(dir.path(), "configuration.yaml").unwrap();
        assert_eq!(to_json(&value).unwrap(), json!({"almond": {"type": "local"}}));
    }

    #[test]
    fn test_circular_include() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "a.yaml", "b: !include b.yaml\n");
        write_file(dir.path(), "b.yaml", "a: !include a.yaml\n");

        let result = load_yaml(dir.path(), "a.yaml");
        assert!(matches!(result, Err(ConfigError::CircularInclude { .. })));
    }

    #[test]
    fn test_secret_substitution() {
        let dir = TempDir::new().unwrap();
        write_file(dir.path(), "secrets.yaml", "almond_secret: '5678'\n");

        let value = load_yaml_string(
            dir.path(),
            "almond:\n  type: oauth2\n  client_id: '1234'\n  client_secret: !secret almond_secret\n",
            "configuration.yaml",
        )
        .unwrap();

        let value = to_json(&value).unwrap();
        assert_eq!(value["almond"]["client_secret"], "5678");
    }

    #[test]
    fn test_missing_secret() {
        let dir = TempDir::new().unwrap();
        let result = load_yaml_string(dir.path(), "key: !secret nope\n", "configuration.yaml");
        assert!(matches!(result, Err(ConfigError::SecretNotFound { .. })));
    }

    #[test]
    fn test_env_var() {
        let dir = TempDir::new().unwrap();
        std::env::set_var("HA_CONFIG_TEST_ALMOND_HOST", "http://localhost:3000");
        let value = load_yaml_string(
            dir.path(),
            "host: !env_var HA_CONFIG_TEST_ALMOND_HOST\n",
            "configuration.yaml",
        )
        .unwrap();
        assert_eq!(to_json(&value).unwrap()["host"], "http://localhost:3000");
    }

    #[test]
    fn test_to_json_numeric_keys() {
        let value: Value = serde_yaml::from_str("1: one\nlist: [1, 2.5, true]\n").unwrap();
        assert_eq!(
            to_json(&value).unwrap(),
            json!({"1": "one", "list": [1, 2.5, true]})
        );
    }
}
