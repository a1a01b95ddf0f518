// III-IV
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Configuration loading from TOML files.
//!
//! A configuration file can name one or more parent files via a top-level `extends` key, whose
//! value is a string or an array of strings with paths relative to the file that names them.
//! Parents are loaded recursively and in order, and the contents of the child are merged on top
//! of them.  Additional TOML snippets can be merged last via "overrides", which is handy to tweak
//! a deployed configuration from the command line or the environment.
//!
//! Merging is strict by default: a scalar key can only be defined once across the whole tree of
//! files.  Loading with key overrides enabled lifts this restriction and makes later definitions
//! win.
//!
//! Files are rendered as templates before being parsed.  `{{ .EnvVars.NAME }}` expands to the
//! value of the environment variable `NAME` and `{{ .ProjectDir }}` expands to the absolute path
//! of the project directory.

use regex::{Captures, Regex};
use serde::de::DeserializeOwned;
use std::env;
use std::fs;
use std::path::{self, Path, PathBuf};
use std::str::FromStr;
use toml::{Table, Value};

/// Name of the key that links a configuration file to its parents.
const EXTENDS_KEY: &str = "extends";

/// Name of the file that holds the settings shared by all environments.
const BASE_FILE: &str = "base.toml";

/// Name of the optional file that holds secrets and that is loaded last.
const SECRETS_FILE: &str = "secrets.toml";

/// Configuration errors.
#[derive(Debug, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct ConfigError(pub String);

/// Result type for this module.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Expands the template actions in `content`, using `origin` to annotate errors.
fn render_template(content: &str, origin: &str, project_dir: &Path) -> ConfigResult<String> {
    let action = Regex::new(r"\{\{\s*([^}]*?)\s*\}\}")
        .map_err(|e| ConfigError(format!("Invalid template pattern: {}", e)))?;

    let mut error = None;
    let rendered = action.replace_all(content, |captures: &Captures| {
        let name = &captures[1];
        let value = if name == ".ProjectDir" {
            Ok(project_dir.display().to_string())
        } else if let Some(var) = name.strip_prefix(".EnvVars.") {
            env::var(var).map_err(|e| {
                ConfigError(format!("Cannot expand {} in {}: {}: {}", name, origin, var, e))
            })
        } else {
            Err(ConfigError(format!("Unknown template action '{}' in {}", name, origin)))
        };
        match value {
            Ok(value) => value,
            Err(e) => {
                error.get_or_insert(e);
                String::new()
            }
        }
    });

    match error {
        Some(e) => Err(e),
        None => Ok(rendered.into_owned()),
    }
}

/// Computes the absolute form of `dir` to expand `{{ .ProjectDir }}`.
fn absolute_dir(dir: &Path) -> ConfigResult<PathBuf> {
    path::absolute(dir).map_err(|e| {
        ConfigError(format!("Failed to get absolute project dir {}: {}", dir.display(), e))
    })
}

/// Parses `content` as a TOML table, using `origin` to annotate errors.
fn parse_table(content: &str, origin: &str) -> ConfigResult<Table> {
    toml::from_str::<Table>(content)
        .map_err(|e| ConfigError(format!("Failed to parse {} as TOML: {}", origin, e)))
}

/// Merges the `over` table into `base`.
///
/// `prefix` is the dotted path to the tables being merged and is only used for error reporting.
fn merge(
    base: &mut Table,
    over: Table,
    allow_key_overrides: bool,
    prefix: &str,
) -> ConfigResult<()> {
    for (key, value) in over {
        let path = if prefix.is_empty() { key.clone() } else { format!("{}.{}", prefix, key) };

        let Some(slot) = base.get_mut(&key) else {
            base.insert(key, value);
            continue;
        };

        match (slot, value) {
            (Value::Table(base_table), Value::Table(over_table)) => {
                merge(base_table, over_table, allow_key_overrides, &path)?;
            }
            (Value::Table(_), _) | (_, Value::Table(_)) => {
                return Err(ConfigError(format!(
                    "base and override key types don't match for key '{}'",
                    path
                )));
            }
            (slot, value) => {
                if !allow_key_overrides {
                    return Err(ConfigError(format!(
                        "key is being overridden when key overrides are disabled for key '{}'",
                        path
                    )));
                }
                *slot = value;
            }
        }
    }
    Ok(())
}

/// Extracts the list of parent files from the value of an `extends` key.
fn parse_extends(path: &Path, extends: Value) -> ConfigResult<Vec<String>> {
    match extends {
        Value::String(parent) => Ok(vec![parent]),
        Value::Array(parents) => parents
            .into_iter()
            .map(|parent| match parent {
                Value::String(parent) => Ok(parent),
                other => Err(ConfigError(format!(
                    "'{}' in {} can only contain strings but found {}",
                    EXTENDS_KEY,
                    path.display(),
                    other.type_str()
                ))),
            })
            .collect(),
        other => Err(ConfigError(format!(
            "'{}' in {} must be a string or an array of strings but found {}",
            EXTENDS_KEY,
            path.display(),
            other.type_str()
        ))),
    }
}

/// Loads the file at `path` and all of its parents into a single table.
fn load_tree(path: &Path, project_dir: &Path, allow_key_overrides: bool) -> ConfigResult<Table> {
    let origin = path.display().to_string();
    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("Failed to read {}: {}", origin, e)))?;
    let content = render_template(&content, &origin, project_dir)?;
    let mut tree = parse_table(&content, &origin)?;

    let Some(extends) = tree.remove(EXTENDS_KEY) else {
        return Ok(tree);
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut merged = Table::new();
    for parent in parse_extends(path, extends)? {
        let parent_path = dir.join(parent);
        let parent_tree = load_tree(&parent_path, project_dir, allow_key_overrides)?;
        merge(&mut merged, parent_tree, allow_key_overrides, "").map_err(|e| {
            ConfigError(format!("Failed to merge {}: {}", parent_path.display(), e))
        })?;
    }
    merge(&mut merged, tree, allow_key_overrides, "")
        .map_err(|e| ConfigError(format!("Failed to merge {}: {}", path.display(), e)))?;
    Ok(merged)
}

/// Loads the file at `path` like `load_tree` does, or returns `None` if it does not exist.
fn load_optional_tree(path: &Path, project_dir: &Path) -> ConfigResult<Option<Table>> {
    if !path.exists() {
        return Ok(None);
    }
    load_tree(path, project_dir, true).map(Some)
}

/// A fully-resolved configuration tree.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Config {
    /// The merged contents of all configuration sources.
    tree: Table,
}

impl Config {
    /// Loads the configuration file at `path` with key overrides disabled.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        Self::load_with_overrides(path, "", false)
    }

    /// Loads the configuration file at `path` and then merges `overrides` on top of it.
    ///
    /// `overrides` is a `;`-separated list of TOML snippets that are merged in order.
    ///
    /// `{{ .ProjectDir }}` expands to the directory that holds the file at `path`.
    pub fn load_with_overrides<P: AsRef<Path>>(
        path: P,
        overrides: &str,
        allow_key_overrides: bool,
    ) -> ConfigResult<Self> {
        let path = path.as_ref();
        let project_dir = absolute_dir(path.parent().unwrap_or_else(|| Path::new(".")))?;
        let mut tree = load_tree(path, &project_dir, allow_key_overrides)?;
        for snippet in overrides.split(';').filter(|s| !s.trim().is_empty()) {
            let over = parse_table(snippet, &format!("override '{}'", snippet))?;
            merge(&mut tree, over, allow_key_overrides, "")
                .map_err(|e| {
                    ConfigError(format!("Failed to apply override '{}': {}", snippet, e))
                })?;
        }
        Ok(Self { tree })
    }

    /// Loads the configuration at `path` plus `overrides` with key overrides disabled.
    pub fn new<P: AsRef<Path>>(path: P, overrides: &str) -> ConfigResult<Self> {
        Self::load_with_overrides(path, overrides, false)
    }

    /// Loads the configuration at `path` plus `overrides` with key overrides enabled.
    pub fn new_with_key_overrides<P: AsRef<Path>>(path: P, overrides: &str) -> ConfigResult<Self> {
        Self::load_with_overrides(path, overrides, true)
    }

    /// Loads the configuration for environment `env` from the files in `dir`.
    ///
    /// This reads `base.toml`, overlays `<env>.toml` and then `secrets.toml`.  Any of these files
    /// can be missing.  `env` is lowercased to compute the name of its file.  Key overrides are
    /// enabled so that each layer can refine the values of the previous one.
    ///
    /// `{{ .ProjectDir }}` expands to the absolute form of `project_dir`.
    pub fn load_env<P: AsRef<Path>, Q: AsRef<Path>>(
        dir: P,
        project_dir: Q,
        env: &str,
    ) -> ConfigResult<Self> {
        let dir = dir.as_ref();
        let project_dir = absolute_dir(project_dir.as_ref())?;

        let env_file = format!("{}.toml", env.to_lowercase());
        let mut tree = Table::new();
        for name in [BASE_FILE, env_file.as_str(), SECRETS_FILE] {
            let path = dir.join(name);
            if let Some(layer) = load_optional_tree(&path, &project_dir)? {
                merge(&mut tree, layer, true, "").map_err(|e| {
                    ConfigError(format!("Failed to merge {}: {}", path.display(), e))
                })?;
            }
        }

        Ok(Self { tree })
    }

    /// Creates a configuration from an already-parsed TOML table.
    pub fn from_table(tree: Table) -> Self {
        Self { tree }
    }

    /// Deserializes the table at the top-level `key` into a `T`.
    ///
    /// A missing key yields `T::default()` so that sections can be omitted from the files when
    /// their defaults are good enough.
    pub fn load_section<T: DeserializeOwned + Default>(&self, key: &str) -> ConfigResult<T> {
        match self.tree.get(key) {
            None => Ok(T::default()),
            Some(Value::Table(table)) => Value::Table(table.clone())
                .try_into::<T>()
                .map_err(|e| ConfigError(format!("Invalid section '{}': {}", key, e))),
            Some(other) => Err(ConfigError(format!(
                "invalid key type for section '{}': expected a table but found {}",
                key,
                other.type_str()
            ))),
        }
    }

    /// Looks up the value at the dotted `path`, such as `server.port`.
    pub fn value(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.tree.get(parts.next()?)?;
        for part in parts {
            current = current.as_table()?.get(part)?;
        }
        Some(current)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> ConfigResult<Self> {
        Ok(Self { tree: parse_table(s, "string")? })
    }
}
