// Copyright (c) Walrus Foundation
// SPDX-License-Identifier: Apache-2.0

//! Helpers for loading YAML configuration files.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::de::DeserializeOwned;

/// Load the config from a YAML file located at the provided path.
pub fn load_from_yaml<P: AsRef<Path>, T: DeserializeOwned>(path: P) -> anyhow::Result<T> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "reading configuration from file");

    let reader = std::fs::File::open(path)
        .with_context(|| format!("unable to load config from {}", path.display()))?;

    Ok(serde_yaml::from_reader(reader)?)
}

/// Returns the provided path if given, otherwise the first of the default paths that exists.
pub fn path_or_defaults_if_exist(
    path: Option<impl AsRef<Path>>,
    defaults: &[PathBuf],
) -> Option<PathBuf> {
    if let Some(path) = path {
        return Some(path.as_ref().to_path_buf());
    }
    defaults.iter().find(|path| path.exists()).cloned()
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize, PartialEq)]
    struct TestConfig {
        name: String,
        count: u32,
    }

    #[test]
    fn loads_yaml_from_file() {
        let dir = std::env::temp_dir().join("walrus-utils-config-test");
        std::fs::create_dir_all(&dir).expect("can create temp dir");
        let path = dir.join("config.yaml");
        std::fs::write(&path, "name: walrus\ncount: 7\n").expect("can write config");

        let config: TestConfig = load_from_yaml(&path).expect("valid config");
        assert_eq!(
            config,
            TestConfig {
                name: "walrus".to_owned(),
                count: 7
            }
        );
    }

    #[test]
    fn missing_file_is_an_error() {
        let result: anyhow::Result<TestConfig> = load_from_yaml("/nonexistent/config.yaml");
        assert!(result.is_err());
    }
}
