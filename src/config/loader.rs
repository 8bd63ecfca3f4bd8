// file: src/config/loader.rs
// version: 1.0.0
// guid: 21f6c3a9-5b0e-4d8a-9c47-0e3d5f6a8b12

//! Configuration file loading and environment variable substitution

use super::ProvisionConfig;
use crate::error::ProvisionError;
use crate::Result;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Configuration loader with environment variable substitution
pub struct ConfigLoader {
    env_vars: HashMap<String, String>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self {
            env_vars: std::env::vars().collect(),
        }
    }

    /// Load the provisioning configuration, or the built-in defaults when no path is given
    pub fn load_or_default<P: AsRef<Path>>(&self, path: Option<P>) -> Result<ProvisionConfig> {
        let config = match path {
            Some(path) => self.load_provision_config(path)?,
            None => ProvisionConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Load provisioning overrides from a YAML file
    pub fn load_provision_config<P: AsRef<Path>>(&self, path: P) -> Result<ProvisionConfig> {
        let content = fs::read_to_string(&path).map_err(|e| {
            ProvisionError::config(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;

        let expanded = self.expand_env_vars(&content)?;
        let config: ProvisionConfig = serde_yaml::from_str(&expanded)?;

        config.validate()?;

        Ok(config)
    }

    /// Expand `${VAR}` references in configuration content
    fn expand_env_vars(&self, content: &str) -> Result<String> {
        let re = Regex::new(r"\$\{([^}]+)\}")
            .map_err(|e| ProvisionError::config(format!("Invalid regex pattern: {}", e)))?;

        let mut missing_vars = Vec::new();
        let result = re.replace_all(content, |cap: &regex::Captures<'_>| {
            match self.env_vars.get(&cap[1]) {
                Some(value) => value.clone(),
                None => {
                    if !missing_vars.contains(&cap[1].to_string()) {
                        missing_vars.push(cap[1].to_string());
                    }
                    String::new()
                }
            }
        });

        if !missing_vars.is_empty() {
            return Err(ProvisionError::config(format!(
                "Missing environment variables: {}",
                missing_vars.join(", ")
            )));
        }

        Ok(result.into_owned())
    }

    /// Set environment variable for substitution
    pub fn set_env_var(&mut self, key: String, value: String) {
        self.env_vars.insert(key, value);
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
