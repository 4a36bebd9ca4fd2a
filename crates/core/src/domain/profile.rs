// Analysis profiles: named, ordered analyzer plugin chains

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::probe::OutputFormat;

/// One analyzer plugin with its option tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginSpec {
    pub name: String,
    pub options: Vec<String>,
}

impl PluginSpec {
    pub fn new(name: impl Into<String>, options: &[&str]) -> Self {
        Self {
            name: name.into(),
            options: options.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub description: String,
    pub plugins: Vec<PluginSpec>,
    pub output_format: Option<OutputFormat>,
}

/// Registry of profiles addressable by name
#[derive(Debug, Clone, Default)]
pub struct ProfileCatalog {
    profiles: HashMap<String, Profile>,
}

impl ProfileCatalog {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `basic`, `detailed` and `monitoring`
    pub fn builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.insert(
            "basic",
            Profile {
                name: "Basic analysis".to_string(),
                description: "Analyze for 2 seconds then stop".to_string(),
                plugins: vec![
                    PluginSpec::new("until", &["-s", "2"]),
                    PluginSpec::new("analyze", &[]),
                ],
                output_format: None,
            },
        );
        catalog.insert(
            "detailed",
            Profile {
                name: "Detailed analysis".to_string(),
                description: "Analyze for 2 seconds with JSON output".to_string(),
                plugins: vec![
                    PluginSpec::new("until", &["-s", "2"]),
                    PluginSpec::new("analyze", &[]),
                ],
                output_format: Some(OutputFormat::Json),
            },
        );
        catalog.insert(
            "monitoring",
            Profile {
                name: "Continuous monitoring".to_string(),
                description: "Analyze indefinitely".to_string(),
                plugins: vec![PluginSpec::new("analyze", &[])],
                output_format: Some(OutputFormat::Json),
            },
        );
        catalog
    }

    pub fn insert(&mut self, key: impl Into<String>, profile: Profile) {
        self.profiles.insert(key.into(), profile);
    }

    pub fn resolve(&self, key: &str) -> Option<&Profile> {
        self.profiles.get(key)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
