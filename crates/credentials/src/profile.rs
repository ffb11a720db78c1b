use std::collections::HashMap;
use std::path::Path;

use crate::CredentialError;

/// Settings of one `[profile]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
}

/// Parsed shared credentials file (`~/.aws/credentials` format).
#[derive(Debug, Clone, Default)]
pub struct ProfileFile {
    profiles: HashMap<String, Profile>,
}

impl ProfileFile {
    pub fn load(path: &Path) -> Result<Self, CredentialError> {
        let content = std::fs::read_to_string(path).map_err(|source| CredentialError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::parse(&content))
    }

    /// Parses INI-style content. Unknown keys and malformed lines are skipped.
    pub fn parse(content: &str) -> Self {
        let mut profiles: HashMap<String, Profile> = HashMap::new();
        let mut current: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let name = name.trim();
                // `[profile foo]` is the config-file spelling of `[foo]`.
                let name = name.strip_prefix("profile ").unwrap_or(name).trim();
                profiles.entry(name.to_string()).or_default();
                current = Some(name.to_string());
                continue;
            }

            let Some(section) = current.as_ref() else {
                continue;
            };
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim().to_string();
            let Some(profile) = profiles.get_mut(section) else {
                continue;
            };

            match key.trim() {
                "aws_access_key_id" => profile.access_key = Some(value),
                "aws_secret_access_key" => profile.secret_key = Some(value),
                "region" => profile.region = Some(value),
                "endpoint_url" => profile.endpoint_url = Some(value),
                _ => {}
            }
        }

        Self { profiles }
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}
