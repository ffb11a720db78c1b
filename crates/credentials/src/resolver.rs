use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use crate::{CredentialError, ProfileFile};

/// Region used when nothing else supplies one.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Overrides any other endpoint URL source.
pub const ENV_ENDPOINT_URL: &str = "AWS_ENDPOINT_URL";

/// Overrides any other region source.
pub const ENV_REGION: &str = "AWS_REGION";

/// Alternate location of the shared credentials file.
pub const ENV_CREDENTIALS_FILE: &str = "AWS_SHARED_CREDENTIALS_FILE";

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Static access/secret key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct StaticCredentials {
    pub access_key: String,
    pub secret_key: String,
}

impl fmt::Debug for StaticCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticCredentials")
            .field("access_key", &self.access_key)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

/// What the caller asked for.
#[derive(Debug, Clone, Default)]
pub struct ResolveRequest {
    pub profile: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// Fully resolved connection target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// `None` means the SDK default provider chain supplies credentials.
    pub credentials: Option<StaticCredentials>,
    pub region: String,
    pub endpoint_url: Option<String>,
}

/// Resolves [`ResolvedTarget`]s from profiles, the environment and caller input.
pub struct CredentialResolver {
    credentials_path: Option<PathBuf>,
    env: EnvLookup,
}

impl CredentialResolver {
    /// Resolver backed by the process environment.
    pub fn from_env() -> Self {
        Self {
            credentials_path: None,
            env: Box::new(|name| std::env::var(name).ok()),
        }
    }

    /// Resolver with an explicit credentials file and an isolated environment.
    pub fn new(credentials_path: impl Into<PathBuf>) -> Self {
        Self {
            credentials_path: Some(credentials_path.into()),
            env: Box::new(|_| None),
        }
    }

    /// Replaces the environment with a fixed set of variables.
    pub fn with_env(mut self, vars: HashMap<String, String>) -> Self {
        self.env = Box::new(move |name| vars.get(name).cloned());
        self
    }

    pub fn resolve(&self, req: &ResolveRequest) -> Result<ResolvedTarget, CredentialError> {
        let mut region = non_empty(req.region.clone());
        let mut endpoint_url = non_empty(req.endpoint_url.clone());
        let access_key = non_empty(req.access_key.clone());
        let secret_key = non_empty(req.secret_key.clone());
        let mut credentials = match (access_key, secret_key) {
            (Some(access_key), Some(secret_key)) => Some(StaticCredentials {
                access_key,
                secret_key,
            }),
            _ => None,
        };

        if let Some(name) = non_empty(req.profile.clone()) {
            let path = self.credentials_path()?;
            let file = ProfileFile::load(&path)?;
            let profile = file
                .get(&name)
                .ok_or_else(|| CredentialError::ProfileNotFound(name.clone()))?;

            let (Some(access_key), Some(secret_key)) = (
                non_empty(profile.access_key.clone()),
                non_empty(profile.secret_key.clone()),
            ) else {
                return Err(CredentialError::MissingKeys(name));
            };

            if credentials.is_none() {
                credentials = Some(StaticCredentials {
                    access_key,
                    secret_key,
                });
            }
            if let Some(r) = non_empty(profile.region.clone()) {
                region = Some(r);
            }
            if let Some(e) = non_empty(profile.endpoint_url.clone()) {
                endpoint_url = Some(e);
            }
            debug!(profile = %name, path = %path.display(), "profile loaded");
        }

        if let Some(e) = non_empty((self.env)(ENV_ENDPOINT_URL)) {
            debug!(endpoint = %e, "endpoint overridden from environment");
            endpoint_url = Some(e);
        }
        if let Some(r) = non_empty((self.env)(ENV_REGION)) {
            region = Some(r);
        }

        Ok(ResolvedTarget {
            credentials,
            region: region.unwrap_or_else(|| DEFAULT_REGION.to_string()),
            endpoint_url,
        })
    }

    fn credentials_path(&self) -> Result<PathBuf, CredentialError> {
        if let Some(path) = &self.credentials_path {
            return Ok(path.clone());
        }
        if let Some(path) = non_empty((self.env)(ENV_CREDENTIALS_FILE)) {
            return Ok(PathBuf::from(path));
        }
        let home = (self.env)("HOME")
            .or_else(|| (self.env)("USERPROFILE"))
            .ok_or(CredentialError::NoHomeDirectory)?;
        Ok(PathBuf::from(home).join(".aws").join("credentials"))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
