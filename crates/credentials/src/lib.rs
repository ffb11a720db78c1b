//! Credential and endpoint resolution.
//!
//! Resolves the access key, secret key, region and endpoint URL used to talk
//! to the object store. Precedence, highest first:
//!
//! 1. Environment overrides (`AWS_ENDPOINT_URL`, `AWS_REGION`)
//! 2. Values from the named profile in the shared credentials file
//! 3. Values supplied by the caller
//! 4. Defaults (`us-east-1`, no endpoint override)

mod profile;
mod resolver;

pub use profile::{Profile, ProfileFile};
pub use resolver::{
    CredentialResolver, DEFAULT_REGION, ENV_CREDENTIALS_FILE, ENV_ENDPOINT_URL, ENV_REGION,
    ResolveRequest, ResolvedTarget, StaticCredentials,
};

/// Errors produced while resolving credentials.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("I/O error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to determine home directory")]
    NoHomeDirectory,

    #[error("profile '{0}' not found in credentials file")]
    ProfileNotFound(String),

    #[error("access key or secret key not found in profile '{0}'")]
    MissingKeys(String),
}
