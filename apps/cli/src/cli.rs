//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgGroup, Parser};
use s3check_credentials::ResolveRequest;
use s3check_transfer::{DEFAULT_PART_SIZE, MIN_PART_SIZE, Payload};
use s3check_upload::{DEFAULT_CONCURRENCY, UploadJobConfig};

use crate::settings::Settings;

#[derive(Parser, Debug)]
#[command(name = "s3check", version)]
#[command(about = "Upload data to S3 in parts with per-part CRC32 checksums and verify every part")]
#[command(group(ArgGroup::new("source").required(true).args(["file", "text"])))]
pub struct Args {
    /// File to upload
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Text to upload
    #[arg(long)]
    pub text: Option<String>,

    /// Destination bucket
    #[arg(long)]
    pub bucket: String,

    /// Destination object key
    #[arg(long)]
    pub key: String,

    /// Custom endpoint URL for S3-compatible services
    #[arg(long)]
    pub endpoint_url: Option<String>,

    /// AWS region [default: us-east-1]
    #[arg(long)]
    pub region: Option<String>,

    /// Profile name in the shared credentials file
    #[arg(long)]
    pub profile: Option<String>,

    /// Access key ID (overrides the profile)
    #[arg(long, requires = "secret_key")]
    pub access_key: Option<String>,

    /// Secret access key (overrides the profile)
    #[arg(long, requires = "access_key")]
    pub secret_key: Option<String>,

    /// Print raw remote responses
    #[arg(short, long)]
    pub verbose: bool,

    /// Upload an extra empty part after the data parts
    #[arg(long)]
    pub upload_empty_part: bool,

    /// Comma-separated part numbers to include in the final object, e.g. 1,2,4
    #[arg(long, value_delimiter = ',', value_parser = clap::value_parser!(u32).range(1..))]
    pub parts: Vec<u32>,

    /// Part size in bytes [default: 5 MiB]
    #[arg(long)]
    pub part_size: Option<usize>,

    /// Smallest accepted part size, for stores that accept tiny parts
    #[arg(long, hide = true)]
    pub min_part_size: Option<usize>,

    /// Number of concurrent part uploads [default: 10]
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Settings file [default: ~/.config/s3check/config.toml]
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Args {
    /// Credential lookup input; flags win over settings.
    pub fn resolve_request(&self, settings: &Settings) -> ResolveRequest {
        ResolveRequest {
            profile: self.profile.clone().or_else(|| settings.profile.clone()),
            region: self.region.clone().or_else(|| settings.region.clone()),
            endpoint_url: self
                .endpoint_url
                .clone()
                .or_else(|| settings.endpoint_url.clone()),
            access_key: self.access_key.clone(),
            secret_key: self.secret_key.clone(),
        }
    }

    /// Upload job settings; flags win over settings.
    pub fn job_config(&self, settings: &Settings) -> UploadJobConfig {
        UploadJobConfig {
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            part_size: self
                .part_size
                .or(settings.part_size)
                .unwrap_or(DEFAULT_PART_SIZE),
            min_part_size: self.min_part_size.unwrap_or(MIN_PART_SIZE),
            part_indices: self.parts.clone(),
            upload_empty_part: self.upload_empty_part,
            concurrency: self
                .concurrency
                .or(settings.concurrency)
                .unwrap_or(DEFAULT_CONCURRENCY),
            verbose: self.verbose,
        }
    }

    /// Reads the payload named by `--file` or `--text`.
    pub fn payload(&self) -> anyhow::Result<Payload> {
        match (&self.file, &self.text) {
            (Some(path), _) => Payload::from_file(path)
                .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display())),
            (None, Some(text)) => Ok(Payload::from_text(text)),
            (None, None) => anyhow::bail!("either --file or --text must be provided"),
        }
    }

    /// Human name of the payload source.
    pub fn source_name(&self) -> String {
        match &self.file {
            Some(path) => path.display().to_string(),
            None => "text input".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let mut argv = vec!["s3check", "--bucket", "b", "--key", "k"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    #[test]
    fn text_source() {
        let args = parse(&["--text", "Hello, World"]).unwrap();
        assert_eq!(args.text.as_deref(), Some("Hello, World"));
        assert_eq!(args.payload().unwrap().len(), 12);
        assert_eq!(args.source_name(), "text input");
    }

    #[test]
    fn source_is_required() {
        assert!(parse(&[]).is_err());
    }

    #[test]
    fn file_and_text_conflict() {
        assert!(parse(&["--text", "x", "--file", "/tmp/x"]).is_err());
    }

    #[test]
    fn parts_list() {
        let args = parse(&["--text", "x", "--parts", "1,2,4"]).unwrap();
        assert_eq!(args.parts, vec![1, 2, 4]);
    }

    #[test]
    fn zero_part_index_rejected() {
        assert!(parse(&["--text", "x", "--parts", "1,0"]).is_err());
        assert!(parse(&["--text", "x", "--parts", "a"]).is_err());
    }

    #[test]
    fn access_key_requires_secret() {
        assert!(parse(&["--text", "x", "--access-key", "AK"]).is_err());
        let args = parse(&["--text", "x", "--access-key", "AK", "--secret-key", "SK"]).unwrap();
        let req = args.resolve_request(&Settings::default());
        assert_eq!(req.access_key.as_deref(), Some("AK"));
        assert_eq!(req.secret_key.as_deref(), Some("SK"));
    }

    #[test]
    fn flags_override_settings() {
        let settings = Settings {
            region: Some("eu-west-1".into()),
            endpoint_url: Some("http://settings:9000".into()),
            profile: Some("from-file".into()),
            part_size: Some(8 * 1024 * 1024),
            concurrency: Some(3),
        };
        let args = parse(&["--text", "x", "--region", "us-west-2", "--concurrency", "7"]).unwrap();

        let req = args.resolve_request(&settings);
        assert_eq!(req.region.as_deref(), Some("us-west-2"));
        assert_eq!(req.endpoint_url.as_deref(), Some("http://settings:9000"));
        assert_eq!(req.profile.as_deref(), Some("from-file"));

        let job = args.job_config(&settings);
        assert_eq!(job.concurrency, 7);
        assert_eq!(job.part_size, 8 * 1024 * 1024);
    }

    #[test]
    fn defaults_without_settings() {
        let args = parse(&["--text", "x", "-v", "--upload-empty-part"]).unwrap();
        let job = args.job_config(&Settings::default());
        assert_eq!(job.part_size, DEFAULT_PART_SIZE);
        assert_eq!(job.min_part_size, MIN_PART_SIZE);
        assert_eq!(job.concurrency, DEFAULT_CONCURRENCY);
        assert!(job.verbose);
        assert!(job.upload_empty_part);
        assert!(job.part_indices.is_empty());
    }

    #[test]
    fn file_source_reads_bytes() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"0123456789").unwrap();

        let args = parse(&["--file", path.to_str().unwrap()]).unwrap();
        assert_eq!(args.payload().unwrap().as_bytes(), b"0123456789");
        assert!(args.source_name().ends_with("data.bin"));
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
