//! Provider settings resolved from CLI flags and environment variables.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;

use crate::workspace::{ClientOptions, AZURE_PROVIDER, DIRECTORY_PROVIDER, S3_PROVIDER};

/// Backend selection and credentials, shared by every sub-command.
#[derive(Debug, Clone, Args)]
pub struct ProviderSettings {
    /// The workspace provider to use: directory, s3, or azure.
    #[arg(
        long,
        global = true,
        env = "WORKSPACE_PROVIDER_PROVIDER",
        default_value = DIRECTORY_PROVIDER
    )]
    pub provider: String,

    /// Data home directory for the directory provider.
    #[arg(long, global = true, env = "WORKSPACE_PROVIDER_DATA_HOME")]
    pub data_home: Option<PathBuf>,

    /// The S3 bucket name.
    #[arg(long, global = true, env = "WORKSPACE_PROVIDER_S3_BUCKET")]
    pub s3_bucket: Option<String>,

    /// Base endpoint for S3-compatible providers.
    #[arg(long, global = true, env = "WORKSPACE_PROVIDER_S3_BASE_ENDPOINT")]
    pub s3_base_endpoint: Option<String>,

    /// Use path-style addressing for S3-compatible providers.
    #[arg(long, global = true, env = "WORKSPACE_PROVIDER_S3_USE_PATH_STYLE")]
    pub s3_use_path_style: bool,

    /// The Azure container name.
    #[arg(long, global = true, env = "WORKSPACE_PROVIDER_AZURE_CONTAINER")]
    pub azure_container: Option<String>,

    /// The Azure storage connection string.
    #[arg(long, global = true, env = "WORKSPACE_PROVIDER_AZURE_CONNECTION_STRING")]
    pub azure_connection_string: Option<String>,
}

impl ProviderSettings {
    /// Check that the selected provider has what it needs before any
    /// command runs.
    pub fn validate(&self) -> Result<()> {
        match self.provider.as_str() {
            DIRECTORY_PROVIDER => {}
            S3_PROVIDER => {
                if self.s3_bucket.as_deref().unwrap_or_default().is_empty() {
                    bail!("s3 provider requires a bucket name");
                }
            }
            AZURE_PROVIDER => {
                if self.azure_container.as_deref().unwrap_or_default().is_empty() {
                    bail!("azure provider requires a container name");
                }
                if self
                    .azure_connection_string
                    .as_deref()
                    .unwrap_or_default()
                    .is_empty()
                {
                    bail!("azure provider requires a connection string");
                }
            }
            other => bail!("invalid workspace provider: {other}"),
        }
        Ok(())
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            directory_data_home: self.data_home.clone(),
            s3_bucket_name: self.s3_bucket.clone(),
            s3_base_endpoint: self.s3_base_endpoint.clone(),
            s3_use_path_style: self.s3_use_path_style,
            azure_container_name: self.azure_container.clone(),
            azure_connection_string: self.azure_connection_string.clone(),
        }
    }
}
