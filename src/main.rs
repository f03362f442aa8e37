//! workspace-provider - CLI for managing workspaces across storage backends.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use tokio::io::AsyncReadExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use workspace_provider::config::ProviderSettings;
use workspace_provider::workspace::{Client, OpenOptions, StatOptions, WriteOptions};
use workspace_provider::{server, WorkspaceError};

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        let _ = writeln!(io::stderr(), "Error: {err:?}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn try_main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "workspace_provider=debug,tower_http=debug"
    } else {
        "workspace_provider=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    cli.settings.validate()?;
    let client = Arc::new(Client::new(&[cli.settings.client_options()]).await?);

    match cli.command {
        Command::Create { ids } => handle_create(&client, &cli.settings.provider, ids).await,
        Command::Rm {
            ids,
            ignore_not_found,
        } => handle_rm(&client, ids, ignore_not_found).await,
        Command::Ls { ids, json } => handle_ls(&client, ids, json).await,
        Command::RmWithPrefix { id, prefixes } => handle_rm_with_prefix(&client, id, prefixes).await,
        Command::CpFile { id, files } => handle_cp_file(&client, id, files).await,
        Command::WriteFile {
            id,
            file,
            contents,
            base64_encoded_input,
            without_create_revision,
            latest_revision_id,
            if_not_exists,
        } => {
            handle_write_file(
                &client,
                id,
                file,
                contents,
                base64_encoded_input,
                without_create_revision,
                latest_revision_id,
                if_not_exists,
            )
            .await
        }
        Command::RmFile {
            id,
            files,
            ignore_not_found,
        } => handle_rm_file(&client, id, files, ignore_not_found).await,
        Command::ReadFile {
            id,
            file,
            base64_encode_output,
            with_latest_revision_id,
        } => {
            handle_read_file(&client, id, file, base64_encode_output, with_latest_revision_id).await
        }
        Command::StatFile {
            id,
            file,
            with_latest_revision_id,
            json,
        } => handle_stat_file(&client, id, file, with_latest_revision_id, json).await,
        Command::ValidateEnv => handle_validate_env(&client, &cli.settings.provider).await,
        Command::Server { port } => {
            server::run(client, port).await?;
            Ok(())
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "workspace-provider",
    version,
    about = "Manage workspaces across directory, S3, and Azure Blob storage backends."
)]
struct Cli {
    #[command(flatten)]
    settings: ProviderSettings,

    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create a new workspace, optionally copying from one or more IDs.
    Create {
        /// Source workspace IDs, as separate arguments or comma-delimited.
        ids: Vec<String>,
    },

    /// Remove one or more workspaces.
    Rm {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Ignore not found errors.
        #[arg(long)]
        ignore_not_found: bool,
    },

    /// List files in one or more workspaces.
    Ls {
        #[arg(required = true)]
        ids: Vec<String>,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Remove all files with the given prefixes.
    #[command(name = "rm-with-prefix")]
    RmWithPrefix {
        id: String,
        #[arg(required = true)]
        prefixes: Vec<String>,
    },

    /// Copy local files into a workspace.
    #[command(name = "cp-file")]
    CpFile {
        id: String,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Write a file into a workspace; use '-' to read from stdin.
    #[command(name = "write-file")]
    WriteFile {
        id: String,
        file: String,
        contents: String,
        /// Treat input as base64-encoded.
        #[arg(long, env = "WRITE_FILE_BASE64_ENCODED_INPUT")]
        base64_encoded_input: bool,
        /// Do not record a revision for this write.
        #[arg(long, env = "WRITE_FILE_WITHOUT_CREATE_REVISION")]
        without_create_revision: bool,
        /// Only write if this is the latest revision.
        #[arg(long, env = "WRITE_FILE_LATEST_REVISION_ID")]
        latest_revision_id: Option<String>,
        /// Only write if the file does not exist.
        #[arg(long)]
        if_not_exists: bool,
    },

    /// Remove files from a workspace.
    #[command(name = "rm-file")]
    RmFile {
        id: String,
        #[arg(required = true)]
        files: Vec<String>,
        /// Ignore not found errors.
        #[arg(long)]
        ignore_not_found: bool,
    },

    /// Read a file from a workspace.
    #[command(name = "read-file")]
    ReadFile {
        id: String,
        file: String,
        /// Encode output as base64.
        #[arg(long, env = "READ_FILE_BASE64_ENCODE_OUTPUT")]
        base64_encode_output: bool,
        /// Include the latest revision ID.
        #[arg(long, env = "READ_FILE_WITH_LATEST_REVISION_ID")]
        with_latest_revision_id: bool,
    },

    /// Get file stats from a workspace.
    #[command(name = "stat-file")]
    StatFile {
        id: String,
        file: String,
        /// Include the latest revision ID.
        #[arg(long, env = "STAT_FILE_WITH_LATEST_REVISION_ID")]
        with_latest_revision_id: bool,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Validate environment variables by creating and removing a workspace.
    #[command(name = "validate-env")]
    ValidateEnv,

    /// Run the HTTP façade.
    Server {
        /// Port to run the server on.
        #[arg(long, env = "PORT", default_value = "8888")]
        port: u16,
    },
}

/// A single argument may carry several comma-delimited IDs.
fn split_comma_ids(ids: Vec<String>) -> Vec<String> {
    if ids.len() == 1 {
        ids[0]
            .split(',')
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        ids
    }
}

async fn handle_create(client: &Client, provider: &str, ids: Vec<String>) -> Result<()> {
    let from = split_comma_ids(ids);
    let workspace = client.create(provider, &from).await?;
    println!("{workspace}");
    Ok(())
}

async fn handle_rm(client: &Client, ids: Vec<String>, ignore_not_found: bool) -> Result<()> {
    for id in split_comma_ids(ids) {
        match client.rm(&id).await {
            Ok(()) => println!("workspace {id} deleted"),
            Err(err) if ignore_not_found && err.is_not_found() => {
                println!("workspace {id} not found");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

async fn handle_ls(client: &Client, ids: Vec<String>, json: bool) -> Result<()> {
    let mut all = Vec::new();
    for id in &ids {
        let files = client.ls(id, "").await?;
        if json {
            all.push(serde_json::json!({ "id": id, "files": files }));
        } else {
            println!("{id}:");
            for file in files {
                println!("{file}");
            }
            println!();
        }
    }

    if json {
        println!("{}", serde_json::to_string(&all)?);
    }
    Ok(())
}

async fn handle_rm_with_prefix(client: &Client, id: String, prefixes: Vec<String>) -> Result<()> {
    for prefix in prefixes {
        client.remove_all_with_prefix(&id, &prefix).await?;
        println!("files with prefix {prefix} deleted from workspace {id}");
    }
    Ok(())
}

async fn handle_cp_file(client: &Client, id: String, files: Vec<PathBuf>) -> Result<()> {
    for file in files {
        let data = tokio::fs::read(&file)
            .await
            .with_context(|| format!("reading {}", file.display()))?;
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .with_context(|| format!("{} has no file name", file.display()))?;

        client
            .write_file(&id, &name, Bytes::from(data), &[])
            .await?;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn handle_write_file(
    client: &Client,
    id: String,
    file: String,
    contents: String,
    base64_encoded_input: bool,
    without_create_revision: bool,
    latest_revision_id: Option<String>,
    if_not_exists: bool,
) -> Result<()> {
    let raw = if contents == "-" {
        let mut buf = Vec::new();
        tokio::io::stdin().read_to_end(&mut buf).await?;
        buf
    } else {
        contents.into_bytes()
    };

    let data = if base64_encoded_input {
        BASE64
            .decode(raw.trim_ascii())
            .context("decoding base64 input")?
    } else {
        raw
    };

    client
        .write_file(
            &id,
            &file,
            Bytes::from(data),
            &[WriteOptions {
                create_revision: Some(!without_create_revision),
                latest_revision_id,
                if_not_exists,
            }],
        )
        .await?;
    Ok(())
}

async fn handle_rm_file(
    client: &Client,
    id: String,
    files: Vec<String>,
    ignore_not_found: bool,
) -> Result<()> {
    for file in files {
        match client.delete_file(&id, &file).await {
            Ok(()) => println!("file {file} deleted from workspace {id}"),
            Err(err) if ignore_not_found && err.is_not_found() => {
                println!("file {file} not found in workspace {id}");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}

async fn handle_read_file(
    client: &Client,
    id: String,
    file: String,
    base64_encode_output: bool,
    with_latest_revision_id: bool,
) -> Result<()> {
    let handle = client
        .open_file(
            &id,
            &file,
            &[OpenOptions {
                with_latest_revision_id,
            }],
        )
        .await?;

    if with_latest_revision_id {
        match handle.revision_id() {
            Ok(revision) => println!("revision ID: {revision}"),
            Err(WorkspaceError::RevisionNotRequested) => println!("revision ID: <not available>"),
            Err(err) => return Err(err.into()),
        }
    }

    let data = handle.read_to_bytes().await?;
    let mut stdout = io::stdout().lock();
    if base64_encode_output {
        stdout.write_all(BASE64.encode(data).as_bytes())?;
    } else {
        stdout.write_all(&data)?;
    }
    Ok(())
}

async fn handle_stat_file(
    client: &Client,
    id: String,
    file: String,
    with_latest_revision_id: bool,
    json: bool,
) -> Result<()> {
    let info = client
        .stat_file(
            &id,
            &file,
            &[StatOptions {
                with_latest_revision_id,
            }],
        )
        .await?;

    if json {
        println!("{}", serde_json::to_string(&info)?);
        return Ok(());
    }

    println!("workspace id: {}", info.workspace_id);
    println!("name: {}", info.name);
    println!("size: {}", info.size);
    println!("mod time: {}", info.mod_time);
    println!("mime type: {}", info.mime_type);
    if with_latest_revision_id {
        match info.latest_revision_id() {
            Ok(revision) => println!("revision ID: {revision}"),
            Err(_) => println!("revision ID: <not available>"),
        }
    }
    Ok(())
}

async fn handle_validate_env(client: &Client, provider: &str) -> Result<()> {
    let id = client.create(provider, &[]).await?;
    client.rm(&id).await?;
    println!("Environment validated");
    Ok(())
}
