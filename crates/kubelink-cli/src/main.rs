//! kubelink-cli: CLI entry point for the kubelink resource graph.

mod commands_config;
mod commands_query;
mod commands_watch;

use clap::{Parser, Subcommand};
use kubelink_core::{KubelinkConfig, Resource};
use kubelink_index::ResourceEngine;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(
    name = "kubelink",
    about = "Reference graph for Kubernetes manifests and Kustomize overlays"
)]
#[command(version, propagate_version = true)]
struct Cli {
    /// Config file (defaults to ~/.kubelink/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a folder and list its resources
    Scan {
        /// Folder to scan (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Print resources as JSON
        #[arg(long)]
        json: bool,

        /// Also print parse and link diagnostics
        #[arg(short, long)]
        diagnostics: bool,
    },

    /// Show the references of one resource
    Refs {
        /// Resource id, or `Kind/name`
        resource: String,

        /// Folder to scan (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// List kustomizations and everything they compose
    Kustomizations {
        /// Folder to scan (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// Include the kustomizations composing each one
        #[arg(long)]
        parents: bool,
    },

    /// List container images and the resources using them
    Images {
        /// Folder to scan (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Watch a folder and report reference changes
    Watch {
        /// Folder to watch (defaults to current directory)
        #[arg(short, long)]
        path: Option<PathBuf>,
    },

    /// Read or modify configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print a value by dotted key, e.g. `scan.max_file_size_kb`
    Get { key: String },
    /// Set a value by dotted key and save
    Set { key: String, value: String },
    /// Print the config file location
    Path,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so stdout stays clean for --json output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("kubelink=info".parse().expect("valid tracing directive")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(KubelinkConfig::default_path);

    match cli.command {
        Commands::Scan {
            path,
            json,
            diagnostics,
        } => {
            let root = folder_or_cwd(path)?;
            commands_query::cmd_scan(&root, &load_config(&config_path)?, json, diagnostics)?;
        }
        Commands::Refs { resource, path } => {
            let root = folder_or_cwd(path)?;
            commands_query::cmd_refs(&root, &load_config(&config_path)?, &resource)?;
        }
        Commands::Kustomizations { path, parents } => {
            let root = folder_or_cwd(path)?;
            commands_query::cmd_kustomizations(&root, &load_config(&config_path)?, parents)?;
        }
        Commands::Images { path } => {
            let root = folder_or_cwd(path)?;
            commands_query::cmd_images(&root, &load_config(&config_path)?)?;
        }
        Commands::Watch { path } => {
            let root = folder_or_cwd(path)?;
            commands_watch::cmd_watch(&root, &load_config(&config_path)?)?;
        }
        Commands::Config { action } => match action {
            ConfigAction::Get { key } => commands_config::cmd_config_get(&config_path, &key)?,
            ConfigAction::Set { key, value } => {
                commands_config::cmd_config_set(&config_path, &key, &value)?
            }
            ConfigAction::Path => println!("{}", config_path.display()),
        },
    }

    Ok(())
}

// ── Helpers (shared across modules) ────────────────────────────────────────

fn folder_or_cwd(path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match path {
        Some(p) => Ok(p),
        None => Ok(std::env::current_dir()?),
    }
}

/// Load the config file if it exists, defaults otherwise.
pub(crate) fn load_config(path: &Path) -> anyhow::Result<KubelinkConfig> {
    if path.exists() {
        Ok(KubelinkConfig::load(path)?)
    } else {
        Ok(KubelinkConfig::default())
    }
}

/// Create an engine for `root` and scan it.
pub(crate) fn open_engine(root: &Path, config: &KubelinkConfig) -> anyhow::Result<ResourceEngine> {
    if !root.is_dir() {
        anyhow::bail!("Not a directory: {}", root.display());
    }
    let mut engine = ResourceEngine::from_config(root, config)?;
    engine.rescan()?;
    Ok(engine)
}

/// `Kind/name` label used in listings.
pub(crate) fn label(resource: &Resource) -> String {
    format!("{}/{}", resource.kind, resource.name)
}

/// Find a resource by id or by `Kind/name` (kind matched case-insensitively).
pub(crate) fn find_resource<'a>(
    engine: &'a ResourceEngine,
    query: &str,
) -> anyhow::Result<&'a Resource> {
    if let Some(resource) = engine.resource(query) {
        return Ok(resource);
    }
    let Some((kind, name)) = query.split_once('/') else {
        anyhow::bail!("No resource with id {query}; use Kind/name to search by name");
    };

    let matches: Vec<&Resource> = engine
        .resources()
        .values()
        .filter(|r| r.kind.eq_ignore_ascii_case(kind) && r.declared_name() == name)
        .collect();
    match matches.as_slice() {
        [] => anyhow::bail!("No resource {query}"),
        [one] => Ok(*one),
        many => {
            let places: Vec<String> = many
                .iter()
                .map(|r| format!("{} ({})", r.id, r.file_path))
                .collect();
            anyhow::bail!("{query} is ambiguous, pass an id: {}", places.join(", "))
        }
    }
}
