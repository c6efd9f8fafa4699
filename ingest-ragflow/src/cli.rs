/// # ingest-ragflow CLI Interface (Module)
///
/// Command parsing and routing for the `ingest-ragflow` binary. All pipeline
/// logic lives in [`ingest-ragflow-core`]; this module only maps arguments and
/// config onto it.
///
/// ## How To Use
/// - Command-line users: run the `ingest-ragflow` binary with `--help`.
/// - Programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// ## Extending
/// Add a variant to [`Commands`] and its body to `commands.rs`; keep anything
/// non-trivial inside the core crate.
///
/// [`ingest-ragflow-core`]: ../../ingest-ragflow-core/
use crate::commands;
use crate::load_config::load_config;
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use ingest_ragflow_core::contract::Credentials;
use std::path::PathBuf;

/// CLI for ingest-ragflow: move DSpace repository PDFs into a RAGFlow knowledge base.
#[derive(Debug, Parser)]
#[clap(
    name = "ingest-ragflow",
    version,
    about = "Download DSpace collections and ingest their PDFs into a RAGFlow knowledge base"
)]
pub struct Cli {
    /// Path to the YAML config file (optional; defaults apply when absent)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Args)]
pub struct LoginArgs {
    /// DSpace account email
    #[clap(long, env = "DSPACE_EMAIL")]
    pub email: String,
    /// DSpace account password
    #[clap(long, env = "DSPACE_PASSWORD", hide_env_values = true)]
    pub password: String,
}

impl LoginArgs {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }
}

/// Target dataset. Without either flag the user is prompted.
#[derive(Debug, Clone, Default, Args)]
pub struct DatasetArgs {
    /// Use the existing dataset with this id
    #[clap(long, conflicts_with = "dataset_name")]
    pub dataset_id: Option<String>,
    /// Use the dataset with this name, creating it if missing
    #[clap(long)]
    pub dataset_name: Option<String>,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Maximum concurrent uploads/downloads (overrides config)
    #[clap(long)]
    pub max_tasks: Option<usize>,
    /// Delete local files whose documents parsed successfully
    #[clap(long)]
    pub cleanup: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download every item of one DSpace collection into a folder
    Download {
        #[clap(flatten)]
        login: LoginArgs,
        /// Folder the files are written to
        #[clap(long)]
        output: PathBuf,
        /// Collection index or uuid; prompted for when absent
        #[clap(long)]
        collection: Option<String>,
    },
    /// Upload every PDF under a folder to a RAGFlow dataset and wait for parsing
    Upload {
        /// Folder searched recursively for PDF files
        #[clap(long = "folder-path", alias = "folder_path")]
        folder_path: PathBuf,
        #[clap(flatten)]
        dataset: DatasetArgs,
        #[clap(flatten)]
        run: RunArgs,
    },
    /// Download DSpace collections and ingest their PDFs into RAGFlow
    Ingest {
        #[clap(flatten)]
        login: LoginArgs,
        /// Folder used for downloaded files
        #[clap(long = "folder-path", alias = "folder_path")]
        folder_path: PathBuf,
        /// Collection index or uuid; repeatable
        #[clap(long)]
        collection: Vec<String>,
        /// Ingest every collection in the repository
        #[clap(long, conflicts_with = "collection")]
        all_collections: bool,
        /// Ingest repository items directly instead of going through collections
        #[clap(long, conflicts_with_all = ["collection", "all_collections"])]
        all_items: bool,
        /// Maximum number of repository items to ingest
        #[clap(long, requires = "all_items")]
        limit: Option<usize>,
        #[clap(flatten)]
        dataset: DatasetArgs,
        #[clap(flatten)]
        run: RunArgs,
    },
    /// Print item count and size per DSpace collection
    Stats {
        /// DSpace account email; public collections only when absent
        #[clap(long, env = "DSPACE_EMAIL", requires = "password")]
        email: Option<String>,
        #[clap(long, env = "DSPACE_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Report every repository item instead of every collection
        #[clap(long)]
        items: bool,
        /// Maximum number of items to report
        #[clap(long, requires = "items")]
        limit: Option<usize>,
        /// Also write the statistics to this CSV file
        #[clap(long)]
        output: Option<PathBuf>,
    },
    /// List the documents of a RAGFlow dataset with their parse status
    Documents {
        #[clap(flatten)]
        dataset: DatasetArgs,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Download {
            login,
            output,
            collection,
        } => {
            tracing::info!(command = "download", output = %output.display(), "Starting download");
            commands::download(&config, &login, &output, collection.as_deref()).await
        }
        Commands::Upload {
            folder_path,
            dataset,
            run,
        } => {
            tracing::info!(command = "upload", folder = %folder_path.display(), "Starting upload");
            commands::upload(&config, &folder_path, &dataset, &run).await
        }
        Commands::Ingest {
            login,
            folder_path,
            collection,
            all_collections,
            all_items,
            limit,
            dataset,
            run,
        } => {
            tracing::info!(command = "ingest", folder = %folder_path.display(), "Starting ingest");
            let source = if all_items {
                commands::IngestSource::RepositoryItems { limit }
            } else if all_collections {
                commands::IngestSource::AllCollections
            } else {
                commands::IngestSource::Collections(collection)
            };
            commands::ingest(&config, &login, &folder_path, source, &dataset, &run).await
        }
        Commands::Stats {
            email,
            password,
            items,
            limit,
            output,
        } => {
            tracing::info!(command = "stats", items, "Collecting repository statistics");
            let credentials = match (email, password) {
                (Some(email), Some(password)) => Some(Credentials { email, password }),
                _ => None,
            };
            let scope = if items {
                commands::StatsScope::Items { limit }
            } else {
                commands::StatsScope::Collections
            };
            commands::stats(&config, credentials.as_ref(), scope, output.as_deref()).await
        }
        Commands::Documents { dataset } => {
            tracing::info!(command = "documents", "Listing dataset documents");
            commands::documents(&config, &dataset).await
        }
    }
}
