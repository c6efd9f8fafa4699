//! Bodies of the CLI commands: build the clients, resolve what the user chose,
//! run the core pipeline and print the result to stdout.

use std::fs::{self, File};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use ingest_ragflow_core::config::PipelineOptions;
use ingest_ragflow_core::contract::{
    Collection, Credentials, Dataset, DocumentStatus, Repository, Session,
};
use ingest_ragflow_core::discovery::find_pdf_files;
use ingest_ragflow_core::dspace::DSpaceClient;
use ingest_ragflow_core::harvest::{harvest_collection, DownloadOutcome, DownloadResult, HarvestOptions};
use ingest_ragflow_core::pipeline::{ingest_collections, ingest_repository_items, upload_folder};
use ingest_ragflow_core::stats::{item_stats, repository_stats};
use tracing::{info, warn};

use crate::cli::{DatasetArgs, LoginArgs, RunArgs};
use crate::load_config::{CliConfig, DatasetSection};
use crate::progress::StderrProgress;
use crate::prompt::{confirm, select_index};
use crate::ragflow::RagflowClient;

/// What the `ingest` command pulls from the repository.
pub enum IngestSource {
    AllCollections,
    /// Indexes or uuids; empty means prompt for one.
    Collections(Vec<String>),
    RepositoryItems { limit: Option<usize> },
}

pub enum StatsScope {
    Collections,
    Items { limit: Option<usize> },
}

fn dspace_client(config: &CliConfig) -> Result<DSpaceClient> {
    Ok(DSpaceClient::new(config.dspace.rest_url.clone())?.with_page_size(config.dspace.page_size))
}

fn ragflow_client(config: &CliConfig) -> Result<RagflowClient> {
    let api_key = config.ragflow.require_api_key()?;
    Ok(RagflowClient::new(&config.ragflow.base_url, api_key)?)
}

async fn login(repo: &DSpaceClient, login: &LoginArgs) -> Result<Session> {
    repo.authenticate(&login.credentials())
        .await
        .context("DSpace authentication failed")
}

fn run_options(config: &CliConfig, run: &RunArgs) -> Result<PipelineOptions> {
    let mut options = config.pipeline.to_options()?;
    if let Some(max_tasks) = run.max_tasks {
        options.max_tasks = max_tasks.max(1);
    }
    options.cleanup |= run.cleanup;
    options.trace_loaded();
    Ok(options)
}

pub async fn download(
    config: &CliConfig,
    login_args: &LoginArgs,
    output: &Path,
    collection: Option<&str>,
) -> Result<()> {
    let repo = dspace_client(config)?;
    let session = login(&repo, login_args).await?;
    let collections = repo.list_collections(&session).await?;

    let stdin = io::stdin();
    let collection_id = resolve_collection(
        &collections,
        collection,
        &mut stdin.lock(),
        &mut io::stdout(),
    )?;

    let options = HarvestOptions {
        output_dir: output.to_path_buf(),
        concurrency: config.pipeline.to_options()?.max_tasks,
        skip_existing: false,
    };
    let results = harvest_collection(
        Arc::new(repo),
        &session,
        &collection_id,
        &options,
        Arc::new(StderrProgress),
    )
    .await?;

    println!("{}", download_summary(&results, output));
    Ok(())
}

pub async fn upload(
    config: &CliConfig,
    folder: &Path,
    dataset_args: &DatasetArgs,
    run: &RunArgs,
) -> Result<()> {
    // Count before any remote call or prompt: an invalid or empty folder needs no API key.
    let found = find_pdf_files(folder)?.len();
    println!("Found {found} PDF files in {}", folder.display());
    if found == 0 {
        return Ok(());
    }

    let options = run_options(config, run)?;
    let kb = Arc::new(ragflow_client(config)?);
    let stdin = io::stdin();
    let dataset = resolve_dataset(
        &kb,
        dataset_args,
        &config.dataset,
        &mut stdin.lock(),
        &mut io::stdout(),
    )
    .await?;

    let report = upload_folder(kb, &dataset, folder, &options, Arc::new(StderrProgress)).await?;
    println!("{report}");
    Ok(())
}

pub async fn ingest(
    config: &CliConfig,
    login_args: &LoginArgs,
    folder: &Path,
    source: IngestSource,
    dataset_args: &DatasetArgs,
    run: &RunArgs,
) -> Result<()> {
    let options = run_options(config, run)?;
    let kb = Arc::new(ragflow_client(config)?);
    let repo = dspace_client(config)?;
    let session = login(&repo, login_args).await?;

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();

    let selectors = match source {
        IngestSource::RepositoryItems { limit } => {
            let dataset = resolve_dataset(&kb, dataset_args, &config.dataset, &mut input, &mut output).await?;
            let report = ingest_repository_items(
                Arc::new(repo),
                &session,
                kb,
                &dataset,
                limit,
                folder,
                &options,
                Arc::new(StderrProgress),
            )
            .await?;
            println!("{report}");
            return Ok(());
        }
        IngestSource::AllCollections => None,
        IngestSource::Collections(given) => Some(given),
    };

    let collections = repo.list_collections(&session).await?;
    info!(count = collections.len(), "[INGEST] Collections available");

    let collection_ids = match selectors {
        None => collections.iter().map(|c| c.id.clone()).collect(),
        Some(given) if given.is_empty() => {
            vec![resolve_collection(&collections, None, &mut input, &mut output)?]
        }
        Some(given) => given
            .iter()
            .map(|selector| resolve_collection(&collections, Some(selector.as_str()), &mut input, &mut output))
            .collect::<Result<Vec<_>>>()?,
    };
    if collection_ids.is_empty() {
        warn!("[INGEST] Repository has no collections");
        println!("No collections to ingest.");
        return Ok(());
    }

    let dataset = resolve_dataset(&kb, dataset_args, &config.dataset, &mut input, &mut output).await?;

    let report = ingest_collections(
        Arc::new(repo),
        &session,
        kb,
        &dataset,
        &collection_ids,
        folder,
        &options,
        Arc::new(StderrProgress),
    )
    .await?;
    println!("{report}");
    Ok(())
}

pub async fn stats(
    config: &CliConfig,
    credentials: Option<&Credentials>,
    scope: StatsScope,
    csv_path: Option<&Path>,
) -> Result<()> {
    let repo = dspace_client(config)?;
    let session = match credentials {
        Some(credentials) => repo
            .authenticate(credentials)
            .await
            .context("DSpace authentication failed")?,
        None => Session::anonymous(),
    };

    match scope {
        StatsScope::Collections => {
            let stats = repository_stats(&repo, &session).await?;
            println!("{stats}");
            if let Some(path) = csv_path {
                stats.write_csv(create_csv(path)?)?;
                println!("Statistics have been saved to {}", path.display());
            }
        }
        StatsScope::Items { limit } => {
            let concurrency = config.pipeline.to_options()?.max_tasks;
            let table = item_stats(&repo, &session, limit, concurrency).await?;
            println!("{table}");
            if let Some(path) = csv_path {
                table.write_csv(create_csv(path)?)?;
                println!("Statistics have been saved to {}", path.display());
            }
        }
    }
    Ok(())
}

fn create_csv(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    File::create(path).with_context(|| format!("Failed to create CSV file {}", path.display()))
}

pub async fn documents(config: &CliConfig, dataset_args: &DatasetArgs) -> Result<()> {
    let kb = ragflow_client(config)?;
    let dataset = if dataset_args.dataset_id.is_some() || dataset_args.dataset_name.is_some() {
        find_dataset(&kb, dataset_args).await?
    } else {
        let stdin = io::stdin();
        pick_dataset(&kb, &mut stdin.lock(), &mut io::stdout()).await?
    };
    let docs = kb.list_documents(&dataset).await?;
    println!("{}", document_listing(&dataset, &docs));
    Ok(())
}

/// An existing dataset named by flag; never creates one.
async fn find_dataset(kb: &RagflowClient, args: &DatasetArgs) -> Result<Dataset> {
    match (&args.dataset_id, &args.dataset_name) {
        (Some(id), _) => kb
            .get_dataset_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("dataset {id} not found")),
        (None, Some(name)) => kb
            .get_dataset_by_name(name)
            .await?
            .ok_or_else(|| anyhow!("dataset named {name} not found")),
        (None, None) => bail!("pass --dataset-id or --dataset-name"),
    }
}

fn document_listing(dataset: &Dataset, docs: &[DocumentStatus]) -> String {
    let rule = "-".repeat(50);
    let mut lines = vec![format!("Documents in {} ({}):", dataset.name, docs.len()), rule.clone()];
    lines.extend(
        docs.iter()
            .map(|d| format!("{} | Status: {} | Fragments: {}", d.name, d.state, d.chunk_count)),
    );
    lines.push(rule);
    lines.join("\n")
}

/// Pick a collection by index or uuid, or prompt for an index when no selector is given.
pub fn resolve_collection<R: BufRead, W: Write>(
    collections: &[Collection],
    selector: Option<&str>,
    input: &mut R,
    output: &mut W,
) -> Result<String> {
    if collections.is_empty() {
        bail!("the repository has no collections");
    }
    match selector {
        Some(selector) => {
            if let Some(c) = collections.iter().find(|c| c.id == selector) {
                return Ok(c.id.clone());
            }
            match selector.parse::<usize>() {
                Ok(index) => collections
                    .get(index)
                    .map(|c| c.id.clone())
                    .ok_or_else(|| anyhow!("collection index {index} is out of range (0..{})", collections.len())),
                Err(_) => Err(anyhow!("no collection with uuid {selector}")),
            }
        }
        None => {
            writeln!(output, "The following {} collections were found.", collections.len())?;
            for (i, c) in collections.iter().enumerate() {
                writeln!(output, "Index: {i} | ID: {} | Name: {}", c.id, c.display_name())?;
            }
            let index = select_index(
                input,
                output,
                "Enter the index of the collection you want to use",
                collections.len(),
            )?;
            Ok(collections[index].id.clone())
        }
    }
}

/// Resolve the target dataset from flags, or interactively.
pub async fn resolve_dataset<R: BufRead, W: Write>(
    kb: &RagflowClient,
    args: &DatasetArgs,
    defaults: &DatasetSection,
    input: &mut R,
    output: &mut W,
) -> Result<Dataset> {
    if args.dataset_id.is_some() {
        return find_dataset(kb, args).await;
    }
    if let Some(name) = &args.dataset_name {
        if let Some(dataset) = kb.get_dataset_by_name(name).await? {
            info!(dataset_id = %dataset.id, name = %dataset.name, "Using existing dataset");
            return Ok(dataset);
        }
        return Ok(kb.create_dataset(&defaults.settings(Some(name))).await?);
    }

    if confirm(input, output, "Create new dataset?")? {
        return Ok(kb.create_dataset(&defaults.settings(None)).await?);
    }
    pick_dataset(kb, input, output).await
}

/// List existing datasets and prompt for one by index.
pub async fn pick_dataset<R: BufRead, W: Write>(
    kb: &RagflowClient,
    input: &mut R,
    output: &mut W,
) -> Result<Dataset> {
    let datasets = kb.list_datasets().await?;
    if datasets.is_empty() {
        bail!("no datasets exist; create one or pass --dataset-name");
    }
    for (i, dataset) in datasets.iter().enumerate() {
        writeln!(output, "{i}: {}", dataset.name)?;
    }
    let index = select_index(input, output, "Enter dataset index", datasets.len())?;
    Ok(datasets[index].clone())
}

fn download_summary(results: &[DownloadResult], output: &Path) -> String {
    let mut saved = 0;
    let mut skipped = 0;
    let mut failures = Vec::new();
    for result in results {
        match &result.outcome {
            DownloadOutcome::Saved { .. } | DownloadOutcome::AlreadyPresent { .. } => saved += 1,
            DownloadOutcome::Skipped { .. } => skipped += 1,
            DownloadOutcome::Failed { error } => failures.push(format!("  {}: {error}", result.item_id)),
        }
    }
    let mut summary = format!(
        "Downloaded {saved} files to {} ({skipped} items without files, {} failed)",
        output.display(),
        failures.len()
    );
    if !failures.is_empty() {
        summary.push_str("\nFailed downloads:\n");
        summary.push_str(&failures.join("\n"));
    }
    summary
}
