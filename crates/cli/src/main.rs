//! `biotransfer`: resumable uploads and download bundle planning.

mod progress;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use biotransfer_common::{CHECKPOINT_PREFIX, DEFAULT_BUNDLE_SIZE, DEFAULT_PART_SIZE, DEFAULT_UPLOAD_CONCURRENCY};
use biotransfer_index::{GroupingOptions, GroupingPlan, GroupingPlanner, HttpIndexSource, MetadataCache};
use biotransfer_storage::{
    ApiLocation, FileDescriptor, Manifest, ManifestEntry, UploadOptions, UploadOrchestrator,
    UploadReport,
};
use biotransfer_storage_http::{HttpClientSettings, HttpStorageClient, HttpSubmissionLookup};

use crate::progress::BarReporter;

const DEFAULT_SERVER: &str = "https://api.gdc.cancer.gov/";

#[derive(Parser)]
#[command(name = "biotransfer", version, about = "Move large data files to and from the repository API")]
struct Cli {
    /// Verbose logging; failing uploads return their original error.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload files, resuming from a checkpoint if given one as manifest.
    Upload(UploadArgs),
    /// Abort unfinished multipart uploads.
    Abort(RemoteArgs),
    /// Delete uploaded files.
    Delete(RemoteArgs),
    /// Split file ids into individual downloads and bundles.
    Plan(PlanArgs),
}

#[derive(Args)]
struct Connection {
    /// API root.
    #[arg(short, long, default_value = DEFAULT_SERVER)]
    server: String,

    /// File holding the auth token.
    #[arg(short = 't', long)]
    token_file: Option<PathBuf>,

    /// Skip TLS certificate verification.
    #[arg(long)]
    insecure: bool,
}

impl Connection {
    fn token(&self) -> Result<Option<String>> {
        let Some(path) = &self.token_file else {
            return Ok(None);
        };
        let token: String = std::fs::read_to_string(path)
            .with_context(|| format!("reading token file {}", path.display()))?;
        Ok(Some(token.trim().to_string()))
    }

    fn settings(&self) -> Result<HttpClientSettings> {
        let mut settings: HttpClientSettings =
            HttpClientSettings::new().with_verify_tls(!self.insecure);
        if let Some(token) = self.token()? {
            settings = settings.with_token(token);
        }
        Ok(settings)
    }

    fn storage_client(&self) -> Result<HttpStorageClient> {
        Ok(HttpStorageClient::new(self.settings()?)?)
    }

    fn submission_lookup(&self) -> Result<HttpSubmissionLookup> {
        Ok(HttpSubmissionLookup::new(&self.settings()?, &self.server)?)
    }
}

/// Files named by a manifest, or a single file on the command line.
#[derive(Args)]
struct FileSelection {
    /// Manifest or checkpoint (YAML `files:` list).
    #[arg(short, long, conflicts_with = "id")]
    manifest: Option<PathBuf>,

    /// File id.
    #[arg(short, long)]
    id: Option<String>,

    /// Project id, PROGRAM-PROJECT; looked up when omitted.
    #[arg(short, long)]
    project_id: Option<String>,

    /// Local path of the file, or its directory.
    #[arg(long)]
    path: Option<String>,

    /// File name inside --path; looked up when omitted.
    #[arg(short, long)]
    file_name: Option<String>,

    /// Multipart session to resume or abort.
    #[arg(short, long)]
    upload_id: Option<String>,
}

impl FileSelection {
    /// Entries plus the manifest name used for checkpoints.
    fn entries(&self) -> Result<(Vec<ManifestEntry>, Option<String>)> {
        if let Some(path) = &self.manifest {
            let manifest: Manifest = Manifest::load(path)?;
            // A resumed run keeps overwriting the same checkpoint.
            let name: Option<String> = path.file_name().map(|n| {
                let name = n.to_string_lossy();
                name.strip_prefix(CHECKPOINT_PREFIX).unwrap_or(&name).to_string()
            });
            return Ok((manifest.files, name));
        }

        let Some(id) = &self.id else {
            bail!("either --manifest or --id is required");
        };
        let entry = ManifestEntry {
            id: id.clone(),
            project_id: self.project_id.clone(),
            path: self.path.clone(),
            file_name: self.file_name.clone(),
            upload_id: self.upload_id.clone(),
            access: None,
        };
        Ok((vec![entry], None))
    }

    /// Entries with missing project ids (and file names, when the local
    /// file is needed) filled in from the repository.
    async fn resolve(
        &self,
        connection: &Connection,
        with_file_name: bool,
    ) -> Result<(Manifest, Option<String>)> {
        let (entries, name) = self.entries()?;
        let mut manifest: Manifest = Manifest::new(entries);
        let incomplete: bool = manifest
            .files
            .iter()
            .any(|e| e.project_id.is_none() || (with_file_name && e.needs_file_name()));
        if incomplete {
            let lookup: HttpSubmissionLookup = connection.submission_lookup()?;
            let lookups: usize = manifest.fill_missing(&lookup, with_file_name).await?;
            log::debug!("Completed {} manifest entries from the repository", lookups);
        }
        Ok((manifest, name))
    }
}

#[derive(Args)]
struct UploadArgs {
    #[command(flatten)]
    connection: Connection,

    #[command(flatten)]
    files: FileSelection,

    /// Multipart part size in bytes.
    #[arg(long, default_value_t = DEFAULT_PART_SIZE)]
    part_size: u64,

    /// Concurrent part uploads.
    #[arg(short = 'n', long, default_value_t = DEFAULT_UPLOAD_CONCURRENCY)]
    concurrency: usize,

    /// Send every file with a single PUT.
    #[arg(long)]
    no_multipart: bool,

    /// Where resume checkpoints are written.
    #[arg(long, default_value = ".")]
    checkpoint_dir: PathBuf,

    /// Delay between retries, in seconds.
    #[arg(long, default_value_t = 2)]
    retry_delay: u64,
}

#[derive(Args)]
struct RemoteArgs {
    #[command(flatten)]
    connection: Connection,

    #[command(flatten)]
    files: FileSelection,
}

#[derive(Args)]
struct PlanArgs {
    /// API root.
    #[arg(short, long, default_value = DEFAULT_SERVER)]
    server: String,

    /// Maximum bundle size in bytes.
    #[arg(long, default_value_t = DEFAULT_BUNDLE_SIZE)]
    chunk_size: u64,

    /// Download files with index or metadata files individually.
    #[arg(long)]
    related_files: bool,

    /// Download files with annotations individually.
    #[arg(long)]
    annotations: bool,

    /// Skip TLS certificate verification.
    #[arg(long)]
    insecure: bool,

    /// File ids to plan.
    #[arg(required = true)]
    ids: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = Cli::parse();
    init_logging(cli.debug);

    match cli.command {
        Command::Upload(args) => upload(args, cli.debug).await,
        Command::Abort(args) => abort(args).await,
        Command::Delete(args) => delete(args).await,
        Command::Plan(args) => plan(args).await,
    }
}

fn init_logging(debug: bool) {
    let level: &str = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

/// Token cancelled on Ctrl-C.
fn interrupt_token() -> CancellationToken {
    let cancel: CancellationToken = CancellationToken::new();
    let trigger: CancellationToken = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("failed to listen for ctrl_c: {e:?}");
            return;
        }
        log::warn!("Interrupted, stopping workers");
        trigger.cancel();
    });
    cancel
}

async fn upload(args: UploadArgs, debug: bool) -> Result<()> {
    let (manifest, manifest_name) = args.files.resolve(&args.connection, true).await?;
    let queue: VecDeque<FileDescriptor> = manifest.descriptors()?;
    let client: HttpStorageClient = args.connection.storage_client()?;

    let mut options: UploadOptions = UploadOptions::default()
        .with_part_size(args.part_size)
        .with_concurrency(args.concurrency)
        .with_multipart(!args.no_multipart)
        .with_debug(debug)
        .with_retry_delay(Duration::from_secs(args.retry_delay))
        .with_checkpoint_dir(&args.checkpoint_dir);
    if let Some(name) = manifest_name {
        options = options.with_manifest_name(name);
    }

    let orchestrator = UploadOrchestrator::new(&client, ApiLocation::new(&args.connection.server))
        .with_options(options)
        .with_cancellation(interrupt_token());

    let reporter: BarReporter = BarReporter::new();
    let result = orchestrator.upload_queue(queue, Some(&reporter)).await;
    reporter.finish();

    let report: UploadReport = result?;
    for id in &report.uploaded {
        log::info!("Uploaded {}", id);
    }
    if let Some(failure) = report.failure {
        if let Some(path) = &failure.checkpoint {
            eprintln!("Resume with: biotransfer upload --manifest {}", path.display());
        }
        bail!("upload of {} failed: {}", failure.file_id, failure.error);
    }
    Ok(())
}

async fn abort(args: RemoteArgs) -> Result<()> {
    let (manifest, _) = args.files.resolve(&args.connection, false).await?;
    let files: Vec<FileDescriptor> = manifest
        .files
        .iter()
        .map(FileDescriptor::remote_only)
        .collect::<Result<_, _>>()?;
    let client: HttpStorageClient = args.connection.storage_client()?;
    let orchestrator = UploadOrchestrator::new(&client, ApiLocation::new(&args.connection.server));

    let aborted: usize = orchestrator.abort_queue(&files).await?;
    log::info!("Aborted {} multipart uploads", aborted);
    Ok(())
}

async fn delete(args: RemoteArgs) -> Result<()> {
    let (manifest, _) = args.files.resolve(&args.connection, false).await?;
    let entries: Vec<ManifestEntry> = manifest.files;
    let client: HttpStorageClient = args.connection.storage_client()?;
    let orchestrator = UploadOrchestrator::new(&client, ApiLocation::new(&args.connection.server));

    let mut failed: usize = 0;
    for entry in &entries {
        let file: FileDescriptor = FileDescriptor::remote_only(entry)?;
        if let Err(e) = orchestrator.delete(&file).await {
            log::error!("Fail to delete file {}: {}", file.id, e);
            failed += 1;
        }
    }
    if failed > 0 {
        bail!("{} of {} deletes failed", failed, entries.len());
    }
    Ok(())
}

async fn plan(args: PlanArgs) -> Result<()> {
    let source: HttpIndexSource = HttpIndexSource::new(&args.server, !args.insecure, None)?;
    let mut cache = MetadataCache::new(source);
    let planner: GroupingPlanner = GroupingPlanner::new(
        GroupingOptions::new()
            .with_chunk_size(args.chunk_size)
            .with_related(args.related_files)
            .with_annotations(args.annotations),
    );

    let plan: GroupingPlan = planner.plan(&mut cache, &args.ids).await;

    for id in &plan.bigs {
        println!("file\t{}", id);
    }
    for (i, bundle) in plan.bundles.iter().enumerate() {
        println!(
            "bundle {}\t{}\t{} bytes\t{}",
            i + 1,
            bundle.access,
            bundle.size,
            bundle.ids.join(",")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_single_file_selection() {
        let cli: Cli = Cli::parse_from([
            "biotransfer",
            "upload",
            "--id",
            "f-1",
            "--project-id",
            "tcga-luad",
            "--path",
            "/data/a.bam",
            "--upload-id",
            "u-1",
        ]);
        let Command::Upload(args) = cli.command else {
            panic!("expected upload");
        };
        let (entries, name) = args.files.entries().unwrap();
        assert_eq!(name, None);
        assert_eq!(entries[0].id, "f-1");
        assert_eq!(entries[0].upload_id.as_deref(), Some("u-1"));
        assert_eq!(args.part_size, DEFAULT_PART_SIZE);
    }

    #[test]
    fn test_manifest_selection_names_checkpoint() {
        let dir = tempfile::TempDir::new().unwrap();
        let path: PathBuf = dir.path().join("batch.yml");
        std::fs::write(&path, "files:\n  - id: f-1\n    project_id: tcga-luad\n").unwrap();

        let cli: Cli = Cli::parse_from([
            "biotransfer",
            "abort",
            "--manifest",
            path.to_str().unwrap(),
        ]);
        let Command::Abort(args) = cli.command else {
            panic!("expected abort");
        };
        let (entries, name) = args.files.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(name.as_deref(), Some("batch.yml"));
    }

    #[test]
    fn test_checkpoint_as_manifest_keeps_name() {
        let dir = tempfile::TempDir::new().unwrap();
        let path: PathBuf = dir.path().join("resume_batch.yml");
        std::fs::write(&path, "files: []\n").unwrap();

        let cli: Cli = Cli::parse_from(["biotransfer", "upload", "-m", path.to_str().unwrap()]);
        let Command::Upload(args) = cli.command else {
            panic!("expected upload");
        };
        let (_, name) = args.files.entries().unwrap();
        assert_eq!(name.as_deref(), Some("batch.yml"));
    }

    #[tokio::test]
    async fn test_complete_selection_skips_lookup() {
        // An unreachable server proves no lookup is attempted.
        let cli: Cli = Cli::parse_from([
            "biotransfer",
            "abort",
            "--server",
            "http://127.0.0.1:9",
            "--id",
            "f-1",
            "--project-id",
            "tcga-luad",
            "--upload-id",
            "u-1",
        ]);
        let Command::Abort(args) = cli.command else {
            panic!("expected abort");
        };
        let (manifest, _) = args.files.resolve(&args.connection, false).await.unwrap();
        assert_eq!(manifest.files[0].project_id.as_deref(), Some("tcga-luad"));
    }

    #[test]
    fn test_id_alone_is_accepted() {
        let cli: Cli = Cli::parse_from(["biotransfer", "delete", "--id", "f-1"]);
        let Command::Delete(args) = cli.command else {
            panic!("expected delete");
        };
        let (entries, _) = args.files.entries().unwrap();
        assert_eq!(entries[0].project_id, None);
        assert_eq!(entries[0].file_name, None);
    }

    #[test]
    fn test_manifest_and_id_conflict() {
        let result = Cli::try_parse_from([
            "biotransfer",
            "delete",
            "--manifest",
            "m.yml",
            "--id",
            "f-1",
            "--project-id",
            "a-b",
        ]);
        assert!(result.is_err());
    }
}
