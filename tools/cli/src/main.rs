//! Fragments CLI - Command line client for the fragments API.
//!
//! Every command works offline: writes are queued in the local store and
//! pushed by `sync` or by `watch` once the API is reachable again.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use fragments_common::{type_for_extension, FragmentContent, FragmentId, OwnerId};
use fragments_storage::{
    create_default_registry, AuthProvider, HttpFragmentsClient, StaticTokenAuth, User,
};
use fragments_sync::{
    ClientConfig, Completed, Connectivity, ConnectivityMonitor, Outcome, SyncCoordinator,
    SyncScheduler,
};

#[derive(Parser)]
#[command(name = "fragments")]
#[command(about = "Fragments - Offline-first client for the fragments API")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Base URL of the fragments API (overrides config and API_URL).
    #[arg(long)]
    api_url: Option<String>,

    /// Identity token sent as bearer authorization.
    #[arg(long, env = "FRAGMENTS_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Owner the local store is partitioned by.
    #[arg(long, env = "FRAGMENTS_OWNER", default_value = "local")]
    owner: String,

    /// Do not contact the API.
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Content given inline or read from a file.
#[derive(Args)]
struct ContentArgs {
    /// Content type, e.g. "text/markdown". Inferred from the file extension if omitted.
    #[arg(short = 't', long = "type")]
    content_type: Option<String>,

    /// File to read the content from.
    #[arg(short, long, conflicts_with = "text", required_unless_present = "text")]
    file: Option<PathBuf>,

    /// Inline text content.
    #[arg(long)]
    text: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a fragment.
    Create {
        #[command(flatten)]
        content: ContentArgs,
    },

    /// Print the content of a fragment.
    Get {
        /// Fragment id.
        id: String,

        /// Write the content to a file instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Print a fragment converted to another format.
    Convert {
        /// Fragment id.
        id: String,

        /// Target extension, e.g. "html" or "png".
        ext: String,

        /// Write the content to a file instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Replace the content of a fragment.
    Update {
        /// Fragment id.
        id: String,

        #[command(flatten)]
        content: ContentArgs,
    },

    /// Delete a fragment.
    Delete {
        /// Fragment id.
        id: String,
    },

    /// List local and remote fragments.
    List {
        /// Print ids only.
        #[arg(long)]
        ids: bool,
    },

    /// Push pending fragments to the API.
    Sync,

    /// Show connectivity and pending fragments.
    Status,

    /// Keep probing the API and resync according to the configured mode.
    Watch,
}

/// Everything a command needs.
struct Session {
    config: ClientConfig,
    monitor: Arc<ConnectivityMonitor>,
    remote: Arc<HttpFragmentsClient>,
    coordinator: Arc<SyncCoordinator>,
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let session = connect(&cli).await?;

    match cli.command {
        Commands::Create { content } => cmd_create(&session, &content).await,

        Commands::Get { id, out } => cmd_get(&session, &id, out.as_deref()).await,

        Commands::Convert { id, ext, out } => {
            cmd_convert(&session, &id, &ext, out.as_deref()).await
        }

        Commands::Update { id, content } => cmd_update(&session, &id, &content).await,

        Commands::Delete { id } => cmd_delete(&session, &id).await,

        Commands::List { ids } => cmd_list(&session, ids).await,

        Commands::Sync => cmd_sync(&session).await,

        Commands::Status => cmd_status(&session).await,

        Commands::Watch => cmd_watch(&session).await,
    }
}

/// Load configuration, open the store and probe the API.
async fn connect(cli: &Cli) -> Result<Session> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    }
    .with_env_overrides();
    if let Some(url) = &cli.api_url {
        config = config.with_api_url(url);
    }
    config.validate().context("Invalid configuration")?;

    if config.store_backend == "sqlite" && config.store_config.is_null() {
        config.store_config = json!({ "path": default_db_path()? });
    }
    debug!("Using {} store: {}", config.store_backend, config.store_config);

    let store = create_default_registry()
        .resolve(&config.store_backend, config.store_config.clone())
        .context("Failed to create local store")?;

    let owner = OwnerId::new(cli.owner.clone()).context("Invalid owner")?;
    let auth: Arc<dyn AuthProvider> = match &cli.token {
        Some(token) => {
            let user = User::new(cli.owner.clone(), owner.clone(), token.clone())
                .context("Invalid token")?;
            Arc::new(StaticTokenAuth::new(user))
        }
        None => Arc::new(StaticTokenAuth::anonymous()),
    };

    let remote = Arc::new(
        HttpFragmentsClient::new(&config.api_url, auth).context("Failed to create API client")?,
    );

    let monitor = Arc::new(ConnectivityMonitor::offline());
    if !cli.offline && !monitor.probe(remote.as_ref()).await {
        warn!("API at {} is unreachable, working offline", config.api_url);
    }

    let coordinator = Arc::new(SyncCoordinator::new(
        store,
        remote.clone(),
        monitor.clone(),
        owner,
    ));

    Ok(Session {
        config,
        monitor,
        remote,
        coordinator,
        offline: cli.offline,
    })
}

fn default_db_path() -> Result<String> {
    let dir = dirs::data_dir().context("Could not determine data directory")?;
    Ok(dir
        .join("fragments")
        .join("fragments.db")
        .to_string_lossy()
        .into_owned())
}

/// Read content and its type from the arguments.
fn read_content(args: &ContentArgs) -> Result<FragmentContent> {
    let data = match (&args.file, &args.text) {
        (Some(path), _) => std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        (None, Some(text)) => text.clone().into_bytes(),
        (None, None) => anyhow::bail!("Either --file or --text is required"),
    };
    let content_type = resolve_content_type(args.content_type.as_deref(), args.file.as_deref())?;
    Ok(FragmentContent::new(content_type, data))
}

fn resolve_content_type(explicit: Option<&str>, file: Option<&Path>) -> Result<String> {
    if let Some(content_type) = explicit {
        return Ok(content_type.to_string());
    }
    match file {
        None => Ok("text/plain".to_string()),
        Some(path) => path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(type_for_extension)
            .map(str::to_string)
            .with_context(|| format!("Cannot infer type of {}, pass --type", path.display())),
    }
}

fn parse_id(id: &str) -> Result<FragmentId> {
    FragmentId::new(id).context("Invalid fragment id")
}

fn report<T>(done: &Completed<T>) {
    info!("Outcome: {}", done.outcome);
}

/// Write content to a file or stdout.
fn emit(content: &FragmentContent, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, &content.data)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(
                "Wrote {} bytes of {} to {}",
                content.data.len(),
                content.content_type,
                path.display()
            );
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&content.data)?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Create a fragment.
async fn cmd_create(session: &Session, args: &ContentArgs) -> Result<()> {
    let content = read_content(args)?;
    let done = session
        .coordinator
        .create(&content.content_type, content.data)
        .await
        .context("Failed to create fragment")?;
    report(&done);

    println!("{}", done.value.id);
    if done.outcome == Outcome::OfflineQueued {
        println!("Saved locally; run `fragments sync` once online.");
    }
    Ok(())
}

/// Print a fragment's content.
async fn cmd_get(session: &Session, id: &str, out: Option<&Path>) -> Result<()> {
    let id = parse_id(id)?;
    let done = session
        .coordinator
        .get(&id)
        .await
        .context("Failed to read fragment")?;
    report(&done);

    match done.value {
        Some(content) => emit(&content, out),
        None => anyhow::bail!("Fragment {} not found", id),
    }
}

/// Print a converted fragment.
async fn cmd_convert(session: &Session, id: &str, ext: &str, out: Option<&Path>) -> Result<()> {
    let id = parse_id(id)?;
    let done = session
        .coordinator
        .convert(&id, ext)
        .await
        .context("Failed to convert fragment")?;
    report(&done);

    match (done.value, done.outcome) {
        (Some(content), _) => emit(&content, out),
        (None, Outcome::ConversionUnavailable) => {
            anyhow::bail!("Converting {} to .{} needs the API; try again online", id, ext)
        }
        (None, _) => anyhow::bail!("Fragment {} not found", id),
    }
}

/// Replace a fragment's content.
async fn cmd_update(session: &Session, id: &str, args: &ContentArgs) -> Result<()> {
    let id = parse_id(id)?;
    let content = read_content(args)?;
    let done = session
        .coordinator
        .update(&id, &content.content_type, content.data)
        .await
        .context("Failed to update fragment")?;
    report(&done);

    match done.outcome {
        Outcome::NotFound => anyhow::bail!("Fragment {} not found", id),
        Outcome::OfflineQueued => println!("Updated {} locally; pending sync.", id),
        _ => println!("Updated {}", id),
    }
    Ok(())
}

/// Delete a fragment.
async fn cmd_delete(session: &Session, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let done = session
        .coordinator
        .delete(&id)
        .await
        .context("Failed to delete fragment")?;
    report(&done);

    match done.outcome {
        Outcome::OnlineSuccess => println!("Deleted {}", id),
        Outcome::NotFound => anyhow::bail!("Fragment {} not found", id),
        _ => println!("Deleted {} locally; the server copy was not removed.", id),
    }
    Ok(())
}

/// List fragments.
async fn cmd_list(session: &Session, ids_only: bool) -> Result<()> {
    let done = session
        .coordinator
        .list()
        .await
        .context("Failed to list fragments")?;
    report(&done);

    if done.value.is_empty() {
        println!("(no fragments)");
        return Ok(());
    }

    for record in &done.value {
        if ids_only {
            println!("{}", record.id);
        } else {
            println!(
                "{:<45} {:<20} {:>8}  {}{}",
                record.id,
                record.fragment_type,
                record.size,
                record.created.format("%Y-%m-%d %H:%M:%S"),
                if record.pending_sync { "  [pending]" } else { "" }
            );
        }
    }
    Ok(())
}

/// Push pending fragments.
async fn cmd_sync(session: &Session) -> Result<()> {
    if session.offline {
        warn!("--offline given, nothing will be pushed");
    }
    let done = session
        .coordinator
        .resync()
        .await
        .context("Failed to resync")?;
    report(&done);

    println!(
        "Synced {} fragment(s), {} failed ({:?})",
        done.value.synced, done.value.failed, done.value.duration
    );
    Ok(())
}

/// Show status.
async fn cmd_status(session: &Session) -> Result<()> {
    let pending = session
        .coordinator
        .pending_count()
        .await
        .context("Failed to read local store")?;

    println!("API:        {}", session.config.api_url);
    println!(
        "Status:     {}",
        if session.monitor.is_online() { "online" } else { "offline" }
    );
    println!("Owner:      {}", session.coordinator.owner());
    println!(
        "Store:      {} {}",
        session.config.store_backend, session.config.store_config
    );
    println!("Sync mode:  {:?}", session.config.sync_mode);
    println!("Pending:    {}", pending);
    Ok(())
}

/// Probe the API until Ctrl-C, resyncing as configured.
async fn cmd_watch(session: &Session) -> Result<()> {
    let (scheduler, handle) =
        SyncScheduler::new(session.config.sync_mode, session.monitor.subscribe());

    let coordinator = session.coordinator.clone();
    let task = tokio::spawn(handle.run(move || {
        let coordinator = coordinator.clone();
        async move { coordinator.resync().await.map(|done| done.value) }
    }));

    // Push what is already pending before waiting for changes.
    if session.monitor.is_online() {
        let report = scheduler.request_sync().await?;
        println!("Synced {} fragment(s), {} failed", report.synced, report.failed);
    }

    info!(
        "Watching {} every {:?} (Ctrl-C to stop)",
        session.config.api_url,
        session.config.probe_interval()
    );
    let mut ticker = tokio::time::interval(session.config.probe_interval());
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !session.offline {
                    session.monitor.probe(session.remote.as_ref()).await;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                break;
            }
        }
    }

    scheduler.shutdown().await;
    task.await.context("Sync scheduler panicked")?;
    info!("Stopped");
    Ok(())
}
