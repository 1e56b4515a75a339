//! LiveGraph command-line entry point

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use livegraph::{
    adapters,
    config::{Config, LogFormat, LoggingConfig},
    crawl::{CrawlScheduler, SnapshotSink},
    engines::EngineSupervisor,
    publish::Publisher,
    server::HttpServer,
};

/// Grace period for draining a running engine on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "livegraph")]
#[command(about = "Hierarchical web-crawl aggregator feeding a live graph visualization")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "livegraph.toml")]
    config: PathBuf,

    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the control plane and mirror watcher
    Serve {
        /// Listen address override, host:port
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// One-shot HTTP crawl publishing through the normal pipeline
    Crawl {
        /// Seed URL
        url: String,

        /// Maximum crawl depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// Maximum accepted links per page
        #[arg(long)]
        max_links: Option<usize>,

        /// Publish only the final snapshot
        #[arg(long)]
        no_progressive: bool,
    },

    /// Convert an engine artifact into a canonical document
    Convert {
        /// OnionSearch CSV artifact
        #[arg(long)]
        search_csv: Option<PathBuf>,

        /// Search query the CSV answers (used with --search-csv)
        #[arg(long, default_value = "")]
        query: String,

        /// Recursive tree JSON artifact
        #[arg(long)]
        tree: Option<PathBuf>,

        /// TorBot OSINT JSON artifact
        #[arg(long)]
        osint: Option<PathBuf>,

        /// Starting URL for the OSINT artifact
        #[arg(long)]
        url: Option<String>,

        /// Output document path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Force one mirror pass and print the sync status
    Sync,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::load(&cli.config)?
    } else {
        Config::default()
    };

    init_tracing(&config.logging, cli.verbose);

    match cli.command {
        Commands::Serve { listen } => serve(config, listen).await,
        Commands::Crawl {
            url,
            max_depth,
            max_links,
            no_progressive,
        } => crawl(config, url, max_depth, max_links, no_progressive).await,
        Commands::Convert {
            search_csv,
            query,
            tree,
            osint,
            url,
            output,
        } => convert(search_csv, query, tree, osint, url, output),
        Commands::Sync => sync(config),
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: u8) {
    let directive = if verbose > 0 {
        "livegraph=debug".to_string()
    } else {
        logging.directive()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    match logging.format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
    }
}

async fn serve(mut config: Config, listen: Option<String>) -> Result<()> {
    if let Some(listen) = listen {
        config.http.listen_addr = listen;
    }

    let publisher = Arc::new(Publisher::new(
        config.publish.primary.clone(),
        config.publish.mirror.clone(),
    ));

    // Make sure the visualizer has a document to poll from the first second.
    if publisher.primary_path().exists() {
        publisher.sync_now().context("initial mirror sync failed")?;
    } else {
        publisher.reset().context("failed to seed empty document")?;
    }

    let supervisor = Arc::new(EngineSupervisor::new(config.clone(), Arc::clone(&publisher)));
    let (shutdown_tx, _) = broadcast::channel::<()>(8);

    let watch_interval = config.publish.watch_interval();
    let watch_publisher = Arc::clone(&publisher);
    let watch_shutdown = shutdown_tx.subscribe();
    tokio::spawn(async move {
        watch_publisher.watch(watch_interval, watch_shutdown).await;
    });

    let server = HttpServer::new(config.http.clone(), Arc::clone(&supervisor));
    let server_shutdown = shutdown_tx.subscribe();
    let server_handle = tokio::spawn(async move { server.run(server_shutdown).await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, shutting down");
        }
        _ = wait_for_sigterm() => {
            info!("received SIGTERM, shutting down");
        }
    }

    supervisor.shutdown(SHUTDOWN_GRACE).await;
    let _ = shutdown_tx.send(());

    let abort = server_handle.abort_handle();
    match tokio::time::timeout(SHUTDOWN_GRACE, server_handle).await {
        Ok(joined) => joined.context("server task panicked")??,
        Err(_) => {
            warn!("HTTP server did not shut down within {SHUTDOWN_GRACE:?}, aborting");
            abort.abort();
        }
    }

    Ok(())
}

async fn crawl(
    config: Config,
    url: String,
    max_depth: Option<usize>,
    max_links: Option<usize>,
    no_progressive: bool,
) -> Result<()> {
    let crawler_cfg =
        config
            .crawler
            .with_overrides(max_depth, max_links, Some(!no_progressive));

    let publisher = Arc::new(Publisher::new(
        config.publish.primary.clone(),
        config.publish.mirror.clone(),
    ));
    publisher.reset().context("failed to reset documents")?;

    let sink: Arc<dyn SnapshotSink> = Arc::clone(&publisher) as Arc<dyn SnapshotSink>;
    let scheduler = Arc::new(
        CrawlScheduler::new(&url, crawler_cfg, Some(sink)).context("failed to start crawl")?,
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let mut run = tokio::spawn(Arc::clone(&scheduler).run(cancel_rx));

    let tree = tokio::select! {
        finished = &mut run => finished.context("crawl task panicked")?,
        _ = tokio::signal::ctrl_c() => {
            info!("received Ctrl+C, cancelling crawl");
            let _ = cancel_tx.send(true);
            run.await.context("crawl task panicked")?
        }
    };

    println!(
        "Crawled {} nodes; document written to {}",
        tree.count(),
        config.publish.primary.display()
    );
    Ok(())
}

fn convert(
    search_csv: Option<PathBuf>,
    query: String,
    tree: Option<PathBuf>,
    osint: Option<PathBuf>,
    url: Option<String>,
    output: PathBuf,
) -> Result<()> {
    let document = if let Some(path) = search_csv {
        let file = File::open(&path).with_context(|| format!("cannot open {}", path.display()))?;
        adapters::convert_search_csv(&query, file)?
    } else if let Some(path) = tree {
        let file = File::open(&path).with_context(|| format!("cannot open {}", path.display()))?;
        adapters::convert_tree_json(file)?
    } else if let Some(path) = osint {
        let file = File::open(&path).with_context(|| format!("cannot open {}", path.display()))?;
        let starting_url = url.unwrap_or_default();
        let (tree, stats) = adapters::convert_osint_json(&starting_url, file)?;
        info!(
            "converted OSINT artifact: {} links, {} emails, {} phones",
            stats.links, stats.emails, stats.phones
        );
        tree
    } else {
        bail!("specify one of --search-csv, --tree, or --osint");
    };

    let bytes = serde_json::to_vec_pretty(&document)?;
    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&output, bytes)
        .with_context(|| format!("cannot write {}", output.display()))?;

    println!(
        "Converted {} nodes; document written to {}",
        document.count(),
        output.display()
    );
    Ok(())
}

fn sync(config: Config) -> Result<()> {
    let publisher = Publisher::new(config.publish.primary, config.publish.mirror);
    let status = publisher.sync_now().context("mirror sync failed")?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            warn!("failed to register SIGTERM handler: {e}");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    std::future::pending::<()>().await
}
