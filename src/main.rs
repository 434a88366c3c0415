use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hindsight::builder::IndexBuilder;
use hindsight::config::{Settings, DEFAULT_CONFIG_PATH};
use hindsight::enrich::{EnrichOptions, MetadataScraper};
use hindsight::history;
use hindsight::manager::SystemProfile;
use hindsight::provider::OpenAiEmbeddings;
use hindsight::server::HindsightServer;
use hindsight::storage::RecordStore;
use hindsight::Hindsight;

#[derive(Parser, Clone, Debug)]
#[clap(author, version, about = "Ask questions about your browsing history", long_about = None)]
struct Args {
    #[clap(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Clone, Debug)]
enum Command {
    /// Copy Chrome's browsing history into the record store
    ImportHistory {
        /// Chrome `History` database (defaults to the standard Linux profile)
        #[clap(long)]
        chrome_db: Option<PathBuf>,
    },
    /// Fetch each stored page and save its title and description
    Enrich {
        #[clap(long)]
        max_urls: Option<usize>,

        #[clap(long, default_value = "2000")]
        delay_ms: u64,
    },
    /// Embed every record and write the vector index
    BuildIndex {
        #[clap(long)]
        batch_size: Option<usize>,
    },
    /// Serve the query API
    Serve {
        #[clap(long)]
        addr: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let profile = SystemProfile::detect();

    println!("--- [Hindsight Resource Manager] ---");
    println!("Detected Cores: {}", profile.logical_cores);
    println!("Worker Threads: {}", profile.worker_threads);
    println!("Embedding Batches In Flight: {}", profile.embed_concurrency);
    println!("------------------------------------");

    tokio::runtime::Builder::new_multi_thread()
    .worker_threads(profile.worker_threads)
    .enable_all()
    .build()
    .context("failed to start tokio runtime")?
    .block_on(async_main(profile))
}

async fn async_main(profile: SystemProfile) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
    .unwrap_or_else(|_| EnvFilter::new("info,hindsight=info"));
    tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .with_level(true)
    .init();

    let args = Args::parse();
    let settings = Settings::load(&args.config)
    .with_context(|| format!("loading settings from {}", args.config.display()))?;

    match args.command {
        Command::ImportHistory { chrome_db } => {
            let chrome_db = chrome_db
            .or_else(history::default_chrome_history_path)
            .context("no home directory; pass --chrome-db")?;
            let store = RecordStore::open(&settings.db_path)?;
            let written = history::import_history(&chrome_db, &store)?;
            println!("Stored {} entries in {}", written, settings.db_path.display());
        }

        Command::Enrich { max_urls, delay_ms } => {
            let store = Arc::new(RecordStore::open(&settings.db_path)?);
            let options = EnrichOptions {
                request_delay: Duration::from_millis(delay_ms),
                max_urls,
                ..EnrichOptions::default()
            };
            let updated = MetadataScraper::new(store, options)?.process_urls().await?;
            println!("Updated metadata for {} pages", updated);
        }

        Command::BuildIndex { batch_size } => {
            let provider = settings.provider_config()?;
            let store = Arc::new(RecordStore::open(&settings.db_path)?);
            let embedder = Arc::new(OpenAiEmbeddings::new(&provider)?);

            let built = IndexBuilder::new(store, embedder, batch_size.unwrap_or(settings.batch_size))
            .with_concurrency(profile.embed_concurrency)
            .build_index(&settings.index_path)
            .await?;
            println!(
                "Indexed {} records ({}-d) into {}",
                built.index.len(),
                built.index.dimension(),
                settings.index_path.display()
            );
        }

        Command::Serve { addr } => {
            let addr: SocketAddr = addr
            .unwrap_or_else(|| settings.listen_addr.clone())
            .parse()
            .context("invalid listen address")?;

            println!("Initializing Query Pipeline...");
            let engine = Arc::new(Hindsight::open(&settings)?);
            println!("{:?}", engine);

            let server = HindsightServer::new(engine, settings.allowed_origin.clone());
            tokio::select! {
                _ = server.run(addr) => {}
                _ = tokio::signal::ctrl_c() => println!("Shutting down."),
            }
        }
    }

    Ok(())
}
