//! carmanode - CARMA relay node
//!
//! Runs the maintenance loop over a CARMA configuration directory and offers
//! a few offline operations on it.

use anyhow::{Context, Result};
use carma_phonebook::{FsStorage, Storage};
use carma_protocol::{ChannelId, LinkAddress};
use carmanode::logging::init_logging;
use carmanode::{Config, Maintenance, Node, NodeSettings, QueueTransport};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "carmanode")]
#[command(author, version, about = "CARMA anonymity relay node", long_about = None)]
struct Cli {
    /// Settings file
    #[arg(short, long, env = "CARMANODE_SETTINGS", default_value = "carmanode.yaml")]
    settings: PathBuf,

    /// CARMA configuration directory (overrides the settings file)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Keep the configuration maintained until interrupted
    Run,

    /// Print this node's identity and relationship sets
    Show,

    /// Rewrite the configuration directory
    Flush {
        /// Write the phonebook as a single packed file
        #[arg(long)]
        pack: bool,
    },

    /// Stage a configuration for a node joining through this one
    Bootstrap {
        /// Name of the staged configuration, next to the current one
        name: String,

        #[arg(long)]
        channel_id: String,

        #[arg(long)]
        link_address: String,
    },
}

/// Storage rooted at the parent of `config_dir`, and the logical name of
/// `config_dir` inside it, so staged configurations land next to it
fn open_storage(config_dir: &Path) -> Result<(Arc<dyn Storage>, String)> {
    let name = config_dir
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("Invalid configuration directory {}", config_dir.display()))?;
    let root = match config_dir.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let storage: Arc<dyn Storage> = Arc::new(FsStorage::new(root));
    Ok((storage, name.to_string()))
}

fn load_config(settings: &NodeSettings) -> Result<Config> {
    let (storage, dir) = open_storage(&settings.config_dir)?;
    let config = Config::load(storage, &dir).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            settings.config_dir.display()
        )
    })?;
    Ok(match settings.max_resident_records {
        Some(max) => config.with_max_resident(max),
        None => config,
    })
}

async fn run(settings: NodeSettings) -> Result<()> {
    carma_crypto::init().context("Failed to initialize libsodium")?;
    let config = load_config(&settings)?;
    let node = Arc::new(
        Node::new(config, Arc::new(QueueTransport::new()))
            .with_pack_on_flush(settings.pack_on_flush),
    );

    info!("Starting CARMA node {}", node.psn());
    let maintenance = Maintenance::spawn(
        node.clone(),
        Duration::from_secs(settings.maintenance_interval_secs),
    );

    signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received Ctrl+C signal");

    maintenance
        .shutdown()
        .await
        .context("Maintenance task failed")?;
    node.shutdown().context("Final flush failed")?;
    info!("Shutdown complete");
    Ok(())
}

fn show(settings: &NodeSettings) -> Result<()> {
    let config = load_config(settings)?;
    let local = &config.local;
    println!("psn:        {}", local.psn());
    println!("role:       {}", local.role());
    println!("public key: {}", hex::encode(&local.record.public_key));
    println!("peers:      {}", config.phonebook().len());
    if let Some(bootstrap) = &config.bootstrap {
        println!(
            "bootstrap:  via {} on {}",
            bootstrap.bootstrapper, bootstrap.channel_id
        );
        return Ok(());
    }

    let topology = config.topology();
    let names = |set: &carma_phonebook::PeerSet| {
        set.iter()
            .map(|peer| peer.psn().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    };
    println!("tx_nodes:   {}", names(&*topology.tx_nodes()?));
    println!("rx_nodes:   {}", names(&*topology.rx_nodes()?));
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = NodeSettings::load(&cli.settings)?;
    if let Some(config_dir) = cli.config_dir {
        settings.config_dir = config_dir;
    }
    init_logging(&settings.log_level)?;

    match cli.command {
        Commands::Run => run(settings).await,
        Commands::Show => show(&settings),
        Commands::Flush { pack } => {
            load_config(&settings)?.flush(pack)?;
            info!("Flushed {}", settings.config_dir.display());
            Ok(())
        }
        Commands::Bootstrap {
            name,
            channel_id,
            link_address,
        } => {
            let config = load_config(&settings)?;
            config.prepare_to_bootstrap(
                &name,
                ChannelId(channel_id),
                LinkAddress(link_address),
            )?;
            Ok(())
        }
    }
}
