use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use peerbook_addrbook::{AddressBook, MAX_SAVE_INTERVAL};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod settings;
mod version;

use settings::{split_list, NodeConfig};
use version::{git_commit_hash, PEERBOOK_VERSION};

fn build_cli() -> Command {
    Command::new("peerbook-node")
        .version(PEERBOOK_VERSION)
        .about("Peer address book node")
        .disable_version_flag(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("data-dir")
                .short('d')
                .long("data-dir")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .help("Data directory"),
        )
        .arg(
            Arg::new("addrbook-file")
                .long("addrbook-file")
                .value_name("FILE")
                .help("Address book snapshot file, relative to the data directory"),
        )
        .arg(
            Arg::new("save-interval")
                .long("save-interval")
                .value_name("SECS")
                .value_parser(value_parser!(u64).range(1..=MAX_SAVE_INTERVAL.as_secs()))
                .help("Seconds between background address book snapshots"),
        )
        .arg(
            Arg::new("listen")
                .long("listen")
                .value_name("ADDR")
                .help("Own listening addresses, comma separated"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("ADDR")
                .help("Seed peer addresses, comma separated"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("Log format (pretty or json)"),
        )
        .arg(
            Arg::new("version_flag")
                .short('V')
                .long("version")
                .action(ArgAction::SetTrue)
                .help("Print detailed version information and exit"),
        )
}

fn load_config_with_overrides(matches: &ArgMatches) -> Result<NodeConfig> {
    let config_path = matches.get_one::<PathBuf>("config").map(PathBuf::as_path);
    let mut config = NodeConfig::load(config_path)?;
    apply_overrides(matches, &mut config);
    Ok(config)
}

fn apply_overrides(matches: &ArgMatches, config: &mut NodeConfig) {
    if let Some(data_dir) = matches.get_one::<PathBuf>("data-dir") {
        config.data_dir = data_dir.clone();
    }

    if let Some(file) = matches.get_one::<String>("addrbook-file") {
        config.addrbook_file = file.clone();
    }

    if let Some(secs) = matches.get_one::<u64>("save-interval") {
        config.save_interval = Duration::from_secs(*secs);
    }

    if let Some(listen) = matches.get_one::<String>("listen") {
        config.listen_addresses = split_list(listen);
    }

    if let Some(seed) = matches.get_one::<String>("seed") {
        config.seed_peers = split_list(seed);
    }

    if let Some(log_level) = matches.get_one::<String>("log-level") {
        config.log_level = log_level.clone();
    }

    if let Some(log_format) = matches.get_one::<String>("log-format") {
        config.log_format = log_format.clone();
    }
}

fn init_logging(config: &NodeConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    if matches.get_flag("version_flag") {
        println!("peerbook-node {} ({})", PEERBOOK_VERSION, git_commit_hash());
        return Ok(());
    }

    let config = load_config_with_overrides(&matches)?;
    init_logging(&config)?;

    info!(
        version = PEERBOOK_VERSION,
        commit = git_commit_hash(),
        data_dir = %config.data_dir.display(),
        "Starting peerbook node"
    );

    // A corrupt snapshot aborts startup here.
    let book = AddressBook::open(config.addrbook_config()).with_context(|| {
        format!(
            "refusing to start with unreadable address book {}",
            config.addrbook_path().display()
        )
    })?;

    if let Err(err) = book.require_identity_key() {
        warn!("{}; identity-dependent handshakes are unavailable", err);
    }

    for endpoint in config.listen_endpoints() {
        book.add_our_address(endpoint);
    }
    for endpoint in config.seed_endpoints() {
        book.add_address(endpoint);
    }

    info!(
        peers = book.size(),
        dial_candidates = book.get_addrs().len(),
        "Address book ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("wait for shutdown signal")?;
    info!("Shutdown requested");

    book.stop().await;
    info!("Peerbook node stopped");
    Ok(())
}
