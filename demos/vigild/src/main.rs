//! The `vigil` storage appliance daemon.

use std::path::PathBuf;

use clap::Parser;
use tracing::{Level, info};

use vigil_os::{Config, Vault};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory exposed as the storage root.
    #[arg(long)]
    root: Option<PathBuf>,

    /// Control channel port.
    #[arg(long)]
    control_port: Option<u16>,

    /// Data channel port.
    #[arg(long)]
    data_port: Option<u16>,

    /// Increases verbosity, up to -vv.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    const fn level(&self) -> Level {
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }

    fn config(&self) -> Result<Config, vigil_os::error::Error> {
        let mut config = match &self.config {
            Some(path) => Config::from_file(path)?,
            None => Config::default(),
        };

        if let Some(root) = &self.root {
            config = config.storage_root(root);
        }
        if let Some(port) = self.control_port {
            config = config.control_port(port);
        }
        if let Some(port) = self.data_port {
            config = config.data_port(port);
        }
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.level()).init();

    let config = cli.config()?;
    let vault = Vault::from_config(config)?.start()?;
    info!("Control channel listening on port {}", vault.control_port());

    tokio::signal::ctrl_c().await?;

    vault.shutdown();
    Ok(())
}
