use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Builder, Env, Target};
use fss_server::e_config::ServerConfig;
use fss_server::g_server::Server;
use std::fs::OpenOptions;
use std::path::PathBuf;

/// Concurrent in-memory file storage server
#[derive(Parser, Debug)]
#[command(name = "fss-server", version, about)]
struct Args {
    /// Configuration file of KEY=VALUE lines
    #[arg(short = 'f', long = "config", value_name = "configfile")]
    config: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = ServerConfig::load(&args.config)
        .with_context(|| format!("cannot load {}", args.config.display()))?;

    let mut logger = Builder::from_env(Env::default().default_filter_or("info"));
    logger.format_timestamp_secs();
    if let Some(path) = &config.log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("cannot open log file {}", path.display()))?;
        logger.target(Target::Pipe(Box::new(file)));
    }
    logger.init();

    let server = Server::new(config).context("cannot create the storage")?;
    server.run().context("server stopped abnormally")?;
    Ok(())
}
