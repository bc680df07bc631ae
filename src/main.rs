mod app;
mod cache;
mod config;
mod documents;
mod logging;
#[cfg(test)]
mod test_support;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "docstash")]
#[command(about = "Browse school documents and keep copies for offline use")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/docstash/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Document API base URL, overrides api.url from the config file
  #[arg(long, env = "DOCSTASH_API_URL", global = true)]
  api_url: Option<String>,

  /// Never contact the network, serve cached and offline data only
  #[arg(long, global = true)]
  offline: bool,

  #[command(subcommand)]
  command: app::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Flushes buffered log lines when dropped at exit
  let _log_guard = logging::init(&config.cache.data_dir()?)?;

  let app = app::App::new(&config, args.api_url.as_deref(), args.offline)?;
  app.run(args.command).await?;

  Ok(())
}
