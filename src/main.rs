#![warn(missing_docs)]

//! `cub-scout` correlates live Kubernetes workloads with their GitOps deployers
//! and the ConfigHub hierarchy, surfacing drift, orphans, and configuration
//! findings with executable remedies

use anyhow::Result;
use clap::Parser;
use cub_scout::{Cli, Commands, create, import, map, remedy, scan, suggest, tree};
use tracing_log::AsTrace;
use tracing_subscriber::FmtSubscriber;

#[cfg(not(tarpaulin_include))]
#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  let subscriber = FmtSubscriber::builder()
    .with_max_level(cli.verbose.log_level_filter().as_trace())
    .without_time()
    .pretty()
    .finish();
  tracing::subscriber::set_global_default(subscriber).expect("Setting default subscriber failed");

  match cli.commands {
    Commands::Map(args) => map(args).await?,
    Commands::Suggest(args) => suggest(args).await?,
    Commands::Scan(args) => scan(args).await?,
    Commands::Remedy(args) => remedy(args).await?,
    Commands::Import(args) => import(args).await?,
    Commands::Tree(args) => tree(args).await?,
    Commands::Create(args) => create(args).await?,
  }

  Ok(())
}
