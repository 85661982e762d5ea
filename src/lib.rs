pub mod app;
pub mod ccve;
pub mod config;
pub mod correlate;
pub mod gateway;
pub mod hierarchy;
pub mod import;
pub mod k8s;
pub mod output;
pub mod ownership;
pub mod plan;
pub mod remedy;
pub mod snapshot;
pub mod suggest;

use std::{env, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use clap_verbosity_flag::Verbosity;
use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};

use crate::gateway::{ClusterClient, CubCli, DynamicClusterClient, HubClient};

fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Cyan))),
    )
    .literal(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::BrightGreen))),
    )
    .usage(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Cyan))),
    )
    .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::BrightBlue))))
}

#[derive(Parser, Debug)]
#[command(author, about, version)]
#[command(propagate_version = true)]
#[command(styles=get_styles())]
pub struct Cli {
  #[command(subcommand)]
  pub commands: Commands,

  #[clap(flatten)]
  pub verbose: Verbosity,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
  Map(MapArgs),
  Suggest(SuggestArgs),
  Scan(ScanArgs),
  #[command(arg_required_else_help = true)]
  Remedy(RemedyArgs),
  #[command(arg_required_else_help = true)]
  Import(ImportArgs),
  Tree(TreeArgs),
  #[command(arg_required_else_help = true)]
  Create(CreateArgs),
}

/// Map live workloads to their GitOps deployers and ConfigHub units
#[derive(Args, Debug, Serialize, Deserialize)]
pub struct MapArgs {
  /// The kube context to scan (defaults to the current context)
  #[arg(short, long)]
  pub context: Option<String>,

  /// Limit the map to a single namespace
  #[arg(short, long)]
  pub namespace: Option<String>,

  #[arg(short, long, value_enum, default_value_t)]
  pub format: output::Format,

  /// Write to file instead of stdout
  #[arg(short, long)]
  pub output: Option<String>,

  /// Only show workloads not managed by any deployer or the Hub
  #[arg(long)]
  pub orphans_only: bool,
}

/// Propose ConfigHub units for unmanaged workloads
#[derive(Args, Debug, Serialize, Deserialize)]
pub struct SuggestArgs {
  /// The kube context to scan (defaults to the current context)
  #[arg(short, long)]
  pub context: Option<String>,

  /// Limit suggestions to a single namespace
  #[arg(short, long)]
  pub namespace: Option<String>,

  /// The app space name to propose units under
  #[arg(short, long, default_value = "apps")]
  pub space: String,

  #[arg(short, long, value_enum, default_value_t)]
  pub format: output::Format,

  /// Write to file instead of stdout
  #[arg(short, long)]
  pub output: Option<String>,
}

/// Scan a manifest file or the live cluster for configuration findings
#[derive(Args, Debug, Serialize, Deserialize)]
pub struct ScanArgs {
  /// Scan a manifest file instead of the live cluster
  #[arg(long)]
  pub file: Option<String>,

  /// The kube context to scan (defaults to the current context)
  #[arg(short, long)]
  pub context: Option<String>,

  /// Directory of CCVE catalog files (defaults to the embedded catalog)
  #[arg(long)]
  pub catalog: Option<String>,

  /// Path to the scout configuration file
  #[arg(long)]
  pub config: Option<String>,

  #[arg(short, long, value_enum, default_value_t)]
  pub format: output::Format,

  /// Write to file instead of stdout
  #[arg(short, long)]
  pub output: Option<String>,
}

/// Plan and execute a remedy for a configuration finding
#[derive(Args, Debug, Serialize, Deserialize)]
pub struct RemedyArgs {
  /// The CCVE id of the finding to remediate
  #[arg(long)]
  pub ccve: String,

  /// Namespace of the affected resource
  #[arg(short, long)]
  pub namespace: Option<String>,

  /// Affected resource as kind/name
  #[arg(short, long)]
  pub resource: Option<String>,

  /// The kube context to remediate against (defaults to the current context)
  #[arg(short, long)]
  pub context: Option<String>,

  /// Directory of CCVE catalog files (defaults to the embedded catalog)
  #[arg(long)]
  pub catalog: Option<String>,

  /// Show the plan and log the attempt without mutating the cluster
  #[arg(long)]
  pub dry_run: bool,

  /// Execute high-risk remedies without confirmation
  #[arg(long)]
  pub force: bool,

  /// Per-action timeout in seconds
  #[arg(long, default_value_t = 30)]
  pub timeout: u64,
}

/// Import workloads from the cluster or an ArgoCD application into ConfigHub
#[derive(Args, Debug, Serialize, Deserialize)]
pub struct ImportArgs {
  /// Import source
  #[arg(long, value_enum, default_value_t)]
  pub source: import::ImportSource,

  /// Namespace to import from (Kubernetes source)
  #[arg(short, long)]
  pub namespace: Option<String>,

  /// ArgoCD application to import (ArgoCD source)
  #[arg(long)]
  pub app: Option<String>,

  /// The space to import into (created when absent)
  #[arg(short, long)]
  pub space: String,

  /// Worker name to create or reuse
  #[arg(short, long, default_value = "scout-worker")]
  pub worker: String,

  /// Create one combined unit per ArgoCD application instead of one per workload
  #[arg(long)]
  pub combine: bool,

  /// What to do with the ArgoCD application once its resources are imported
  #[arg(long, value_enum, default_value_t)]
  pub cleanup: import::ArgoCleanupChoice,

  /// Rollout-restart imported units to validate the pipeline end to end
  #[arg(long)]
  pub test: bool,

  /// The kube context to import from (defaults to the current context)
  #[arg(short, long)]
  pub context: Option<String>,
}

/// Print the ConfigHub hierarchy as a navigable tree
#[derive(Args, Debug, Serialize, Deserialize)]
pub struct TreeArgs {
  /// Filter nodes by name or info substring
  #[arg(long)]
  pub filter: Option<String>,

  /// Partition spaces into Hub and App groups
  #[arg(long)]
  pub hub_view: bool,

  /// Ignore the saved session snapshot
  #[arg(long)]
  pub no_snapshot: bool,

  /// Also open the ConfigHub dashboard in a browser
  #[arg(long)]
  pub open: bool,
}

/// Create artifacts from scan and suggestion data
#[derive(Args, Debug, Serialize, Deserialize)]
pub struct CreateArgs {
  #[command(subcommand)]
  pub command: CreateCommands,
}

#[derive(Debug, Subcommand, Serialize, Deserialize)]
pub enum CreateCommands {
  #[command(arg_required_else_help = true)]
  Plan(PlanArgs),
}

/// Render an import plan for unmanaged workloads as markdown
#[derive(Args, Debug, Serialize, Deserialize)]
pub struct PlanArgs {
  /// The kube context to scan (defaults to the current context)
  #[arg(short, long)]
  pub context: Option<String>,

  /// Limit the plan to a single namespace
  #[arg(short, long)]
  pub namespace: Option<String>,

  /// The app space name to propose units under
  #[arg(short, long, default_value = "apps")]
  pub space: String,

  /// Name of the plan saved locally
  #[arg(short, long)]
  pub filename: Option<String>,
}

/// Derive the cluster name, honoring the `CLUSTER_NAME` override
fn cluster_name(client: &DynamicClusterClient) -> String {
  env::var("CLUSTER_NAME").unwrap_or_else(|_| client.context_name())
}

async fn scan_with_spinner(client: &DynamicClusterClient, namespace: Option<&str>) -> Result<k8s::ClusterScan> {
  let spinner = ProgressBar::new_spinner();
  spinner.set_message("Scanning cluster");
  spinner.enable_steady_tick(Duration::from_millis(120));

  let name = cluster_name(client);
  let scan = k8s::scan_cluster(client, &name, namespace).await;
  spinner.finish_and_clear();

  scan
}

pub async fn map(args: MapArgs) -> Result<()> {
  let client = DynamicClusterClient::connect(args.context.as_deref()).await?;
  let scan = scan_with_spinner(&client, args.namespace.as_deref()).await?;

  // The Hub is optional for mapping; without it, every workload correlates to nothing
  let hub = CubCli::default();
  let units = match hub.context_get().await {
    Ok(ctx) => hub.unit_list(&ctx.space).await.unwrap_or_default(),
    Err(err) => {
      tracing::warn!("Hub unavailable, mapping without unit correlation: {err}");
      Vec::new()
    }
  };

  let report = correlate::correlate(&units, &scan.entries);
  let out = match args.format {
    output::Format::Json => serde_json::to_string_pretty(&report)?,
    output::Format::Text => {
      if args.orphans_only {
        correlate::orphans_table(&report.orphans)
      } else {
        let mut text = String::new();
        text.push_str(&k8s::workloads_table(&scan.entries));
        text.push_str(&k8s::gitops_table(&scan.gitops));
        text.push_str(&k8s::sources_table(&scan.sources));
        text.push_str(&correlate::correlation_table(&report));
        text.push_str(&correlate::orphans_table(&report.orphans));
        text.push_str(&correlate::drift_table(&report.drift));
        text
      }
    }
  };

  output::write(&out, &args.output)
}

pub async fn suggest(args: SuggestArgs) -> Result<()> {
  let client = DynamicClusterClient::connect(args.context.as_deref()).await?;
  let scan = scan_with_spinner(&client, args.namespace.as_deref()).await?;

  let cfg = config::load(None)?;
  let unmanaged = suggest::unmanaged_workloads(&scan.entries, &cfg.excluded_namespaces);
  let proposal = suggest::propose(&args.space, &unmanaged);

  let out = match args.format {
    output::Format::Json => serde_json::to_string_pretty(&proposal)?,
    output::Format::Text => suggest::proposal_table(&proposal),
  };

  output::write(&out, &args.output)
}

pub async fn scan(args: ScanArgs) -> Result<()> {
  let cfg = config::load(args.config.as_deref())?;
  let registry = ccve::Registry::load(args.catalog.as_deref())?;

  let findings = match &args.file {
    Some(file) => ccve::scanner::scan_file(&registry, file)?,
    None => {
      let client = DynamicClusterClient::connect(args.context.as_deref()).await?;
      let spinner = ProgressBar::new_spinner();
      spinner.set_message("Scanning cluster for findings");
      spinner.enable_steady_tick(Duration::from_millis(120));
      let findings = ccve::scanner::scan_cluster(&registry, &client).await?;
      spinner.finish_and_clear();
      findings
    }
  };

  let findings: Vec<_> = findings
    .into_iter()
    .filter(|f| !cfg.ignored_ccves.contains(&f.ccve_id))
    .collect();

  let out = match args.format {
    output::Format::Json => serde_json::to_string_pretty(&findings)?,
    output::Format::Text => ccve::report::findings_table(&findings),
  };

  output::write(&out, &args.output)
}

pub async fn remedy(args: RemedyArgs) -> Result<()> {
  let registry = ccve::Registry::load(args.catalog.as_deref())?;
  let client = DynamicClusterClient::connect(args.context.as_deref()).await?;

  let resource = match &args.resource {
    Some(raw) => {
      let (kind, name) = raw
        .split_once('/')
        .with_context(|| format!("Invalid resource '{raw}', expected kind/name"))?;
      Some(ccve::ResourceRef {
        kind: kind.to_string(),
        name: name.to_string(),
      })
    }
    None => None,
  };

  let finding = registry.finding_for(&args.ccve, args.namespace.clone(), resource)?;
  let audit = remedy::AuditLog::default();
  let opts = remedy::ExecuteOpts {
    dry_run: args.dry_run,
    force: args.force,
    timeout: Duration::from_secs(args.timeout),
  };

  let result = remedy::execute(&finding, &registry, &client, &opts, &audit).await?;
  println!("{}", remedy::result_summary(&result));

  if !result.success {
    bail!("Remediation of {} failed: {}", args.ccve, result.message);
  }

  Ok(())
}

pub async fn import(args: ImportArgs) -> Result<()> {
  let client = DynamicClusterClient::connect(args.context.as_deref()).await?;
  let hub = CubCli::default();

  // The completion cache also backs namespace validation here
  if let Some(namespace) = &args.namespace {
    let cache = gateway::NamespaceCache::new();
    let namespaces = cache.get(&client).await;
    if !namespaces.is_empty() && !namespaces.contains(namespace) {
      tracing::warn!("namespace '{namespace}' not seen in the cluster; discovery may come up empty");
    }
  }

  let opts = import::ImportOptions {
    source: args.source,
    namespace: args.namespace,
    app: args.app,
    space: args.space,
    worker: args.worker,
    combine: args.combine,
    cleanup: args.cleanup,
    test: args.test,
    context: client.context_name(),
  };

  let outcome = import::run_import(opts, &hub, &client).await?;
  println!("{}", outcome.summary());

  Ok(())
}

pub async fn tree(args: TreeArgs) -> Result<()> {
  let hub = CubCli::default();
  let mut model = hierarchy::Model::new();
  model.hub_view = args.hub_view;

  let restored = if args.no_snapshot {
    None
  } else {
    snapshot::load(snapshot::SnapshotKind::Hub)
  };

  app::load_hierarchy(&mut model, &hub).await?;

  if let Some(snap) = restored {
    model.restore(&snap);
  }
  if let Some(filter) = args.filter {
    model.set_filter(Some(filter));
  }
  model.rebuild_flat_list();

  println!("{}", model.render_flat());

  if args.open {
    gateway::open_browser("https://hub.confighub.com");
  }

  // best-effort: losing the session snapshot only costs cursor state
  let _ = snapshot::save(snapshot::SnapshotKind::Hub, &model.to_snapshot());

  Ok(())
}

pub async fn create(args: CreateArgs) -> Result<()> {
  match args.command {
    CreateCommands::Plan(plan_args) => {
      let client = DynamicClusterClient::connect(plan_args.context.as_deref()).await?;
      let scan = scan_with_spinner(&client, plan_args.namespace.as_deref()).await?;

      let cfg = config::load(None)?;
      let unmanaged = suggest::unmanaged_workloads(&scan.entries, &cfg.excluded_namespaces);
      let proposal = suggest::propose(&plan_args.space, &unmanaged);

      plan::create(&plan_args, &scan.cluster, &proposal)?;
    }
  }

  Ok(())
}
