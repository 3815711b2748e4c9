use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use ngsitool_core::Dialect;
use ngsitool_core::client::{BrokerClient, HttpBrokerClient};
use ngsitool_core::config::{BrokerOverrides, ToolConfig, load_config};
use ngsitool_core::migrate::{JobOptions, copy_entities, remove_entities};
use ngsitool_core::runtime::{current_dir, resolve_config_path};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "ngsitool",
    version,
    about = "Bulk copy and remove entities on NGSI context brokers"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Log requests and pages to stderr")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(visible_alias = "cp", about = "Copy every entity of a type between brokers")]
    Copy(CopyArgs),
    #[command(visible_alias = "rm", about = "Remove every entity of a type from a broker")]
    Remove(RemoveArgs),
}

#[derive(Debug, Args)]
#[command(disable_help_flag = true)]
struct CopyArgs {
    #[arg(short = 'h', long, value_name = "ALIAS|URL", help = "Source broker")]
    host: String,
    #[arg(short = 'd', long, value_name = "ALIAS|URL", help = "Destination broker")]
    host2: String,
    #[arg(short = 't', long = "type", value_name = "TYPE[,TYPE...]")]
    entity_type: String,
    #[arg(long, help = "Perform the copy; without it only the count is shown")]
    run: bool,
    #[arg(long = "ngsi-v1", help = "Use the legacy API of flat-JSON brokers")]
    ngsi_v1: bool,
    #[arg(long, help = "Ask the source broker not to forward the query")]
    skip_forwarding: bool,
    #[arg(short = 'L', long, value_name = "URL", help = "@context used to list a linked-data source")]
    link: Option<String>,
    #[arg(long, value_name = "URL", help = "@context for entities created on a linked-data destination")]
    context2: Option<String>,
    #[arg(long, value_name = "DIALECT")]
    dialect: Option<Dialect>,
    #[arg(long, value_name = "DIALECT")]
    dialect2: Option<Dialect>,
    #[arg(long)]
    tenant: Option<String>,
    #[arg(long)]
    scope: Option<String>,
    #[arg(long)]
    tenant2: Option<String>,
    #[arg(long)]
    scope2: Option<String>,
    #[arg(long)]
    token: Option<String>,
    #[arg(long)]
    token2: Option<String>,
    #[arg(long = "help", action = ArgAction::Help, help = "Print help")]
    _help: Option<bool>,
}

#[derive(Debug, Args)]
#[command(disable_help_flag = true)]
struct RemoveArgs {
    #[arg(short = 'h', long, value_name = "ALIAS|URL", help = "Broker to remove from")]
    host: String,
    #[arg(short = 't', long = "type", value_name = "TYPE[,TYPE...]")]
    entity_type: String,
    #[arg(long, help = "Perform the removal; without it only the count is shown")]
    run: bool,
    #[arg(long = "ngsi-v1", help = "Use the legacy API of flat-JSON brokers")]
    ngsi_v1: bool,
    #[arg(long, help = "Ask the broker not to forward the query")]
    skip_forwarding: bool,
    #[arg(short = 'L', long, value_name = "URL", help = "@context used to list a linked-data broker")]
    link: Option<String>,
    #[arg(long, value_name = "DIALECT")]
    dialect: Option<Dialect>,
    #[arg(long)]
    tenant: Option<String>,
    #[arg(long)]
    scope: Option<String>,
    #[arg(long)]
    token: Option<String>,
    #[arg(long = "help", action = ArgAction::Help, help = "Print help")]
    _help: Option<bool>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Some(Commands::Copy(args)) => run_copy(&load_tool_config(cli.config)?, args),
        Some(Commands::Remove(args)) => run_remove(&load_tool_config(cli.config)?, args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

/// `RUST_LOG` wins over `--verbose`, so `.env` must be loaded first.
fn log_filter(verbose: bool) -> EnvFilter {
    let default_level = if verbose { "debug" } else { "warn" };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn init_tracing(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose))
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn load_tool_config(flag: Option<PathBuf>) -> Result<ToolConfig> {
    let cwd = current_dir()?;
    let resolved = resolve_config_path(flag.as_deref(), &cwd);
    debug!("{}", resolved.diagnostics());
    load_config(&resolved.path)
}

fn run_copy(config: &ToolConfig, args: CopyArgs) -> Result<()> {
    let types = split_types(&args.entity_type)?;
    let http = config.http_client_config()?;
    let source_profile = config.resolve_broker(
        &args.host,
        &BrokerOverrides {
            dialect: args.dialect,
            legacy: args.ngsi_v1,
            tenant: args.tenant,
            scope: args.scope,
            token: args.token,
        },
    )?;
    let destination_profile = config.resolve_broker(
        &args.host2,
        &BrokerOverrides {
            dialect: args.dialect2,
            legacy: args.ngsi_v1,
            tenant: args.tenant2,
            scope: args.scope2,
            token: args.token2,
        },
    )?;
    let mut source = HttpBrokerClient::new(source_profile, http.clone())?;
    let mut destination = HttpBrokerClient::new(destination_profile, http)?;
    let options = JobOptions {
        confirmed: args.run,
        skip_forwarding: args.skip_forwarding,
        link: args.link,
        destination_context: args.context2,
        ..JobOptions::default()
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for entity_type in types {
        copy_entities(&mut source, &mut destination, entity_type, &options, &mut out)
            .with_context(|| format!("failed to copy entities of type {entity_type}"))?;
        out.flush()?;
    }
    debug!(
        source_requests = source.request_count(),
        destination_requests = destination.request_count(),
        "copy finished"
    );
    Ok(())
}

fn run_remove(config: &ToolConfig, args: RemoveArgs) -> Result<()> {
    let types = split_types(&args.entity_type)?;
    let profile = config.resolve_broker(
        &args.host,
        &BrokerOverrides {
            dialect: args.dialect,
            legacy: args.ngsi_v1,
            tenant: args.tenant,
            scope: args.scope,
            token: args.token,
        },
    )?;
    let mut client = HttpBrokerClient::new(profile, config.http_client_config()?)?;
    let options = JobOptions {
        confirmed: args.run,
        skip_forwarding: args.skip_forwarding,
        link: args.link,
        ..JobOptions::default()
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for entity_type in types {
        remove_entities(&mut client, entity_type, &options, &mut out)
            .with_context(|| format!("failed to remove entities of type {entity_type}"))?;
        out.flush()?;
    }
    debug!(requests = client.request_count(), "remove finished");
    Ok(())
}

fn split_types(raw: &str) -> Result<Vec<&str>> {
    let types: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|entity_type| !entity_type.is_empty())
        .collect();
    if types.is_empty() {
        bail!("--type requires at least one entity type");
    }
    Ok(types)
}
