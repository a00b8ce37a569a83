use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use tokio::sync::Mutex;

use fleetsh::config::{Config, Mode};
use fleetsh::dispatch::{Dispatcher, LabelStyle, RankStatus};
use fleetsh::error::FleetError;
use fleetsh::loader::ConfigLoader;
use fleetsh::logging::init_logging;
use fleetsh::nodeset::{NodeSet, ResolvedNodeSet};
use fleetsh::session::{check_command, split_command_line, ProcessSession};
use fleetsh::state::{system_hostname, ConfigState};

fn load_config(cli: &Config) -> Result<ConfigState, FleetError> {
    let mut loader = ConfigLoader::new(ConfigState::new());
    loader.load(Path::new(&cli.conf));
    let (state, diagnostics) = loader.finish();
    for diagnostic in &diagnostics {
        eprintln!("{}", diagnostic);
    }
    if !diagnostics.is_empty() {
        return Err(FleetError::Config {
            path: cli.conf.clone(),
            errors: diagnostics.len(),
        });
    }
    Ok(state)
}

fn select_nodes(cli: &Config, state: &ConfigState) -> Result<ResolvedNodeSet, FleetError> {
    let mut nodeset = NodeSet::new();
    cli.nodes.iter().for_each(|list| nodeset.add_nodes(list));
    cli.groups.iter().for_each(|list| nodeset.add_groups(list));
    cli.exclude_nodes.iter().for_each(|list| nodeset.exclude_nodes(list));
    cli.exclude_groups.iter().for_each(|list| nodeset.exclude_groups(list));

    let resolved = nodeset.resolve(state)?;
    if cli.warn_ignored() {
        if let Some(warning) = resolved.ignored_warning(state.params.terse) {
            eprintln!("{}", warning.yellow());
        }
    }
    Ok(resolved)
}

/// Returns whether every rank succeeded.
async fn run_command(
    cli: &Config,
    state: &ConfigState,
    nodeset: &ResolvedNodeSet,
) -> Result<bool, FleetError> {
    if cli.command.is_empty() {
        return Err(FleetError::EmptyCommand);
    }
    nodeset.require_nodes()?;
    let remote_shell = check_command("ssh_cmd", &state.params.ssh_cmd)?;
    let transport_options = match cli.options.as_deref() {
        Some(options) => split_command_line("--options", options)?,
        None => vec![],
    };
    let max_parallel = cli.numproc.map(|n| n as usize).unwrap_or(state.params.num_proc);
    let labels = if cli.no_nodename {
        LabelStyle::Hidden
    } else if state.params.colorize {
        LabelStyle::Colored
    } else {
        LabelStyle::Plain
    };

    let cancelled = Arc::new(Mutex::new(false));
    {
        let cancelled = Arc::clone(&cancelled);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("{}", "interrupted; not starting any more nodes".red());
                *cancelled.lock().await = true;
            }
        });
    }

    let dispatcher = Dispatcher::new(Arc::new(ProcessSession::stdout()), max_parallel)
        .with_remote_shell(remote_shell)
        .with_transport_options(transport_options)
        .with_local_nodename(state.local_nodename(&system_hostname()))
        .with_dry_run(cli.dry_run)
        .with_labels(labels)
        .with_cancel_flag(cancelled);

    if cli.unix && !cli.dry_run {
        for prepared in dispatcher.prepare_all(nodeset, &cli.command) {
            println!("{}", prepared.command_line());
        }
    }

    let results = dispatcher.dispatch(nodeset, &cli.command).await;
    let mut all_ok = true;
    for result in &results {
        match &result.status {
            RankStatus::DryRun => {
                println!("{} # {}", result.command.command_line(), result.command.nodename);
            }
            RankStatus::Exited(status) if !status.success() => {
                all_ok = false;
                if !cli.quiet {
                    eprintln!(
                        "{}: {}",
                        result.command.nodename,
                        format!("exited with {}", status).red()
                    );
                }
            }
            RankStatus::Exited(_) => {}
            RankStatus::Failed(reason) => {
                all_ok = false;
                eprintln!("{}: {}", result.command.nodename, reason.red());
            }
            RankStatus::Cancelled => all_ok = false,
        }
    }
    Ok(all_ok)
}

async fn run(cli: &Config) -> Result<bool, FleetError> {
    let state = load_config(cli)?;
    colored::control::set_override(state.params.colorize);

    let nodeset = select_nodes(cli, &state)?;
    match cli.mode {
        Mode::Check => {
            if !cli.quiet {
                eprintln!(
                    "{}: {} nodes, {} groups",
                    cli.conf,
                    state.nodes.len(),
                    state.groups.len()
                );
            }
            Ok(true)
        }
        Mode::List => {
            match serde_yaml::to_string(&nodeset.entries()) {
                Ok(yaml) => print!("{}", yaml),
                Err(e) => {
                    eprintln!("failed to serialize node list: {}", e);
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Mode::Run => run_command(cli, &state, &nodeset).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Config::parse();
    init_logging(cli.verbose);

    match run(&cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("{}", e.to_string().red());
            ExitCode::FAILURE
        }
    }
}
