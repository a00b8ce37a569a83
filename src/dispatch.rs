//! Parallel dispatch of one command to every node of a resolved node set.
//!
//! Every address gets a rank, its position in the node set. Preparation
//! decides per rank whether the command runs locally or through the remote
//! shell and builds the argv; it never runs anything, so a dry run stops
//! there. Execution runs the prepared argv with at most `max_parallel` ranks
//! in flight, admitting waiting ranks in rank order as slots free up. A
//! failing rank never affects the others.

use std::path::Path;
use std::process::ExitStatus;
use std::sync::Arc;

use colourado::{ColorPalette, PaletteType};
use futures::future::join_all;
use itertools::{zip, Itertools};
use tokio::sync::{Mutex, Semaphore};

use crate::nodeset::ResolvedNodeSet;
use crate::session::{Label, Session};

/// How output lines are attributed to their node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelStyle {
    Hidden,
    Plain,
    Colored,
}

/// The command one rank will run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCommand {
    pub rank: usize,
    pub address: String,
    pub nodename: String,
    pub argv: Vec<String>,
    /// Runs on this host, without the remote shell.
    pub local: bool,
}

#[derive(Debug)]
pub enum RankStatus {
    /// Prepared only.
    DryRun,
    Exited(ExitStatus),
    /// The command could not be run at all.
    Failed(String),
    /// Not started because the dispatch was interrupted.
    Cancelled,
}

impl RankStatus {
    pub fn success(&self) -> bool {
        match self {
            Self::DryRun => true,
            Self::Exited(status) => status.success(),
            Self::Failed(_) | Self::Cancelled => false,
        }
    }
}

#[derive(Debug)]
pub struct RankResult {
    pub command: PreparedCommand,
    pub status: RankStatus,
}

pub struct Dispatcher {
    session: Arc<dyn Session>,
    max_parallel: usize,
    remote_shell: Vec<String>,
    transport_options: Vec<String>,
    local_nodename: Option<String>,
    dry_run: bool,
    labels: LabelStyle,
    cancelled: Arc<Mutex<bool>>,
}

impl Dispatcher {
    pub fn new(session: Arc<dyn Session>, max_parallel: usize) -> Self {
        Self {
            session,
            max_parallel: max_parallel.max(1),
            remote_shell: vec!["ssh".to_string()],
            transport_options: vec![],
            local_nodename: None,
            dry_run: false,
            labels: LabelStyle::Plain,
            cancelled: Arc::new(Mutex::new(false)),
        }
    }

    pub fn with_remote_shell(mut self, argv: Vec<String>) -> Self {
        self.remote_shell = argv;
        self
    }

    /// Extra options placed between the remote shell and the address.
    pub fn with_transport_options(mut self, options: Vec<String>) -> Self {
        self.transport_options = options;
        self
    }

    pub fn with_local_nodename(mut self, nodename: Option<String>) -> Self {
        self.local_nodename = nodename;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_labels(mut self, labels: LabelStyle) -> Self {
        self.labels = labels;
        self
    }

    /// Once the flag is set no further ranks are started.
    pub fn with_cancel_flag(mut self, cancelled: Arc<Mutex<bool>>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Builds the argv for one rank.
    pub fn prepare(
        &self,
        rank: usize,
        address: &str,
        nodeset: &ResolvedNodeSet,
        command: &[String],
    ) -> PreparedCommand {
        let nodename = nodeset.nodename_for(address);
        let local = self
            .local_nodename
            .as_deref()
            .is_some_and(|me| me == nodename || me == address);

        let argv = if local {
            tracing::info!("running {}", command.join(" "));
            command.to_vec()
        } else {
            let shell = self
                .remote_shell
                .first()
                .map(|program| Path::new(program))
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            tracing::info!("running {} to {} {}", shell, nodename, command.join(" "));
            self.remote_shell
                .iter()
                .chain(&self.transport_options)
                .cloned()
                .chain([address.to_string()])
                .chain(command.iter().cloned())
                .collect()
        };

        PreparedCommand {
            rank,
            address: address.to_string(),
            nodename: nodename.to_string(),
            argv,
            local,
        }
    }

    pub fn prepare_all(&self, nodeset: &ResolvedNodeSet, command: &[String]) -> Vec<PreparedCommand> {
        nodeset
            .addresses()
            .into_iter()
            .enumerate()
            .map(|(rank, address)| self.prepare(rank, address, nodeset, command))
            .collect()
    }

    /// Runs `command` on every node of `nodeset`. Results are indexed by rank.
    pub async fn dispatch(&self, nodeset: &ResolvedNodeSet, command: &[String]) -> Vec<RankResult> {
        let prepared = self.prepare_all(nodeset, command);
        if self.dry_run {
            return prepared
                .into_iter()
                .map(|command| RankResult {
                    command,
                    status: RankStatus::DryRun,
                })
                .collect();
        }

        let num_ranks = prepared.len();
        let labels = self.make_labels(&prepared);
        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        // Workers report here once their slot is released.
        let (done_tx, done_rx) = flume::bounded::<RankResult>(num_ranks.max(1));

        let mut tasks = Vec::with_capacity(num_ranks);
        for (command, label) in zip(prepared.iter().cloned(), labels) {
            // Wait here for a free slot so ranks start in rank order.
            let permit = Arc::clone(&semaphore).acquire_owned().await;
            let session = Arc::clone(&self.session);
            let cancelled = Arc::clone(&self.cancelled);
            let done_tx = done_tx.clone();
            tasks.push(tokio::spawn(async move {
                let status = match permit {
                    Ok(_permit) => {
                        if *cancelled.lock().await {
                            RankStatus::Cancelled
                        } else {
                            match session.run(&command.argv, &label).await {
                                Ok(status) => RankStatus::Exited(status),
                                Err(e) => RankStatus::Failed(e.to_string()),
                            }
                        }
                    }
                    Err(e) => RankStatus::Failed(e.to_string()),
                };
                let _ = done_tx.send_async(RankResult { command, status }).await;
            }));
        }
        drop(done_tx);

        let mut results: Vec<Option<RankResult>> = (0..num_ranks).map(|_| None).collect();
        let mut finished = 0;
        while let Ok(result) = done_rx.recv_async().await {
            finished += 1;
            tracing::debug!(
                "rank {} ({}) finished: {:?} [{}/{}]",
                result.command.rank,
                result.command.nodename,
                result.status,
                finished,
                num_ranks
            );
            let rank = result.command.rank;
            results[rank] = Some(result);
        }

        for joined in join_all(tasks).await {
            if let Err(e) = joined {
                tracing::error!("worker task failed: {}", e);
            }
        }

        zip(results, prepared)
            .map(|(result, command)| {
                result.unwrap_or(RankResult {
                    command,
                    status: RankStatus::Failed("worker task failed".to_string()),
                })
            })
            .collect()
    }

    fn make_labels(&self, prepared: &[PreparedCommand]) -> Vec<Label> {
        match self.labels {
            LabelStyle::Hidden => prepared.iter().map(|p| Label::hidden(&p.nodename)).collect(),
            LabelStyle::Plain => prepared.iter().map(|p| Label::plain(&p.nodename)).collect(),
            LabelStyle::Colored if prepared.is_empty() => vec![],
            LabelStyle::Colored => {
                let colors =
                    ColorPalette::new(prepared.len() as u32, PaletteType::Pastel, false).colors;
                zip(prepared, colors)
                    .map(|(p, color)| Label::colored(&p.nodename, color))
                    .collect()
            }
        }
    }
}

impl PreparedCommand {
    /// The argv as a single shell-like line, for `--unix` and dry-run output.
    pub fn command_line(&self) -> String {
        self.argv.iter().join(" ")
    }
}
