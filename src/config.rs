//! Command line arguments.
//!
//! Everything the fleet looks like comes from the configuration file named
//! by `--conf`; these flags only pick nodes and tune one invocation.

use clap::{Parser, ValueEnum};

pub const DEFAULT_CONFIG_FILE: &str = "/etc/fleetsh/fleetsh.conf";

#[derive(Parser, Debug)]
#[command(version, author, about = "Run a command on a fleet of nodes")]
pub struct Config {
    /// Run a command (run), print the selected nodes (list), or only validate the config (check)
    #[arg(value_enum)]
    pub mode: Mode,

    /// Configuration file to load
    #[arg(long = "conf", short = 'c', default_value = DEFAULT_CONFIG_FILE)]
    pub conf: String,

    /// Comma separated nodes to select. May be repeated.
    #[arg(long = "node", short = 'n')]
    pub nodes: Vec<String>,

    /// Comma separated groups to select. May be repeated.
    #[arg(long = "group", short = 'g')]
    pub groups: Vec<String>,

    /// Comma separated nodes to leave out
    #[arg(long = "exclude", short = 'x')]
    pub exclude_nodes: Vec<String>,

    /// Comma separated groups to leave out
    #[arg(long = "exclude-group", short = 'X')]
    pub exclude_groups: Vec<String>,

    /// Extra options passed to the remote shell
    #[arg(long, short = 'o', allow_hyphen_values = true)]
    pub options: Option<String>,

    /// Maximum number of nodes to run on at once. Overrides num_proc.
    #[arg(long, short = 'p', value_parser = clap::value_parser!(u32).range(1..))]
    pub numproc: Option<u32>,

    /// Don't prefix output lines with the node name
    #[arg(long = "no-nodename", short = 'N')]
    pub no_nodename: bool,

    /// Suppress informational messages
    #[arg(long, short)]
    pub quiet: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(long, short, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Print the commands that are run
    #[arg(long)]
    pub unix: bool,

    /// Show what would run without running anything
    #[arg(long)]
    pub dry_run: bool,

    /// The command to run on every selected node
    #[arg(last = true)]
    pub command: Vec<String>,
}

impl Config {
    /// Whether the ignored-nodes warning is printed. `--unix` output stays
    /// plain command lines.
    pub fn warn_ignored(&self) -> bool {
        !self.quiet && !self.unix
    }
}

#[derive(PartialEq, Eq, Clone, Copy, Debug, ValueEnum)]
pub enum Mode {
    Run,
    List,
    Check,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let config = Config::parse_from([
            "fleetsh", "run", "-g", "web,db", "-g", "lab", "-x", "web2", "-p", "4", "-N", "--",
            "uname", "-a",
        ]);
        assert_eq!(config.mode, Mode::Run);
        assert_eq!(config.groups, vec!["web,db", "lab"]);
        assert_eq!(config.exclude_nodes, vec!["web2"]);
        assert_eq!(config.numproc, Some(4));
        assert!(config.no_nodename);
        assert_eq!(config.command, vec!["uname", "-a"]);
        assert_eq!(config.conf, DEFAULT_CONFIG_FILE);
    }

    #[test]
    fn test_ignored_warning_switches() {
        assert!(Config::parse_from(["fleetsh", "list"]).warn_ignored());
        assert!(!Config::parse_from(["fleetsh", "list", "-q"]).warn_ignored());
        assert!(!Config::parse_from(["fleetsh", "run", "--unix", "--", "true"]).warn_ignored());
    }

    #[test]
    fn test_numproc_must_be_positive() {
        assert!(Config::try_parse_from(["fleetsh", "run", "-p", "0"]).is_err());
    }

    #[test]
    fn test_verbosity_counts() {
        let config = Config::parse_from(["fleetsh", "list", "-vv", "-c", "my.conf"]);
        assert_eq!(config.mode, Mode::List);
        assert_eq!(config.verbose, 2);
        assert_eq!(config.conf, "my.conf");
    }
}
