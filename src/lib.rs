//! fleetsh: run one command on a fleet of nodes described by a directive
//! configuration file.

// Command line arguments.
pub mod config;
// Configuration directives and their handlers.
pub mod directive;
// Parallel execution over a resolved node set.
pub mod dispatch;
// Error handling.
pub mod error;
// Compound group expansion.
pub mod group;
// Configuration file reading and diagnostics.
pub mod loader;
// Tracing setup.
pub mod logging;
// Node definitions and their specifiers.
pub mod node;
// Node selection.
pub mod nodeset;
// Command execution and output labeling.
pub mod session;
// Parameters and definitions built up while loading.
pub mod state;
// Where every node and group name was defined.
pub mod symbol;

pub use config::{Config, Mode};
pub use dispatch::{Dispatcher, LabelStyle, PreparedCommand, RankResult, RankStatus};
pub use error::{FleetError, ResolveError};
pub use loader::{ConfigLoader, Diagnostic};
pub use nodeset::{NodeSet, ResolvedNodeSet};
pub use session::{Label, ProcessSession, Session};
pub use state::ConfigState;
