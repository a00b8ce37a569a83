//! End-to-end tests: configuration files on disk through node selection and
//! dispatch.

use std::io::Write;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::{tempdir, NamedTempFile};

use fleetsh::{
    ConfigLoader, ConfigState, Dispatcher, FleetError, Label, LabelStyle, NodeSet,
    ProcessSession, ResolveError, ResolvedNodeSet, Session,
};

/// Mock session that records what it was asked to run.
#[derive(Default)]
pub struct MockSession {
    executed: Mutex<Vec<(String, Vec<String>)>>,
    exit_code: i32,
    delay_ms: u64,
}

impl MockSession {
    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

#[async_trait]
impl Session for MockSession {
    async fn run(&self, argv: &[String], label: &Label) -> Result<ExitStatus, FleetError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.executed
            .lock()
            .unwrap()
            .push((label.nodename.clone(), argv.to_vec()));

        use std::os::unix::process::ExitStatusExt;
        Ok(ExitStatus::from_raw(self.exit_code << 8))
    }
}

/// Output sink shared between a ProcessSession and the test.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn write_config(text: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file
}

fn load(text: &str) -> (ConfigState, usize) {
    let file = write_config(text);
    let mut loader = ConfigLoader::new(ConfigState::new());
    let errors = loader.load(file.path());
    let (state, diagnostics) = loader.finish();
    assert!(diagnostics.len() >= errors);
    (state, diagnostics.len())
}

fn select(state: &ConfigState, groups: &str) -> ResolvedNodeSet {
    let mut nodeset = NodeSet::new();
    nodeset.add_groups(groups);
    nodeset.resolve(state).unwrap()
}

fn argv(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

const WEB: &str = "\
node web1 web ipaddress:10.0.0.1
node web2 web
";

#[test]
fn test_web_group_addresses() {
    let (state, errors) = load(WEB);
    assert_eq!(errors, 0);
    let resolved = select(&state, "web");
    assert_eq!(resolved.addresses(), ["10.0.0.1", "web2"]);
    assert_eq!(resolved.nodename_for("10.0.0.1"), "web1");
    assert_eq!(resolved.nodename_for("web2"), "web2");
}

#[test]
fn test_include_with_continuation() {
    let dir = tempdir().unwrap();
    let included = dir.path().join("nodes.conf");
    std::fs::write(&included, "node db1 db \\\n    ipaddress:10.0.1.1\n").unwrap();

    let (state, errors) = load(&format!(
        "num_proc 4\ninclude {}\n{}",
        included.display(),
        WEB
    ));
    assert_eq!(errors, 0);
    assert_eq!(state.params.num_proc, 4);
    assert_eq!(select(&state, "all").addresses(), ["10.0.1.1", "10.0.0.1", "web2"]);
}

#[test]
fn test_missing_include_is_one_error() {
    let (_, errors) = load("include /nonexistent/fleetsh/missing.conf\nnode a\n");
    assert_eq!(errors, 1);
}

#[test]
fn test_redefinition_points_at_first_definition() {
    let file = write_config("node a\nnode a\n");
    let mut loader = ConfigLoader::new(ConfigState::new());
    assert_eq!(loader.load(file.path()), 1);

    let diagnostic = &loader.diagnostics()[0];
    let origin = diagnostic.origin.as_ref().unwrap();
    assert_eq!(origin.line, 2);
    assert!(diagnostic.message.contains("redefinition"));
    assert!(diagnostic.note.as_deref().unwrap().contains(":1:"));
    // The first definition survives.
    assert!(loader.state().is_node("a"));
}

#[test]
fn test_unknown_selector_fails() {
    let (state, _) = load(WEB);
    let mut nodeset = NodeSet::new();
    nodeset.add_nodes("ghost");
    assert_eq!(
        nodeset.resolve(&state).unwrap_err(),
        ResolveError::UnknownNode("ghost".into())
    );
}

#[test]
fn test_invalid_config_reports_every_error() {
    let (_, errors) = load("num_proc 0\nnode bad_name!\nbogus_keyword 1\nnode ok\n");
    assert_eq!(errors, 3);
}

#[tokio::test]
async fn test_dispatch_all_nodes() {
    let (state, _) = load("node n1 rack\nnode n2 rack\nnode n3 rack ipaddress:10.9.9.3\n");
    let resolved = select(&state, "rack");
    let session = Arc::new(MockSession::default().with_delay_ms(10));
    let dispatcher = Dispatcher::new(session.clone(), 8)
        .with_remote_shell(argv(&["ssh", "-q"]))
        .with_labels(LabelStyle::Colored);

    let results = dispatcher.dispatch(&resolved, &argv(&["uptime"])).await;
    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.status.success()));
    assert_eq!(results[2].command.nodename, "n3");
    assert_eq!(results[2].command.argv, argv(&["ssh", "-q", "10.9.9.3", "uptime"]));

    let mut ran: Vec<String> = session
        .executed
        .lock()
        .unwrap()
        .iter()
        .map(|(nodename, _)| nodename.clone())
        .collect();
    ran.sort();
    assert_eq!(ran, ["n1", "n2", "n3"]);
}

#[tokio::test]
async fn test_dispatch_reports_nonzero_exit() {
    let (state, _) = load(WEB);
    let dispatcher = Dispatcher::new(Arc::new(MockSession::default().with_exit_code(2)), 1);
    let results = dispatcher.dispatch(&select(&state, "web"), &argv(&["false"])).await;
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| !r.status.success()));
}

#[tokio::test]
async fn test_process_session_through_fake_remote_shell() {
    let (state, _) = load(WEB);
    let buffer = SharedBuffer::default();
    let session = Arc::new(ProcessSession::with_writer(Box::new(buffer.clone())));
    // Stands in for ssh: drops the address and runs the rest locally.
    let fake_ssh = argv(&["sh", "-c", "shift; exec \"$@\"", "fake-ssh"]);
    let dispatcher = Dispatcher::new(session, 2)
        .with_remote_shell(fake_ssh)
        .with_labels(LabelStyle::Plain);

    let results = dispatcher
        .dispatch(&select(&state, "web"), &argv(&["echo", "hello"]))
        .await;
    assert!(results.iter().all(|r| r.status.success()));

    let output = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
    let mut lines: Vec<&str> = output.lines().collect();
    lines.sort();
    assert_eq!(lines, ["web1: hello", "web2: hello"]);
}

#[test]
fn test_redefinitions_add_one_error_each() {
    let (state, errors) = load(
        "group farm web db\nnode web1 web\nnode web1 db\nnode web2 web\ngroup farm web\nnode web2\n",
    );
    assert_eq!(errors, 3);
    let definitions = state
        .symbols
        .keys()
        .filter(|key| key.starts_with("node ") || key.starts_with("group "))
        .count();
    assert_eq!(definitions, 3);
    assert_eq!(state.nodes["web1"].groups, ["web"]);
}

#[test]
fn test_resolution_is_repeatable() {
    let (state, _) = load("node c x\nnode a x y\nnode b y\nignore_group z\nnode d z\n");
    let mut nodeset = NodeSet::new();
    nodeset.add_groups("x,y,z");
    nodeset.exclude_nodes("b");
    let first = nodeset.resolve(&state).unwrap();
    let second = nodeset.resolve(&state).unwrap();
    assert_eq!(first.addresses(), second.addresses());
    assert_eq!(first.addresses(), ["c", "a"]);
}
