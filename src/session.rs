//! Running one prepared command and streaming its output.

use std::io::Write;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use colored::Colorize;
use colourado::Color;
use futures::future::try_join;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::error::FleetError;

/// Prefix put in front of every output line of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub nodename: String,
    prefix: String,
}

impl Label {
    /// `nodename: line`
    pub fn plain(nodename: &str) -> Self {
        Self {
            nodename: nodename.to_string(),
            prefix: format!("{}: ", nodename),
        }
    }

    /// `[nodename] line`, with the bracketed name in `color`.
    pub fn colored(nodename: &str, color: Color) -> Self {
        let r = (color.red * 255.0) as u8;
        let g = (color.green * 255.0) as u8;
        let b = (color.blue * 255.0) as u8;
        Self {
            nodename: nodename.to_string(),
            prefix: format!("{} ", format!("[{}]", nodename).truecolor(r, g, b)),
        }
    }

    /// Output lines are passed through untouched.
    pub fn hidden(nodename: &str) -> Self {
        Self {
            nodename: nodename.to_string(),
            prefix: String::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

/// The transport seam: runs an argv and reports how it exited.
#[async_trait]
pub trait Session: Send + Sync {
    async fn run(&self, argv: &[String], label: &Label) -> Result<ExitStatus, FleetError>;
}

/// Runs commands as local child processes. Remote commands reach their node
/// through the remote shell prefix already present in the argv.
pub struct ProcessSession {
    output: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl ProcessSession {
    pub fn stdout() -> Self {
        Self::with_writer(Box::new(std::io::stdout()))
    }

    pub fn with_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            output: Arc::new(Mutex::new(writer)),
        }
    }

    async fn stream<B: AsyncRead + Unpin>(&self, stream: B, label: &Label) -> std::io::Result<()> {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::with_capacity(reader.buffer().len());
        let mut after_cr = false;
        loop {
            read_until2(&mut reader, b'\r', b'\n', &mut buf).await?;
            // An empty buffer means that EOF was reached.
            if buf.is_empty() {
                return Ok(());
            }
            // The \n of a \r\n pair ends the line already printed.
            if after_cr && buf == b"\n" {
                after_cr = false;
                buf.clear();
                continue;
            }
            after_cr = buf.last() == Some(&b'\r');
            if matches!(buf.last(), Some(b'\r' | b'\n')) {
                buf.pop();
            }
            // Hold the lock for the whole line so lines of different nodes
            // never get mixed.
            let mut guard = self.output.lock().unwrap_or_else(PoisonError::into_inner);
            writeln!(guard, "{}{}", label.prefix(), String::from_utf8_lossy(&buf))?;
            guard.flush()?;
            buf.clear();
        }
    }
}

#[async_trait]
impl Session for ProcessSession {
    async fn run(&self, argv: &[String], label: &Label) -> Result<ExitStatus, FleetError> {
        let (program, args) = argv.split_first().ok_or(FleetError::EmptyCommand)?;
        tracing::debug!("{} spawning {:?}", label.nodename, argv);

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) {
            try_join(self.stream(stdout, label), self.stream(stderr, label)).await?;
        }
        let status = child.wait().await?;
        tracing::debug!("{} done ({})", label.nodename, status);
        Ok(status)
    }
}

/// Reads into `buf` up to and including the first of either delimiter.
async fn read_until2<B: AsyncRead + Unpin>(
    reader: &mut BufReader<B>,
    delimiter1: u8,
    delimiter2: u8,
    buf: &mut Vec<u8>,
) -> std::io::Result<()> {
    loop {
        let (done, used) = {
            let available = reader.fill_buf().await?;
            if let Some(i) = memchr::memchr2(delimiter1, delimiter2, available) {
                buf.extend_from_slice(&available[..=i]);
                (true, i + 1)
            } else {
                buf.extend_from_slice(available);
                (false, available.len())
            }
        };
        reader.consume(used);
        if done || used == 0 {
            return Ok(());
        }
    }
}

/// Splits a command line with shell quoting rules.
pub fn split_command_line(param: &str, command_line: &str) -> Result<Vec<String>, FleetError> {
    shlex::split(command_line).ok_or_else(|| FleetError::Quoting {
        param: param.to_string(),
        line: command_line.to_string(),
    })
}

/// Splits a configured command line into an argv and makes sure its program
/// can be found.
pub fn check_command(param: &str, command_line: &str) -> Result<Vec<String>, FleetError> {
    let argv = split_command_line(param, command_line)?;
    let program = argv.first().ok_or(FleetError::EmptyCommand)?;
    if which::which(program).is_err() {
        return Err(FleetError::CommandNotFound {
            param: param.to_string(),
            command: program.clone(),
        });
    }
    Ok(argv)
}
