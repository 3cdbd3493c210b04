//! # Port Scanner
//!
//! Discovers which local TCP ports belong to agent processes by running the
//! OS socket-listing tool and parsing its text output.
//!
//! ## Pipeline
//!
//! 1. Run the platform's listing command under a deadline.
//! 2. Keep only lines mentioning the configured process name.
//! 3. Scan each line's whitespace-separated columns for a loopback or
//!    wildcard bind and take its port.
//! 4. Collect into a sorted, de-duplicated set.
//!
//! Column syntax differs per platform (Linux `127.0.0.1:4096` vs BSD
//! `127.0.0.1.4096`), so the syntax lives behind the [`SocketTableFormat`]
//! trait and the rest of the pipeline is shared.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::RelayError;

/// Command line that prints the socket table.
#[derive(Debug, Clone)]
pub struct ScanCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ScanCommand {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }
}

impl fmt::Display for ScanCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// One platform's socket-table dialect: which command prints it and how a
/// bound address column is spelled.
pub trait SocketTableFormat: Send + Sync {
    /// Command that lists listening TCP sockets in this format.
    fn list_command(&self) -> ScanCommand;

    /// Whether a line can describe a listening socket at all.
    fn is_candidate_line(&self, _line: &str) -> bool {
        true
    }

    /// Parse one whitespace-separated column as a bind address, returning
    /// its port when the address is loopback or wildcard.
    fn port_from_column(&self, column: &str) -> Option<u16>;
}

/// Linux `netstat -tulpn` output: colon-separated `address:port` columns,
/// already restricted to listening sockets by the `-l` flag.
pub struct LinuxNetstat;

impl SocketTableFormat for LinuxNetstat {
    fn list_command(&self) -> ScanCommand {
        ScanCommand::new("netstat", &["-tulpn"])
    }

    fn port_from_column(&self, column: &str) -> Option<u16> {
        let (addr, port) = column.rsplit_once(':')?;
        match addr {
            "127.0.0.1" | "0.0.0.0" | "::1" | "::" => parse_port(port),
            _ => None,
        }
    }
}

/// BSD/macOS `netstat -van -p tcp` output: dot-separated `address.port`
/// columns, `*` for a wildcard bind. The listing includes established
/// connections, so only LISTEN lines are considered.
pub struct BsdNetstat;

impl SocketTableFormat for BsdNetstat {
    fn list_command(&self) -> ScanCommand {
        ScanCommand::new("netstat", &["-van", "-p", "tcp"])
    }

    fn is_candidate_line(&self, line: &str) -> bool {
        line.contains("LISTEN")
    }

    fn port_from_column(&self, column: &str) -> Option<u16> {
        let (addr, port) = column.rsplit_once('.')?;
        match addr {
            "127.0.0.1" | "0.0.0.0" | "*" => parse_port(port),
            _ => None,
        }
    }
}

/// Ports are 1..=65535; netstat prints `*` for an unbound port.
fn parse_port(s: &str) -> Option<u16> {
    s.parse::<u16>().ok().filter(|port| *port != 0)
}

/// Pick the socket-table format for the OS we were compiled for.
pub fn native_format() -> &'static dyn SocketTableFormat {
    if cfg!(any(
        target_os = "macos",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd"
    )) {
        &BsdNetstat
    } else {
        &LinuxNetstat
    }
}

/// Discovers agent ports by scanning the OS socket table.
///
/// Holds no state between calls; every [`discover_ports`](Self::discover_ports)
/// runs a fresh scan.
pub struct PortScanner {
    command: ScanCommand,
    format: &'static dyn SocketTableFormat,
    process_name: String,
    timeout: Duration,
}

impl PortScanner {
    pub fn new(
        format: &'static dyn SocketTableFormat,
        process_name: String,
        timeout: Duration,
    ) -> Self {
        Self {
            command: format.list_command(),
            format,
            process_name,
            timeout,
        }
    }

    /// Replace the socket-listing command while keeping the parsing format.
    /// Tests use this to feed fixture output through the full pipeline.
    pub fn with_command(mut self, program: &str, args: &[&str]) -> Self {
        self.command = ScanCommand::new(program, args);
        self
    }

    /// Run one scan: spawn the listing command, parse whatever it printed.
    ///
    /// Zero matching ports is `Ok(empty set)`, never an error. The error
    /// cases are a command that cannot be spawned, exits non-zero, or does
    /// not finish within the deadline.
    pub async fn discover_ports(&self) -> Result<BTreeSet<u16>, RelayError> {
        let output = tokio::time::timeout(
            self.timeout,
            Command::new(&self.command.program)
                .args(&self.command.args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            warn!(command = %self.command, timeout = ?self.timeout, "socket scan timed out");
            RelayError::ScanTimeout(format!(
                "{} did not finish within {:?}",
                self.command, self.timeout
            ))
        })?
        .map_err(|e| {
            warn!(command = %self.command, error = %e, "socket scan could not run");
            RelayError::ScanFailed(format!("{}: {}", self.command, e))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(command = %self.command, status = %output.status, "socket scan exited non-zero");
            return Err(RelayError::ScanFailed(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }

        let table = String::from_utf8_lossy(&output.stdout);
        let ports = self.extract_ports(&table);
        debug!(
            lines = table.lines().count(),
            ports = ports.len(),
            "socket table scanned"
        );
        Ok(ports)
    }

    /// Pull agent ports out of raw socket-table text.
    ///
    /// Lines not mentioning the process name are dropped, the rest are
    /// scanned column by column for a loopback/wildcard bind. Malformed
    /// lines are skipped silently; they are noise from the OS tool, not a
    /// protocol violation.
    pub fn extract_ports(&self, table: &str) -> BTreeSet<u16> {
        table
            .lines()
            .filter(|line| {
                line.contains(&self.process_name) && self.format.is_candidate_line(line)
            })
            .filter_map(|line| self.port_from_line(line))
            .collect()
    }

    fn port_from_line(&self, line: &str) -> Option<u16> {
        line.split_whitespace()
            .find_map(|column| self.format.port_from_column(column))
    }
}
