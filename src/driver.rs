//! Script driver
//!
//! The simulation is driven one line at a time: each non-empty line is one
//! command occurring at a distinct time instant, so the driver advances the
//! logical clock exactly once per command before dispatching it to the
//! coordinator. Blank and comment lines carry no command and do not move the
//! clock.

use std::fs;
use std::path::Path;

use log::debug;

use crate::coordinator::{Coordinator, DumpSnapshot};
use crate::error::Result;
use crate::parser::{Command, Parser};

/// Owns the coordinator and feeds it parsed script commands
#[derive(Default)]
pub struct Driver {
    coordinator: Coordinator,
}

impl Driver {
    pub fn new() -> Self {
        Self {
            coordinator: Coordinator::new(),
        }
    }

    /// The coordinator, for direct inspection
    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Execute one parsed command: tick the clock, dispatch, return the
    /// status text
    pub fn execute(&mut self, command: Command) -> String {
        self.coordinator.tick();
        debug!("t={} executing {:?}", self.coordinator.now(), command);
        match command {
            Command::Begin { txn } => self.coordinator.begin(&txn),
            Command::BeginRo { txn } => self.coordinator.begin_ro(&txn),
            Command::Read { txn, var } => self.coordinator.read(&txn, var),
            Command::Write { txn, var, value } => self.coordinator.write(&txn, var, value),
            Command::Fail { site } => self.coordinator.fail(site),
            Command::Recover { site } => self.coordinator.recover(site),
            Command::End { txn } => self.coordinator.end(&txn),
            Command::Dump => render_dump(&self.coordinator.dump()),
        }
    }

    /// Execute one script line. `Ok(None)` for blank/comment lines.
    pub fn execute_line(&mut self, line: &str) -> Result<Option<String>> {
        match Parser::parse(line)? {
            Some(command) => Ok(Some(self.execute(command))),
            None => Ok(None),
        }
    }

    /// Run a whole script, returning one status block per command
    pub fn run_script(&mut self, script: &str) -> Result<Vec<String>> {
        let mut output = Vec::new();
        for line in script.lines() {
            if let Some(status) = self.execute_line(line)? {
                output.push(status);
            }
        }
        Ok(output)
    }

    /// Run a script file
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> Result<Vec<String>> {
        let script = fs::read_to_string(path)?;
        self.run_script(&script)
    }

    /// The current dump, rendered as JSON
    pub fn dump_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.coordinator.dump())?)
    }
}

/// Render a dump snapshot as one line per site:
/// `site 3 (down): x2=20 (default), x4=40 (default), ...`
fn render_dump(snapshot: &DumpSnapshot) -> String {
    let mut lines = Vec::new();
    for (id, site) in &snapshot.sites {
        let status = if site.up { "" } else { " (down)" };
        let variables: Vec<String> = site
            .variables
            .iter()
            .map(|(var, committed)| format!("{}={} ({})", var, committed.value, committed.writer))
            .collect();
        lines.push(format!("site {}{}: {}", id, status, variables.join(", ")));
    }
    lines.join("\n")
}
