//! The external-process boundary: hand a rendered program to the solver,
//! collect its stdout and exit status.

use std::io::Write;
use std::process::{Command, ExitStatus, Stdio};
use std::time::Duration;

use indicatif::ProgressBar;

use crate::error::FeldsparError;

/// What the solver left behind: its full stdout and how it exited.
///
/// A non-zero exit means `stdout` is a diagnostic, not a data stream.
#[derive(Debug)]
pub struct SolverOutput {
    pub stdout: String,
    pub status: ExitStatus,
}

/// A FreeFem++ installation: the executable to invoke and the verbosity to
/// request.
#[derive(Debug, Clone)]
pub struct FreeFem {
    pub command: String,
    pub verbosity: u32,
}

impl Default for FreeFem {
    fn default() -> FreeFem {
        FreeFem {
            command: "FreeFem++".to_owned(),
            verbosity: 0,
        }
    }
}

impl FreeFem {
    pub fn new(command: &str) -> FreeFem {
        FreeFem {
            command: command.to_owned(),
            ..FreeFem::default()
        }
    }

    /// Runs one script through the solver, blocking until it exits.
    ///
    /// The program text is written to a temp `.edp` file that lives for the
    /// duration of the call.
    ///
    /// # Arguments
    /// * `edp` - The program text to hand to the solver
    /// * `stdin` - Pre-supplied values for scripts that read from standard
    ///     input
    ///
    /// # Returns
    /// The solver's stdout and exit status, even when the exit status
    /// signals failure; the caller decides what a failed run means.
    pub fn run(&self, edp: &str, stdin: Option<&str>) -> Result<SolverOutput, FeldsparError> {
        let script_file = match tempfile::Builder::new().suffix(".edp").tempfile() {
            Ok(f) => f,
            Err(err) => {
                return Err(FeldsparError::Solver(format!(
                    "Failed to create script file: {}",
                    err
                )))
            }
        };

        if let Err(err) = std::fs::write(script_file.path(), edp) {
            return Err(FeldsparError::Solver(format!(
                "Failed to write script file: {}",
                err
            )));
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_message(format!("running {}...", self.command));
        spinner.enable_steady_tick(Duration::from_millis(100));

        let mut child = match Command::new(&self.command)
            .arg(script_file.path())
            .arg("-v")
            .arg(self.verbosity.to_string())
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                spinner.finish_and_clear();
                return Err(FeldsparError::Solver(format!(
                    "{} failed to start: {}",
                    self.command, err
                )));
            }
        };

        if let (Some(values), Some(mut handle)) = (stdin, child.stdin.take()) {
            if let Err(err) = handle.write_all(values.as_bytes()) {
                spinner.finish_and_clear();
                return Err(FeldsparError::Solver(format!(
                    "Failed to feed solver stdin: {}",
                    err
                )));
            }
        }

        let output = match child.wait_with_output() {
            Ok(output) => output,
            Err(err) => {
                spinner.finish_and_clear();
                return Err(FeldsparError::Solver(format!(
                    "{} did not finish: {}",
                    self.command, err
                )));
            }
        };

        spinner.finish_and_clear();

        Ok(SolverOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            status: output.status,
        })
    }
}
