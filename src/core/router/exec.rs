// src/core/router/exec.rs

//! The terminal step of routing: the helper becomes the chosen program.

use super::rules::RoutingRule;
use crate::core::UpcallError;
use std::convert::Infallible;
use std::os::unix::process::CommandExt;
use std::process::Command;
use tracing::debug;

/// A fully expanded command, ready to replace the current process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecPlan {
    pub rule: RoutingRule,
    pub program: String,
    /// The complete argument vector, argument zero first.
    pub argv: Vec<String>,
}

impl ExecPlan {
    /// Replaces the process image. Only a failure ever returns.
    pub fn replace_process(self) -> Result<Infallible, UpcallError> {
        debug!("Run {}", self.program);
        for (i, arg) in self.argv.iter().enumerate() {
            debug!("- argv[{}] = \"{}\"", i, arg);
        }

        let mut command = Command::new(&self.program);
        if let Some((arg0, rest)) = self.argv.split_first() {
            command.arg0(arg0).args(rest);
        }
        let err = command.exec();

        Err(self
            .rule
            .error(format!("Failed to execute '{}': {}", self.program, err)))
    }
}
