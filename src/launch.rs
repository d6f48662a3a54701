use std::process::Command;

use crate::aws::AwsCredentialSet;
use crate::error::{BrokerError, Result};
use crate::interrupt;

pub trait Launcher {
    /// Runs `command` with the credentials in its environment and returns its
    /// exit code.
    fn launch(&self, command: &[String], credentials: &AwsCredentialSet) -> Result<i32>;
}

/// Runs the command directly (no shell) with inherited stdio and environment.
pub struct CommandLauncher;

impl Launcher for CommandLauncher {
    fn launch(&self, command: &[String], credentials: &AwsCredentialSet) -> Result<i32> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| BrokerError::Launch("no program specified".to_string()))?;
        log::debug!("launching program {} with args {:?}", program, args);

        // a terminal Ctrl-C reaches the child too; its exit code decides ours
        let _child = interrupt::child_running();
        let status = Command::new(program)
            .args(args)
            .envs(credentials.environment())
            .status()
            .map_err(|e| BrokerError::Launch(format!("{}: {}", program, e)))?;

        // a child killed by a signal has no code
        Ok(status.code().unwrap_or(1))
    }
}
