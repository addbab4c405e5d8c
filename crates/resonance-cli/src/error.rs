// SPDX-License-Identifier: GPL-3.0-or-later

//! Top-level error type, composed from each crate's own error enum and
//! mapped to the exit codes from SPEC §6/§7: `0` success, `1` user-visible
//! failure, `2` usage error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] resonance_config::ConfigError),
    #[error(transparent)]
    Scanner(#[from] resonance_scanner::ScannerError),
    #[error(transparent)]
    State(#[from] resonance_state::StateStoreError),
    #[error(transparent)]
    Resolver(#[from] resonance_resolver::ResolverError),
    #[error(transparent)]
    Planner(#[from] resonance_planner::PlannerError),
    #[error(transparent)]
    Apply(#[from] resonance_planner::ApplyError),
    #[error("{0}")]
    UsageError(String),
    #[error("{0}")]
    Failure(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::UsageError(_) => 2,
            CliError::Config(_) => 2,
            _ => 1,
        }
    }
}
