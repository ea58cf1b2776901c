//! Executes the action lists attached to one edge.
//!
//! The primary list runs in order and stops at the first failure. If it fails
//! and the edge carries retry actions, the retry list runs the same way as an
//! all-or-nothing fallback. Waits are honored with `tokio::time::sleep` and
//! each action is bounded by the configured timeout.

use navgraph_types::{Action, EdgeActions, NavError, Result};
use serde::Serialize;

use crate::bridge::ExecutionBridge;
use crate::config::EngineConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransitionOutcome {
    pub success: bool,
    /// The primary list failed and the retry list was attempted.
    pub used_retry: bool,
    /// The retry list rescued the transition.
    pub retry_succeeded: bool,
    pub actions_executed: usize,
    pub errors: Vec<String>,
}

/// Run one action under the configured timeout, then its wait.
async fn run_action(
    bridge: &dyn ExecutionBridge,
    action: &Action,
    config: &EngineConfig,
) -> Result<()> {
    match tokio::time::timeout(config.action_timeout(), bridge.execute_action(action)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(NavError::ActionTimeout {
                command: action.command.clone(),
                timeout_ms: config.action_timeout_ms,
            })
        }
    }
    if config.honor_wait_times && action.wait_time_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(action.wait_time_ms)).await;
    }
    Ok(())
}

/// Run a list in order; returns the number of actions that completed before
/// the first error.
async fn run_list(
    bridge: &dyn ExecutionBridge,
    actions: &[Action],
    config: &EngineConfig,
) -> (usize, Option<NavError>) {
    for (i, action) in actions.iter().enumerate() {
        if let Err(e) = run_action(bridge, action, config).await {
            return (i + 1, Some(e));
        }
    }
    (actions.len(), None)
}

/// Execute an edge's payload. `edge` is only used for logging.
pub async fn execute_transition(
    bridge: &dyn ExecutionBridge,
    payload: &EdgeActions,
    edge: (&str, &str),
    config: &EngineConfig,
) -> TransitionOutcome {
    let (from, to) = edge;
    let mut outcome = TransitionOutcome::default();

    let (executed, error) = run_list(bridge, &payload.actions, config).await;
    outcome.actions_executed += executed;
    match error {
        None => outcome.success = true,
        Some(e) => {
            tracing::warn!(from = %from, to = %to, error = %e, "Primary actions failed");
            outcome.errors.push(e.to_string());
            if payload.has_retry() {
                outcome.used_retry = true;
                tracing::info!(from = %from, to = %to, count = payload.retry_actions.len(), "Running retry actions");
                let (executed, error) = run_list(bridge, &payload.retry_actions, config).await;
                outcome.actions_executed += executed;
                match error {
                    None => {
                        outcome.success = true;
                        outcome.retry_succeeded = true;
                    }
                    Some(e) => {
                        tracing::warn!(from = %from, to = %to, error = %e, "Retry actions failed");
                        outcome.errors.push(e.to_string());
                    }
                }
            }
        }
    }

    if outcome.success && config.honor_wait_times && payload.final_wait_time_ms > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(payload.final_wait_time_ms)).await;
    }
    outcome
}
