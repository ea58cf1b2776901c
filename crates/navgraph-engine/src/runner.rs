//! Executes an edge-validation sequence against a device.
//!
//! The runner tracks where the device is. When a step starts somewhere else
//! it first navigates there; if that navigation fails the step is skipped
//! and the next one re-enters from the app entry. Cancellation is checked
//! before each step.

use navgraph_types::Result;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::bridge::ExecutionBridge;
use crate::config::EngineConfig;
use crate::events::{EventEmitter, StepStatus, ValidationEvent};
use crate::executor::execute_transition;
use crate::graph::NavigationGraph;
use crate::pathfinder::{find_transitions, Navigation};
use crate::sequencer::{OptimizationTag, ValidationStep};

#[derive(Debug, Clone, Serialize)]
pub struct StepResult {
    pub step_number: usize,
    pub from_node: String,
    pub to_node: String,
    pub optimization_tag: OptimizationTag,
    pub status: StepStatus,
    /// Transitions executed to reach `from_node` before the step.
    pub navigation_hops: usize,
    pub used_retry: bool,
    pub retry_succeeded: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SequenceReport {
    pub run_id: Uuid,
    pub total_steps: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub navigation_hops: usize,
    pub cancelled: bool,
    pub results: Vec<StepResult>,
}

pub struct SequenceRunner<'g> {
    graph: &'g NavigationGraph,
    config: EngineConfig,
    events: EventEmitter,
}

impl<'g> SequenceRunner<'g> {
    pub fn new(graph: &'g NavigationGraph, config: EngineConfig) -> Self {
        let events = EventEmitter::new(config.event_capacity);
        Self {
            graph,
            config,
            events,
        }
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Where the device is assumed to be before the first step: the app
    /// entry when there is one, else the first step's source.
    fn initial_position(&self, steps: &[ValidationStep]) -> Option<String> {
        self.graph
            .entry_node()
            .or_else(|| self.graph.entry_points().into_iter().next())
            .map(|n| n.id.clone())
            .or_else(|| steps.first().map(|s| s.from_node.clone()))
    }

    /// Drive the device to `target`. Returns the number of hops executed.
    async fn navigate(
        &self,
        bridge: &dyn ExecutionBridge,
        position: Option<&str>,
        target: &str,
    ) -> Result<usize> {
        let route = match find_transitions(self.graph, target, position)? {
            Navigation::AlreadyAtTarget => return Ok(0),
            Navigation::Route(route) => route,
        };
        for (i, t) in route.iter().enumerate() {
            let outcome =
                execute_transition(bridge, &t.payload, (&t.from_node, &t.to_node), &self.config)
                    .await;
            if !outcome.success {
                return Err(navgraph_types::NavError::Other(format!(
                    "Navigation hop {} -> {} failed after {} of {} hops: {}",
                    t.from_node,
                    t.to_node,
                    i,
                    route.len(),
                    outcome.errors.join("; ")
                )));
            }
        }
        Ok(route.len())
    }

    pub async fn run(
        &self,
        steps: &[ValidationStep],
        bridge: &dyn ExecutionBridge,
        cancel: &CancellationToken,
    ) -> SequenceReport {
        let run_id = Uuid::new_v4();
        let total = steps.len();
        let mut position = self.initial_position(steps);
        let mut results = Vec::with_capacity(total);
        let mut cancelled = false;

        tracing::info!(run_id = %run_id, steps = total, "Sequence run started");
        self.events.emit(ValidationEvent::RunStarted {
            run_id: run_id.to_string(),
            node_count: self.graph.node_count(),
            total_steps: total,
        });

        for step in steps {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            self.progress(step, total, StepStatus::Started);

            let mut result = StepResult {
                step_number: step.step_number,
                from_node: step.from_node.clone(),
                to_node: step.to_node.clone(),
                optimization_tag: step.optimization_tag,
                status: StepStatus::Skipped,
                navigation_hops: 0,
                used_retry: false,
                retry_succeeded: false,
                errors: Vec::new(),
            };

            // Not raced against `cancel`: a step is never abandoned mid-action.
            let mut reached = true;
            if position.as_deref() != Some(step.from_node.as_str()) {
                match self.navigate(bridge, position.as_deref(), &step.from_node).await {
                    Ok(hops) => result.navigation_hops = hops,
                    Err(e) => {
                        tracing::warn!(step = step.step_number, to = %step.from_node, error = %e, "Could not reach step start");
                        result.errors.push(e.to_string());
                        reached = false;
                    }
                }
            }
            let finished = if reached {
                let outcome = execute_transition(
                    bridge,
                    &step.payload,
                    (&step.from_node, &step.to_node),
                    &self.config,
                )
                .await;
                result.used_retry = outcome.used_retry;
                result.retry_succeeded = outcome.retry_succeeded;
                result.errors.extend(outcome.errors);
                Some(outcome.success)
            } else {
                None
            };

            match finished {
                Some(true) => {
                    result.status = StepStatus::Passed;
                    position = Some(step.to_node.clone());
                }
                Some(false) => {
                    result.status = StepStatus::Failed;
                    position = None;
                }
                None => {
                    result.status = StepStatus::Skipped;
                    position = None;
                }
            }
            if result.used_retry {
                self.events.emit(ValidationEvent::TransitionRetrying {
                    from_node: step.from_node.clone(),
                    to_node: step.to_node.clone(),
                });
            }
            tracing::debug!(step = step.step_number, status = %result.status, "Step finished");
            self.progress(step, total, result.status);
            results.push(result);
        }

        let count = |s: StepStatus| results.iter().filter(|r| r.status == s).count();
        let report = SequenceReport {
            run_id,
            total_steps: total,
            passed: count(StepStatus::Passed),
            failed: count(StepStatus::Failed),
            skipped: count(StepStatus::Skipped),
            navigation_hops: results.iter().map(|r| r.navigation_hops).sum(),
            cancelled,
            results,
        };
        if cancelled {
            self.events.emit(ValidationEvent::RunCancelled {
                run_id: run_id.to_string(),
                completed_steps: report.results.len(),
            });
        }
        tracing::info!(
            run_id = %run_id,
            passed = report.passed,
            failed = report.failed,
            skipped = report.skipped,
            "Sequence run finished"
        );
        report
    }

    fn progress(&self, step: &ValidationStep, total: usize, status: StepStatus) {
        self.events.emit(ValidationEvent::StepProgress {
            current_step: step.step_number,
            total_steps: total,
            from_node: step.from_node.clone(),
            to_node: step.to_node.clone(),
            status,
        });
    }
}
