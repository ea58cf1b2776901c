//! Collaborator seams between the engine and a real device.
//!
//! [`ExecutionBridge`] performs one action; [`VerificationBridge`] runs a
//! node's checks. Both are async traits so device adapters can do I/O. The
//! simulated implementations here drive dry runs and tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use navgraph_types::{Action, NavError, Result, VerificationResult, VerificationSpec};
use regex::Regex;

/// Executes a single action against the device under test.
#[async_trait]
pub trait ExecutionBridge: Send + Sync {
    async fn execute_action(&self, action: &Action) -> Result<()>;
}

/// Runs the verifications attached to a node once the device shows it.
#[async_trait]
pub trait VerificationBridge: Send + Sync {
    async fn run_verifications(
        &self,
        node_id: &str,
        specs: &[VerificationSpec],
    ) -> Result<Vec<VerificationResult>>;
}

/// Decides whether a failed action leaves the device in the intended state
/// anyway (e.g. launching an app that is already running).
pub trait FailureClassifier: Send + Sync {
    fn is_acceptable(&self, action: &Action, message: &str) -> bool;
}

/// Regex-based classifier over failure messages.
#[derive(Debug, Clone)]
pub struct AcceptableFailures {
    patterns: Vec<Regex>,
}

const STANDARD_PATTERNS: &[&str] = &[
    r"(?i)\balready (running|open|opened|launched|started|in foreground)\b",
    r"(?i)\b(app|application|process|activity) (is )?not running\b",
    r"(?i)\balready (closed|stopped)\b",
];

impl AcceptableFailures {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                Regex::new(p.as_ref())
                    .map_err(|e| NavError::Other(format!("Invalid failure pattern '{}': {e}", p.as_ref())))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// "already running" / "not running" style messages.
    pub fn standard() -> Self {
        Self {
            patterns: STANDARD_PATTERNS
                .iter()
                .filter_map(|p| Regex::new(p).ok())
                .collect(),
        }
    }

    pub fn none() -> Self {
        Self { patterns: Vec::new() }
    }
}

impl Default for AcceptableFailures {
    fn default() -> Self {
        Self::standard()
    }
}

impl FailureClassifier for AcceptableFailures {
    fn is_acceptable(&self, _action: &Action, message: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(message))
    }
}

/// Wraps a bridge and turns acceptable failures into successes.
pub struct ClassifyingBridge<B, C = AcceptableFailures> {
    inner: B,
    classifier: C,
}

impl<B: ExecutionBridge> ClassifyingBridge<B> {
    pub fn new(inner: B) -> Self {
        Self::with_classifier(inner, AcceptableFailures::standard())
    }
}

impl<B: ExecutionBridge, C: FailureClassifier> ClassifyingBridge<B, C> {
    pub fn with_classifier(inner: B, classifier: C) -> Self {
        Self { inner, classifier }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }
}

#[async_trait]
impl<B: ExecutionBridge, C: FailureClassifier> ExecutionBridge for ClassifyingBridge<B, C> {
    async fn execute_action(&self, action: &Action) -> Result<()> {
        match self.inner.execute_action(action).await {
            Err(NavError::ActionFailed { ref message, .. })
                if self.classifier.is_acceptable(action, message) =>
            {
                tracing::debug!(command = %action.command, %message, "Treating failure as acceptable");
                Ok(())
            }
            other => other,
        }
    }
}

type ActionPredicate = Box<dyn Fn(&Action) -> bool + Send + Sync>;

struct FailureRule {
    matches: ActionPredicate,
    message: String,
}

/// In-memory device: records every action and fails the ones matching a
/// configured rule.
#[derive(Default)]
pub struct SimulatedBridge {
    rules: Vec<FailureRule>,
    executed: Mutex<Vec<Action>>,
    latency: Duration,
}

impl SimulatedBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every action for which `predicate` returns true.
    pub fn fail_when<F>(mut self, message: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Action) -> bool + Send + Sync + 'static,
    {
        self.rules.push(FailureRule {
            matches: Box::new(predicate),
            message: message.into(),
        });
        self
    }

    pub fn fail_command(self, command: impl Into<String>) -> Self {
        let command = command.into();
        let message = format!("simulated failure of '{command}'");
        self.fail_when(message, move |a| a.command == command)
    }

    /// Fail actions whose parameter `key` equals `value` (string comparison
    /// for string params, JSON equality otherwise).
    pub fn fail_param(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        let message = format!("simulated failure on {key}={value}");
        self.fail_when(message, move |a| match a.params.get(&key) {
            Some(serde_json::Value::String(s)) => *s == value,
            Some(other) => other.to_string() == value,
            None => false,
        })
    }

    /// Sleep this long inside every action.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn executed(&self) -> Vec<Action> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn executed_commands(&self) -> Vec<String> {
        self.executed().into_iter().map(|a| a.command).collect()
    }
}

#[async_trait]
impl ExecutionBridge for SimulatedBridge {
    async fn execute_action(&self, action: &Action) -> Result<()> {
        self.executed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(action.clone());
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.rules.iter().find(|r| (r.matches)(action)) {
            Some(rule) => Err(NavError::ActionFailed {
                command: action.command.clone(),
                message: rule.message.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// Verifier that passes every check except on the listed nodes.
#[derive(Debug, Default)]
pub struct SimulatedVerifier {
    failing_nodes: HashSet<String>,
    calls: AtomicUsize,
}

impl SimulatedVerifier {
    pub fn passing() -> Self {
        Self::default()
    }

    pub fn fail_node(mut self, node_id: impl Into<String>) -> Self {
        self.failing_nodes.insert(node_id.into());
        self
    }

    /// Number of nodes verified so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VerificationBridge for SimulatedVerifier {
    async fn run_verifications(
        &self,
        node_id: &str,
        specs: &[VerificationSpec],
    ) -> Result<Vec<VerificationResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self.failing_nodes.contains(node_id);
        Ok(specs
            .iter()
            .map(|spec| {
                if failing {
                    VerificationResult::fail(format!("{} did not match on {node_id}", spec.command))
                } else {
                    VerificationResult::pass(format!("{} ok", spec.command))
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn standard_patterns_accept_already_running() {
        let classifier = AcceptableFailures::standard();
        let launch = Action::new("launch_app");
        assert!(classifier.is_acceptable(&launch, "App already running"));
        assert!(classifier.is_acceptable(&launch, "com.example is already in foreground"));
        assert!(classifier.is_acceptable(&Action::new("close_app"), "application not running"));
        assert!(!classifier.is_acceptable(&launch, "device offline"));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = AcceptableFailures::new(["(unclosed"]).unwrap_err();
        assert!(matches!(err, NavError::Other(_)));
    }

    #[tokio::test]
    async fn simulated_bridge_records_and_fails_by_rule() {
        let bridge = SimulatedBridge::new()
            .fail_command("swipe")
            .fail_param("key", "BACK");

        bridge.execute_action(&Action::new("tap")).await.unwrap();
        let err = bridge.execute_action(&Action::new("swipe")).await.unwrap_err();
        assert!(matches!(err, NavError::ActionFailed { ref command, .. } if command == "swipe"));

        let back = Action::new("press_key").with_param("key", json!("BACK"));
        assert!(bridge.execute_action(&back).await.is_err());
        let ok = Action::new("press_key").with_param("key", json!("OK"));
        assert!(bridge.execute_action(&ok).await.is_ok());

        assert_eq!(
            bridge.executed_commands(),
            vec!["tap", "swipe", "press_key", "press_key"]
        );
    }

    #[tokio::test]
    async fn classifying_bridge_swallows_acceptable_failures_only() {
        let inner = SimulatedBridge::new()
            .fail_when("App already running", |a| a.command == "launch_app")
            .fail_when("device offline", |a| a.command == "tap");
        let bridge = ClassifyingBridge::new(inner);

        assert!(bridge.execute_action(&Action::new("launch_app")).await.is_ok());
        let err = bridge.execute_action(&Action::new("tap")).await.unwrap_err();
        assert!(err.is_navigation_failure());
        assert_eq!(bridge.inner().executed().len(), 2);
    }

    #[tokio::test]
    async fn simulated_verifier_fails_listed_nodes() {
        let verifier = SimulatedVerifier::passing().fail_node("settings");
        let specs = vec![VerificationSpec::new("wait_for_element")];

        let ok = verifier.run_verifications("home", &specs).await.unwrap();
        assert!(ok.iter().all(|r| r.success));

        let bad = verifier.run_verifications("settings", &specs).await.unwrap();
        assert!(!bad[0].success);
        assert_eq!(verifier.calls(), 2);
    }
}
