//! CLI binary for inspecting, routing, sequencing, and validating navigation
//! trees.
//!
//! Device interaction is simulated: `--fail-*` flags script which actions or
//! verifications fail so a tree's dependency handling can be exercised
//! without hardware.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};

use navgraph_engine::{
    analyze_sequence, build_edge_validation_sequence, diagnose_unreachable, find_transitions,
    lint, CancellationToken, CascadePolicy, ClassifyingBridge, EngineConfig, NavigationGraph,
    Navigation, SequenceRunner, Severity, SimulatedBridge, SimulatedVerifier,
    SmartValidationEngine, StepStatus, Transition, ValidationEvent,
};
use navgraph_types::{NavError, TreeDocument};

#[derive(Parser)]
#[command(name = "navgraph", version, about = "UI navigation tree pathfinding and validation")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Engine config file (JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

/// Scripted device failures shared by the commands that drive a device.
#[derive(clap::Args, Debug, Default)]
struct SimulationArgs {
    /// Fail every action with this command name (repeatable)
    #[arg(long = "fail-command", value_name = "COMMAND")]
    fail_commands: Vec<String>,

    /// Fail actions whose parameter matches, e.g. `key=BACK` (repeatable)
    #[arg(long = "fail-param", value_name = "KEY=VALUE")]
    fail_params: Vec<String>,

    /// Fail the verifications of this node (repeatable)
    #[arg(long = "fail-verify", value_name = "NODE")]
    fail_verify: Vec<String>,

    /// Skip action and edge wait times
    #[arg(long)]
    no_wait: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a tree
    Info {
        /// Path to the tree .json file
        tree: PathBuf,
    },

    /// Lint a tree
    Check {
        /// Path to the tree .json file
        tree: PathBuf,
    },

    /// Print the route to a screen
    Path {
        /// Path to the tree .json file
        tree: PathBuf,

        /// Target node id
        #[arg(long)]
        to: String,

        /// Start node id (default: the app entry)
        #[arg(long)]
        from: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Build (and optionally run) the edge-validation sequence
    Sequence {
        /// Path to the tree .json file
        tree: PathBuf,

        /// Execute the sequence against the simulated device
        #[arg(long)]
        run: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        sim: SimulationArgs,
    },

    /// Validate every node with dependency-aware failure handling
    Validate {
        /// Path to the tree .json file
        tree: PathBuf,

        /// Abort only descendants that lose every route
        #[arg(long)]
        disconnected_only: bool,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        sim: SimulationArgs,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Info { tree } => cmd_info(&tree, &config)?,
        Commands::Check { tree } => cmd_check(&tree, &config)?,
        Commands::Path {
            tree,
            to,
            from,
            json,
        } => cmd_path(&tree, &config, &to, from.as_deref(), json)?,
        Commands::Sequence {
            tree,
            run,
            json,
            sim,
        } => cmd_sequence(&tree, config, run, json, &sim).await?,
        Commands::Validate {
            tree,
            disconnected_only,
            json,
            sim,
        } => {
            let mut config = config;
            if disconnected_only {
                config.cascade = CascadePolicy::DisconnectedOnly;
            }
            cmd_validate(&tree, config, json, &sim).await?
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<EngineConfig> {
    let config = match path {
        Some(p) => EngineConfig::load(p)?,
        None => EngineConfig::default(),
    };
    Ok(config.with_env_overrides())
}

fn load_tree(path: &Path, config: &EngineConfig) -> anyhow::Result<NavigationGraph> {
    let doc = TreeDocument::load(path)?;
    let graph = NavigationGraph::from_document(doc)?.with_home_ids(config.home_ids.clone());
    Ok(graph)
}

fn simulated_device(sim: &SimulationArgs) -> anyhow::Result<(ClassifyingBridge<SimulatedBridge>, SimulatedVerifier)> {
    let mut bridge = SimulatedBridge::new();
    for command in &sim.fail_commands {
        bridge = bridge.fail_command(command.clone());
    }
    for spec in &sim.fail_params {
        let (key, value) = spec
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("--fail-param expects KEY=VALUE, got '{spec}'"))?;
        bridge = bridge.fail_param(key.trim(), value.trim());
    }
    let mut verifier = SimulatedVerifier::passing();
    for node in &sim.fail_verify {
        verifier = verifier.fail_node(node.clone());
    }
    Ok((ClassifyingBridge::new(bridge), verifier))
}

/// Cancel the token on Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping after the current step");
            token.cancel();
        }
    });
    cancel
}

/// Print step progress until the emitter is dropped.
async fn print_events(mut rx: broadcast::Receiver<ValidationEvent>, quiet: bool) {
    loop {
        match rx.recv().await {
            Ok(event) if !quiet => print_progress(&event),
            Ok(_) => {}
            Err(RecvError::Lagged(missed)) => {
                tracing::debug!(missed, "Progress printer lagged");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn print_progress(event: &ValidationEvent) {
    if let ValidationEvent::StepProgress {
        current_step,
        total_steps,
        from_node,
        to_node,
        status,
    } = event
    {
        if *status != StepStatus::Started {
            println!("[{current_step}/{total_steps}] {from_node} -> {to_node}: {status}");
        }
    }
}

fn cmd_info(path: &Path, config: &EngineConfig) -> anyhow::Result<()> {
    let graph = load_tree(path, config)?;

    if let Some(key) = &graph.key {
        println!("Tree: {key}");
    }
    println!("Nodes: {}", graph.node_count());
    println!("Edges: {}", graph.edge_count());

    let entry_points: Vec<_> = graph.entry_points().iter().map(|n| n.id.clone()).collect();
    println!("Entry points: {}", entry_points.join(", "));
    if let Some(home) = graph.home_node() {
        println!("Home: {} ({})", home.id, home.label);
    }
    if let Some(hub) = graph.hub_node() {
        println!("Hub: {} (degree {})", hub.id, graph.degree(&hub.id));
    }
    println!(
        "Acyclic: {}",
        if graph.topological_order().is_some() { "yes" } else { "no" }
    );
    println!("Components: {}", graph.weakly_connected_components().len());

    println!("\nNodes:");
    for node in graph.all_nodes() {
        println!(
            "  {} [{}] type={} out={} in={} checks={}",
            node.id,
            node.label,
            node.node_type,
            graph.out_degree(&node.id),
            graph.in_degree(&node.id),
            node.verifications.len()
        );
    }

    Ok(())
}

fn cmd_check(path: &Path, config: &EngineConfig) -> anyhow::Result<()> {
    let graph = load_tree(path, config)?;
    let diagnostics = lint(&graph);

    if diagnostics.is_empty() {
        println!("Tree is valid");
        return Ok(());
    }

    let mut has_error = false;
    for diag in &diagnostics {
        has_error |= diag.severity == Severity::Error;
        println!("[{}] {}: {}", diag.severity, diag.rule, diag.message);
        if let Some(fix) = &diag.fix {
            println!("       fix: {fix}");
        }
    }

    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

#[derive(Serialize)]
struct PathOutput<'a> {
    target: &'a str,
    start: Option<&'a str>,
    already_at_target: bool,
    transitions: &'a [Transition],
}

fn cmd_path(
    path: &Path,
    config: &EngineConfig,
    to: &str,
    from: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let graph = load_tree(path, config)?;
    let navigation = match find_transitions(&graph, to, from) {
        Ok(nav) => nav,
        Err(NavError::NoPath { from: start, to }) => {
            let diag = diagnose_unreachable(&graph, &start, &to);
            println!("[ERROR] No navigation path from '{start}' to '{to}'");
            println!("  components: {}", diag.component_count);
            println!("  same component: {}", diag.same_component);
            println!("  reachable from {start}: {}", diag.reachable_from_start.join(", "));
            println!("  can reach {to}: {}", diag.reaching_target.join(", "));
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    if json {
        let output = PathOutput {
            target: to,
            start: from,
            already_at_target: navigation.is_already_at_target(),
            transitions: navigation.transitions(),
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    match &navigation {
        Navigation::AlreadyAtTarget => println!("Already at '{to}'"),
        Navigation::Route(route) => {
            for t in route {
                println!(
                    "{:>3}. {} -> {}  ({} actions, {} retry)",
                    t.transition_number,
                    t.from_label,
                    t.to_label,
                    t.payload.actions.len(),
                    t.payload.retry_actions.len()
                );
            }
        }
    }
    Ok(())
}

async fn cmd_sequence(
    path: &Path,
    mut config: EngineConfig,
    run: bool,
    json: bool,
    sim: &SimulationArgs,
) -> anyhow::Result<()> {
    let graph = load_tree(path, &config)?;
    let steps = build_edge_validation_sequence(&graph);
    let analysis = analyze_sequence(&graph, &steps);

    if !run {
        if json {
            let output = serde_json::json!({ "steps": steps, "analysis": analysis });
            println!("{}", serde_json::to_string_pretty(&output)?);
            return Ok(());
        }
        for step in &steps {
            println!(
                "{:>3}. {} -> {}  [{}]",
                step.step_number, step.from_label, step.to_label, step.optimization_tag
            );
        }
        println!(
            "\n{} edges, {} navigation hops over {} gaps",
            analysis.edge_validations, analysis.navigation_hops, analysis.navigation_gaps
        );
        println!(
            "Efficiency: {:.1}% ({})",
            analysis.efficiency_ratio * 100.0,
            analysis.rating
        );
        println!(
            "Bidirectional pairs: {} ({} validated back to back)",
            analysis.bidirectional_pairs, analysis.bidirectional_immediate
        );
        return Ok(());
    }

    if sim.no_wait {
        config.honor_wait_times = false;
    }
    let (bridge, _) = simulated_device(sim)?;
    let cancel = cancel_on_ctrl_c();

    let runner = SequenceRunner::new(&graph, config);
    let rx = runner.events().subscribe();
    let printer = tokio::spawn(print_events(rx, json));
    let report = runner.run(&steps, &bridge, &cancel).await;
    drop(runner);
    let _ = printer.await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "\nSequence: {} passed, {} failed, {} skipped, {} navigation hops{}",
            report.passed,
            report.failed,
            report.skipped,
            report.navigation_hops,
            if report.cancelled { " (cancelled)" } else { "" }
        );
    }

    if report.cancelled {
        return Err(NavError::Cancelled.into());
    }
    if report.failed > 0 || report.skipped > 0 {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_validate(
    path: &Path,
    mut config: EngineConfig,
    json: bool,
    sim: &SimulationArgs,
) -> anyhow::Result<()> {
    let graph = load_tree(path, &config)?;
    if sim.no_wait {
        config.honor_wait_times = false;
    }
    let (bridge, verifier) = simulated_device(sim)?;

    let engine = SmartValidationEngine::new(&graph, config);
    let rx = engine.events().subscribe();
    let printer = tokio::spawn(print_events(rx, json));

    let cancel = cancel_on_ctrl_c();
    let result = engine.run(&bridge, &verifier, &cancel).await;
    // The engine (and its sender) is gone; the printer drains and exits.
    let _ = printer.await;
    let summary = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for warning in summary
            .diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
        {
            println!("[WARN] {}: {}", warning.rule, warning.message);
        }
        println!("\nValidation run {}", summary.run_id);
        println!(
            "Validated: {}  Failed: {}  Skipped: {}  Pending: {}",
            summary.validated, summary.failed, summary.skipped, summary.pending
        );
        println!(
            "Navigation failures: {}  Verification failures: {}  Retry rescues: {}",
            summary.navigation_failures, summary.verification_failures, summary.retry_rescues
        );
        println!(
            "Success rate: {:.1}%  Health: {}{}",
            summary.success_rate * 100.0,
            summary.health,
            if summary.cancelled { "  (cancelled)" } else { "" }
        );
        for result in summary.results.iter().filter(|r| r.reason.is_some()) {
            println!(
                "  {} [{}]: {}",
                result.node_id,
                result.status,
                result.reason.as_deref().unwrap_or_default()
            );
        }
    }

    if summary.cancelled {
        return Err(NavError::Cancelled.into());
    }
    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}
