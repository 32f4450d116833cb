//! AgentPulse CLI
//!
//! Runs a simulated agent workload against the telemetry engine and writes
//! JSON exports, useful for demos and smoke-testing a deployment.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use rand::Rng;
use tracing::info;

use agentpulse::alerting::{AlertNotifier, EmailHandler, NotificationQueue};
use agentpulse::collector::TelemetryCollector;
use agentpulse::config::TelemetryConfig;
use agentpulse::export::JsonExporter;
use agentpulse::models::{AlertPayload, AlertSeverity};

/// AgentPulse - telemetry engine for autonomous agents
#[derive(Parser)]
#[command(name = "agentpulse")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory for JSON export files
    #[arg(short, long, default_value = "./telemetry", env = "AGENTPULSE_OUTPUT_DIR")]
    output_dir: String,

    /// Seconds between background export passes
    #[arg(long, default_value = "60", env = "AGENTPULSE_EXPORT_INTERVAL")]
    export_interval: u64,

    /// Number of simulated agents
    #[arg(long, default_value = "3")]
    agents: usize,

    /// Executions simulated per agent
    #[arg(long, default_value = "20")]
    iterations: usize,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let mut config = TelemetryConfig::default();
    config.collector.export_interval_secs = cli.export_interval;

    let collector = Arc::new(TelemetryCollector::new(&config));
    collector
        .add_exporter(Arc::new(
            JsonExporter::new(&cli.output_dir).context("creating export directory")?,
        ))
        .await;
    collector.start();

    let queue = Arc::new(NotificationQueue::new(&config.notifications));
    let mut notifier = AlertNotifier::new(Arc::clone(&queue));
    notifier.add_handler(Arc::new(EmailHandler::new(vec![
        "oncall@example.com".to_string(),
    ])));

    info!(agents = cli.agents, iterations = cli.iterations, "simulating agent workload");
    simulate_workload(&collector, &queue, cli.agents, cli.iterations)?;

    let delivered = notifier.dispatch_pending().await;
    info!(delivered, suppressed = queue.stats().suppressed, "alert dispatch finished");

    collector
        .export_to_file(&cli.output_dir)
        .await
        .context("writing final export")?;

    let summary = collector.metrics_summary();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    println!("{}", serde_json::to_string_pretty(&collector.health_status())?);

    collector.stop().await;
    Ok(())
}

fn simulate_workload(
    collector: &TelemetryCollector,
    queue: &NotificationQueue,
    agents: usize,
    iterations: usize,
) -> anyhow::Result<()> {
    let models = ["atlas-small", "atlas-large"];
    let tools = ["search", "calculator", "code_interpreter"];
    let mut rng = rand::thread_rng();

    for agent in 0..agents {
        let agent_id = format!("agent-{agent}");
        for _ in 0..iterations {
            let model = models[rng.gen_range(0..models.len())];
            let prompt_tokens = rng.gen_range(200..2000);
            let completion_tokens = rng.gen_range(50..800);
            let latency_ms = rng.gen_range(80.0..1500.0);
            collector.record_llm_call(
                model,
                prompt_tokens,
                completion_tokens,
                latency_ms,
                Some(f64::from(prompt_tokens + completion_tokens) * 2e-6),
                None,
            )?;

            let tool = tools[rng.gen_range(0..tools.len())];
            let tool_ok = rng.gen_bool(0.95);
            collector.record_tool_execution(
                tool,
                rng.gen_range(5.0..250.0),
                tool_ok,
                (!tool_ok).then_some("tool timed out"),
            )?;

            let success = rng.gen_bool(0.9);
            let duration_ms = latency_ms + rng.gen_range(20.0..400.0);
            collector.record_agent_execution(
                &agent_id,
                duration_ms,
                success,
                u64::from(prompt_tokens + completion_tokens),
                (!success).then_some("execution failed"),
                None,
            )?;

            if !success {
                // Repeats inside the dedup window are suppressed.
                queue.enqueue(&AlertPayload {
                    alert_id: format!("{agent_id}-failures"),
                    rule_id: "agent-failure-rate".to_string(),
                    timestamp: Utc::now(),
                    severity: AlertSeverity::Warning,
                    message: format!("{agent_id} reported a failed execution"),
                    acknowledged: false,
                });
            }

            std::thread::sleep(Duration::from_millis(2));
        }
    }
    Ok(())
}
