use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use atelier_core::config::AppConfig;
use atelier_core::error::Result as AtelierResult;
use atelier_core::event::EventBus;
use atelier_core::state::{StateDelta, WorkState};
use atelier_core::traits::{Notifier, StepExecutor};
use atelier_core::types::{StepKind, TaskEvent, TaskUpdate};
use atelier_graph::{build_steps, mermaid, plan_with, Brief, FixedCostModel, Graph};
use atelier_runtime::{Sweeper, WorkflowRuntime};
use atelier_store::TaskStore;

#[derive(Parser)]
#[command(name = "atelier", version, about = "Task-graph compiler and workflow runtime")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "atelier.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a brief and print its execution plan and diagram
    Plan {
        /// Task family (logo, code, ...)
        family: String,
        /// Extra brief fields as key=value pairs
        #[arg(trailing_var_arg = true)]
        fields: Vec<String>,
    },
    /// Submit a brief and run it with the built-in demo step executor
    Run {
        /// Task family (logo, code, ...)
        family: String,
        /// Extra brief fields as key=value pairs
        #[arg(trailing_var_arg = true)]
        fields: Vec<String>,
    },
    /// Show the effective configuration
    Config,
}

/// Demo step executor: logs each step and reports it done.
struct DemoExecutor;

impl StepExecutor for DemoExecutor {
    fn invoke(
        &self,
        kind: StepKind,
        name: &str,
        _state: &WorkState,
    ) -> BoxFuture<'_, AtelierResult<StateDelta>> {
        let name = name.to_string();
        Box::pin(async move {
            info!(step = %name, kind = %kind, "Demo step executed");
            let mut delta = StateDelta::new();
            delta.insert(
                name.to_lowercase().replace(' ', "_"),
                serde_json::json!("done"),
            );
            Ok(delta)
        })
    }
}

/// Demo notifier: logs terminal updates.
struct LogNotifier;

impl Notifier for LogNotifier {
    fn publish(&self, update: TaskUpdate) -> BoxFuture<'_, AtelierResult<()>> {
        Box::pin(async move {
            info!(task_id = %update.task_id, status = %update.status, "Task update published");
            Ok(())
        })
    }
}

fn parse_brief(family: &str, fields: &[String]) -> Brief {
    let mut brief = Brief::new(family);
    for field in fields {
        match field.split_once('=') {
            Some((key, value)) => {
                brief = brief.with_field(key, serde_json::json!(value));
            }
            None => warn!(field = %field, "Ignoring brief field without '='"),
        }
    }
    brief
}

fn load_config(path: &PathBuf) -> AppConfig {
    match AppConfig::load(path) {
        Ok(config) => config,
        Err(e) => {
            info!(path = %path.display(), error = %e, "Using default config");
            AppConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("atelier=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config);

    match cli.command {
        Commands::Plan { family, fields } => {
            let brief = parse_brief(&family, &fields);
            let graph = Graph::compile(build_steps(&brief));
            let costs = FixedCostModel {
                process_cost_ms: config.planner.process_cost_ms,
            };
            let plan = plan_with(&graph, &costs)?;

            println!("Steps:");
            for step in &plan.steps {
                println!(
                    "  {:<22} {:<24} {} ms",
                    step.node_id, step.name, step.estimated_cost_ms
                );
            }
            if !plan.parallel_groups.is_empty() {
                println!("Parallel groups:");
                for group in &plan.parallel_groups {
                    println!("  {}: {}", group.group_id, group.node_ids.join(", "));
                }
            }
            println!();
            println!("{}", mermaid::render(&graph));
        }
        Commands::Run { family, fields } => {
            let brief = parse_brief(&family, &fields);
            let store = Arc::new(TaskStore::new());
            let events = Arc::new(EventBus::new(config.runtime.event_capacity));

            let sweeper = Sweeper::new(
                store.clone(),
                std::time::Duration::from_secs(config.runtime.sweep_interval_secs),
                chrono::Duration::seconds(config.runtime.task_max_age_secs as i64),
            );
            let sweep_cancel = CancellationToken::new();
            tokio::spawn(sweeper.run(sweep_cancel.clone()));

            let runtime = WorkflowRuntime::new(
                config,
                store.clone(),
                Arc::new(DemoExecutor),
                Arc::new(LogNotifier),
                events.clone(),
            );

            let mut rx = events.subscribe();
            let submission = runtime.submit(&brief, None)?;
            println!("submitted task {} ({})", submission.task_id, submission.status);

            while let Ok(event) = rx.recv().await {
                match event {
                    TaskEvent::TaskCompleted { task_id } if task_id == submission.task_id => {
                        let task = store.get(&task_id).expect("completed task exists");
                        println!(
                            "{}",
                            serde_json::to_string_pretty(&task.result).unwrap_or_default()
                        );
                        break;
                    }
                    TaskEvent::TaskFailed { task_id, error } if task_id == submission.task_id => {
                        anyhow::bail!("task failed: {}", error);
                    }
                    _ => {}
                }
            }
            sweep_cancel.cancel();
        }
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
