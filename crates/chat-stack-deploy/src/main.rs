//! chat-stack-deploy: deployment planner for the WebSocket chat system
//!
//! Computes ordered creation/teardown plans for the chat stack and runs the
//! one-shot SQS queue cleanup that teardown relies on.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use chat_stack_common::defaults::{DEFAULT_APP_VERSION, DEFAULT_CLEANUP_TIMEOUT_SECS, DEFAULT_REGION};
use chat_stack_common::tags::QUEUE_NAME_PREFIX;
use chat_stack_deploy::aws::{AwsContext, CleanupConfig, QueueCleanup, SqsClient};
use chat_stack_deploy::config::StackConfig;
use chat_stack_deploy::plan::DeploymentPlan;
use chat_stack_deploy::stack::chat_system_stack;

#[derive(Parser, Debug)]
#[command(name = "chat-stack-deploy")]
#[command(about = "Deployment planning for the WebSocket chat system")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute the ordered deployment and teardown plan for the chat stack
    Plan {
        /// Application version used to derive the server jar name
        #[arg(long, default_value = DEFAULT_APP_VERSION)]
        app_version: String,

        /// AWS region the plan targets
        #[arg(long, default_value = DEFAULT_REGION)]
        region: String,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,

        /// Write the JSON plan to a file
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Delete dynamically created chat-room queues left behind by the stack
    CleanupQueues {
        /// AWS region to clean
        #[arg(long, default_value = DEFAULT_REGION)]
        region: String,

        /// AWS profile to use (overrides AWS_PROFILE env var)
        #[arg(long)]
        aws_profile: Option<String>,

        /// Queue name prefix to enumerate
        #[arg(long, default_value = QUEUE_NAME_PREFIX)]
        queue_prefix: String,

        /// Maximum duration for the run, in seconds
        #[arg(long, default_value_t = DEFAULT_CLEANUP_TIMEOUT_SECS)]
        timeout_secs: u64,

        /// Actually delete queues (default is dry-run)
        #[arg(long)]
        execute: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Plan {
            app_version,
            region,
            format,
            output,
        } => {
            handle_plan(app_version, region, format, output)?;
        }

        Command::CleanupQueues {
            region,
            aws_profile,
            queue_prefix,
            timeout_secs,
            execute,
        } => {
            handle_cleanup_queues(region, aws_profile, queue_prefix, timeout_secs, execute)
                .await?;
        }
    }

    Ok(())
}

/// Handle the plan command
fn handle_plan(
    app_version: String,
    region: String,
    format: String,
    output: Option<PathBuf>,
) -> Result<()> {
    let mut config = StackConfig::default();
    config.artifact.version = app_version;
    config.aws.region = region;

    info!(
        jar = %config.artifact.jar_file_name(),
        region = %config.aws.region,
        "Computing deployment plan"
    );

    let stack = chat_system_stack(&config).context("Stack declaration is invalid")?;
    let plan = DeploymentPlan::compute(&stack).context("Failed to order the stack")?;

    if let Some(path) = &output {
        std::fs::write(path, plan.to_json()?)
            .with_context(|| format!("Failed to write plan to {}", path.display()))?;
        info!(path = %path.display(), "Plan written");
    }

    if format == "json" {
        println!("{}", plan.to_json()?);
        return Ok(());
    }

    println!("\n=== Creation order ===");
    println!("{:<4} {:<28} {:<15}", "#", "RESOURCE", "KIND");
    println!("{}", "-".repeat(48));
    for (i, step) in plan.creation.iter().enumerate() {
        println!("{:<4} {:<28} {:<15}", i + 1, step.id, step.kind.as_str());
    }

    println!("\n=== Teardown order ===");
    println!("{:<4} {:<28} {:<15} {:<12}", "#", "RESOURCE", "KIND", "ACTION");
    println!("{}", "-".repeat(61));
    for (i, step) in plan.destruction.iter().enumerate() {
        println!(
            "{:<4} {:<28} {:<15} {:<12}",
            i + 1,
            step.id,
            step.kind.as_str(),
            step.action,
        );
    }

    println!("\n=== Outputs ===");
    for out in &plan.outputs {
        println!("{:<28} {}", out.name, out.value);
    }

    Ok(())
}

/// Handle the cleanup-queues command
async fn handle_cleanup_queues(
    region: String,
    aws_profile: Option<String>,
    queue_prefix: String,
    timeout_secs: u64,
    execute: bool,
) -> Result<()> {
    let mode = if execute { "EXECUTE" } else { "DRY-RUN" };
    info!(
        region = %region,
        prefix = %queue_prefix,
        timeout_secs,
        mode,
        "Cleaning up chat-room queues"
    );
    if let Some(profile) = &aws_profile {
        info!(profile = %profile, "Using AWS profile");
    }

    let aws = AwsContext::with_profile(&region, aws_profile.as_deref()).await;
    let sqs = SqsClient::from_context(&aws);
    let config = CleanupConfig {
        queue_prefix,
        dry_run: !execute,
        timeout: std::time::Duration::from_secs(timeout_secs),
    };

    // Abort cleanly on Ctrl-C; queues not yet reached are simply left for
    // the next run.
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping cleanup");
            ctrl_c_cancel.cancel();
        }
    });

    let report = QueueCleanup::new(sqs, config).run(Some(&cancel)).await?;

    println!("\n=== Queue Cleanup Report ===");
    println!("Mode: {mode}");
    println!("Region: {region}");
    println!();
    println!("Deleted: {}", report.deleted);
    println!("Skipped: {}", report.skipped);
    if report.timed_out {
        println!("Status:  TIMED OUT (re-run to finish)");
    }
    if !report.errors.is_empty() {
        // Partial failures are warnings, not a failed run; teardown can
        // proceed past them.
        println!("\nFailed deletions:");
        for failure in &report.errors {
            println!("  {} - {}", failure.queue_url, failure.reason);
        }
    }
    if !execute {
        println!("\nRun with --execute to actually delete queues.");
    }

    Ok(())
}
