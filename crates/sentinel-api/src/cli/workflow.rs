//! CLI workflow subcommands.
//!
//! Provides create, list, show, run, status, executions, cancel and complete
//! operations over workflow definitions and executions.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use uuid::Uuid;

use sentinel_core::workflow::definition::{WorkflowError, load_workflow_file};
use sentinel_types::workflow::{
    ExecutionSnapshot, ExecutionStatus, StepResult, StepStatus, WorkflowExecution,
};

use crate::state::AppState;

/// Workflow management subcommands.
#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Register a workflow from a YAML or JSON file.
    Create {
        /// Path to the workflow definition (.yaml, .yml or .json).
        file: PathBuf,
    },

    /// List registered workflows, newest first.
    #[command(alias = "ls")]
    List {
        /// Page size (0 uses the default of 50, capped at 100).
        #[arg(long, default_value = "0")]
        limit: u32,

        /// Number of workflows to skip.
        #[arg(long, default_value = "0")]
        offset: u32,
    },

    /// Show a workflow definition and its steps.
    Show {
        /// Workflow UUID.
        id: String,
    },

    /// Execute a workflow and follow it until it finishes.
    Run {
        /// Workflow UUID.
        id: String,

        /// Poll interval in milliseconds while waiting.
        #[arg(long, default_value = "200")]
        poll_ms: u64,
    },

    /// Show the status and step results of an execution.
    Status {
        /// Execution UUID.
        execution_id: String,
    },

    /// List recent executions of a workflow.
    Executions {
        /// Workflow UUID.
        workflow_id: String,

        /// Maximum number of executions to display.
        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Mark an execution as cancelled.
    Cancel {
        /// Execution UUID.
        execution_id: String,
    },

    /// Mark an execution as completed.
    Complete {
        /// Execution UUID.
        execution_id: String,
    },
}

/// Handle a workflow subcommand.
pub async fn handle_workflow_command(
    cmd: WorkflowCommand,
    state: &AppState,
    json: bool,
) -> Result<()> {
    match cmd {
        WorkflowCommand::Create { file } => handle_create(&file, state, json).await,
        WorkflowCommand::List { limit, offset } => handle_list(limit, offset, state, json).await,
        WorkflowCommand::Show { id } => handle_show(&id, state, json).await,
        WorkflowCommand::Run { id, poll_ms } => handle_run(&id, poll_ms, state, json).await,
        WorkflowCommand::Status { execution_id } => {
            handle_status(&execution_id, state, json).await
        }
        WorkflowCommand::Executions { workflow_id, limit } => {
            handle_executions(&workflow_id, limit, state, json).await
        }
        WorkflowCommand::Cancel { execution_id } => {
            handle_set_status(&execution_id, "cancelled", state, json).await
        }
        WorkflowCommand::Complete { execution_id } => {
            handle_set_status(&execution_id, "completed", state, json).await
        }
    }
}

fn parse_uuid(raw: &str, what: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("Invalid {what} id '{raw}'"))
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

async fn handle_create(file: &Path, state: &AppState, json: bool) -> Result<()> {
    let req = load_workflow_file(file).map_err(|e| match e {
        WorkflowError::ParseError(msg) => anyhow::anyhow!("Failed to parse workflow file: {msg}"),
        WorkflowError::IoError(err) => {
            anyhow::anyhow!("Failed to read {}: {err}", file.display())
        }
        other => anyhow::anyhow!("Failed to load workflow: {other}"),
    })?;

    let created = state.workflow_service.create_workflow(req).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&created)?);
    } else {
        println!();
        println!(
            "  {} Created workflow '{}'",
            style("*").green().bold(),
            style(&created.name).cyan()
        );
        println!("  ID: {}", created.id);
        println!("  Version: {}", created.version);
        println!("  Steps: {}", created.step_count);
        println!();
        println!(
            "  Run it with: {}",
            style(format!("sentinel workflow run {}", created.id)).dim()
        );
        println!();
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// List / Show
// ---------------------------------------------------------------------------

async fn handle_list(limit: u32, offset: u32, state: &AppState, json: bool) -> Result<()> {
    let page = state.workflow_service.list_workflows(limit, offset).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    if page.workflows.is_empty() {
        println!();
        println!("  No workflows registered.");
        println!(
            "  Create one with: {}",
            style("sentinel workflow create <file.yaml>").dim()
        );
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").fg(Color::Cyan),
            Cell::new("Name").fg(Color::Cyan),
            Cell::new("Version").fg(Color::Cyan),
            Cell::new("Steps").fg(Color::Cyan),
            Cell::new("Created").fg(Color::Cyan),
        ]);

    for wf in &page.workflows {
        table.add_row(vec![
            Cell::new(wf.id),
            Cell::new(&wf.name),
            Cell::new(&wf.version),
            Cell::new(wf.step_count),
            Cell::new(wf.created_at.format("%Y-%m-%d %H:%M")),
        ]);
    }

    println!();
    println!("{table}");
    println!(
        "  {} of {} workflow(s), offset {}",
        page.workflows.len(),
        page.total,
        page.offset
    );
    println!();

    Ok(())
}

async fn handle_show(id: &str, state: &AppState, json: bool) -> Result<()> {
    let id = parse_uuid(id, "workflow")?;
    let def = state.workflow_service.get_workflow(&id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&def)?);
        return Ok(());
    }

    println!();
    println!(
        "  {} {}",
        style(&def.name).cyan().bold(),
        style(format!("v{}", def.version)).dim()
    );
    if let Some(desc) = &def.description {
        println!("  {desc}");
    }
    println!("  ID: {}", def.id);
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Tool").fg(Color::Cyan),
            Cell::new("Depends On").fg(Color::Cyan),
            Cell::new("Retries").fg(Color::Cyan),
            Cell::new("Timeout").fg(Color::Cyan),
        ]);

    for step in &def.steps {
        let deps = if step.depends_on.is_empty() {
            "-".to_string()
        } else {
            step.depends_on.join(", ")
        };
        let timeout = step
            .timeout_ms
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            Cell::new(&step.id),
            Cell::new(&step.tool),
            Cell::new(deps),
            Cell::new(step.retry_count),
            Cell::new(timeout),
        ]);
    }

    println!("{table}");
    println!();

    Ok(())
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

async fn handle_run(id: &str, poll_ms: u64, state: &AppState, json: bool) -> Result<()> {
    let workflow_id = parse_uuid(id, "workflow")?;
    let service = &state.workflow_service;

    let started = service.execute_workflow(&workflow_id).await?;
    if !json {
        println!();
        println!(
            "  {} Started execution {} ({} steps)",
            style(">").green().bold(),
            style(started.execution_id).cyan(),
            started.step_count
        );
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(poll_ms.max(10)));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut last_progress = None;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                if !json {
                    println!("  {} Interrupted, cancelling execution", style("!").yellow().bold());
                }
                service.shutdown().await;
                break;
            }
            _ = ticker.tick() => {
                let snapshot = service.get_workflow_execution(&started.execution_id).await?;
                if !json && last_progress != Some(snapshot.progress) {
                    println!(
                        "  {:>3}%  {}",
                        snapshot.progress,
                        styled_status(snapshot.status)
                    );
                    last_progress = Some(snapshot.progress);
                }
                if snapshot.status.is_terminal() {
                    break;
                }
            }
        }
    }

    let execution = service.get_execution_detail(&started.execution_id).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&execution)?);
    } else {
        print_execution(&execution);
    }

    if execution.status == ExecutionStatus::Failed {
        let reason = execution
            .error
            .as_ref()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "unknown error".to_string());
        bail!("Workflow execution failed: {reason}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Status / Executions
// ---------------------------------------------------------------------------

async fn handle_status(execution_id: &str, state: &AppState, json: bool) -> Result<()> {
    let id = parse_uuid(execution_id, "execution")?;
    let execution = state.workflow_service.get_execution_detail(&id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&execution)?);
    } else {
        println!();
        print_execution(&execution);
    }
    Ok(())
}

async fn handle_executions(
    workflow_id: &str,
    limit: u32,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let id = parse_uuid(workflow_id, "workflow")?;
    let executions = state
        .workflow_service
        .list_workflow_executions(&id, limit)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&executions)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!();
        println!("  No executions found for workflow {id}.");
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Execution").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
            Cell::new("Progress").fg(Color::Cyan),
            Cell::new("Started").fg(Color::Cyan),
            Cell::new("Error").fg(Color::Cyan),
        ]);

    for exec in &executions {
        table.add_row(snapshot_row(exec));
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}

fn snapshot_row(exec: &ExecutionSnapshot) -> Vec<Cell> {
    let started = exec
        .started_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string());
    let error = exec
        .error
        .as_ref()
        .map(|e| e.message.clone())
        .unwrap_or_default();
    vec![
        Cell::new(exec.id),
        Cell::new(exec.status).fg(execution_color(exec.status)),
        Cell::new(format!("{}%", exec.progress)),
        Cell::new(started),
        Cell::new(error),
    ]
}

// ---------------------------------------------------------------------------
// Cancel / Complete
// ---------------------------------------------------------------------------

async fn handle_set_status(
    execution_id: &str,
    status: &str,
    state: &AppState,
    json: bool,
) -> Result<()> {
    let id = parse_uuid(execution_id, "execution")?;
    let update = state
        .workflow_service
        .update_workflow_status(&id, status)
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&update)?);
    } else {
        println!();
        println!(
            "  {} Execution {} is now {}",
            style("*").green().bold(),
            style(update.execution_id).cyan(),
            styled_status(update.status)
        );
        println!();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

fn execution_color(status: ExecutionStatus) -> Color {
    match status {
        ExecutionStatus::Pending => Color::Grey,
        ExecutionStatus::Running => Color::Yellow,
        ExecutionStatus::Completed => Color::Green,
        ExecutionStatus::Failed => Color::Red,
        ExecutionStatus::Cancelled => Color::DarkYellow,
    }
}

fn styled_status(status: ExecutionStatus) -> console::StyledObject<&'static str> {
    let text = status.as_str();
    match status {
        ExecutionStatus::Pending => style(text).dim(),
        ExecutionStatus::Running => style(text).yellow(),
        ExecutionStatus::Completed => style(text).green(),
        ExecutionStatus::Failed => style(text).red(),
        ExecutionStatus::Cancelled => style(text).yellow().dim(),
    }
}

fn step_status_cell(status: StepStatus) -> Cell {
    let (text, color) = match status {
        StepStatus::Pending => ("pending", Color::Grey),
        StepStatus::Running => ("running", Color::Yellow),
        StepStatus::Completed => ("completed", Color::Green),
        StepStatus::Failed => ("failed", Color::Red),
        StepStatus::Cancelled => ("cancelled", Color::DarkYellow),
    };
    Cell::new(text).fg(color)
}

fn step_row(step: &StepResult) -> Vec<Cell> {
    let duration = step
        .duration_ms
        .map(|ms| format!("{ms}ms"))
        .unwrap_or_else(|| "-".to_string());
    vec![
        Cell::new(&step.step_id),
        step_status_cell(step.status),
        Cell::new(step.attempts.len()),
        Cell::new(duration),
        Cell::new(step.error.as_deref().unwrap_or("")),
    ]
}

fn print_execution(execution: &WorkflowExecution) {
    println!(
        "  Execution {} {}  {}%",
        style(execution.id).cyan(),
        styled_status(execution.status),
        execution.progress
    );
    println!("  Workflow: {}", execution.workflow_id);
    if let Some(err) = &execution.error {
        let step = err
            .step_id
            .as_ref()
            .map(|s| format!(" (step '{s}')"))
            .unwrap_or_default();
        println!(
            "  {} {:?}: {}{step}",
            style("Error").red().bold(),
            err.code,
            err.message
        );
    }
    println!();

    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Step").fg(Color::Cyan),
            Cell::new("Status").fg(Color::Cyan),
            Cell::new("Attempts").fg(Color::Cyan),
            Cell::new("Duration").fg(Color::Cyan),
            Cell::new("Error").fg(Color::Cyan),
        ]);
    for step in &execution.steps {
        table.add_row(step_row(step));
    }

    println!("{table}");
    println!();
}
