//! CodeForge CLI
//!
//! Runs one generation task from the command line and writes the project
//! plus its run memory into the output directory.

use anyhow::{Context, Result};
use clap::Parser;
use codeforge_core::orchestrator::{
    FileState, Orchestrator, OrchestratorConfig, OverallStatus, RunSummary,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Run memory export, relative to the output directory
const RUN_MEMORY_PATH: &str = ".codeforge/run_memory.json";

#[derive(Parser, Debug)]
#[command(author, version, about = "CodeForge - multi-agent code generator")]
struct Args {
    /// Task description; read interactively when omitted
    task: Option<String>,

    /// Directory the project is generated into
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Model used by every agent
    #[arg(short, long)]
    model: Option<String>,

    /// API key for the LLM provider (defaults to the provider's env var)
    #[arg(long)]
    api_key: Option<String>,

    /// Debug-level logging
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Multi-line task from stdin, ended by a line reading `EOF` or by end of
/// input
fn read_task_interactively() -> Result<String> {
    println!("Enter the task description (finish with a line containing only EOF, or Ctrl+D):");
    io::stdout().flush()?;

    let mut lines = Vec::new();
    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read task from stdin")?;
        if line.trim() == "EOF" {
            break;
        }
        lines.push(line);
    }
    Ok(lines.join("\n"))
}

fn print_banner() {
    println!("╔══════════════════════════════════════╗");
    println!("║              CODEFORGE               ║");
    println!("╚══════════════════════════════════════╝");
}

/// Generated files, skipping hidden entries such as the run memory
fn print_file_tree(root: &Path) {
    println!("\nGenerated files in {}:", root.display());
    let walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'));
    for entry in walker.filter_map(|e| e.ok()) {
        let indent = "  ".repeat(entry.depth());
        let name = entry.file_name().to_string_lossy();
        if entry.file_type().is_dir() {
            println!("{}{}/", indent, name);
        } else {
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            println!("{}{} ({} bytes)", indent, name, size);
        }
    }
}

fn print_summary(summary: &RunSummary, orchestrator: &Orchestrator) {
    let status = orchestrator.memory().status();
    println!("\nRun status: {:?}", summary.status);
    println!(
        "  files: {} accepted, {} kept at best score, {} failed",
        summary.count(FileState::Accepted),
        summary.count(FileState::BestKept),
        summary.count(FileState::Failed)
    );
    for file in &summary.files {
        println!(
            "  {:<32} {:?} (score {:.2}, {} fix attempts)",
            file.path, file.state, file.score, file.fix_attempts
        );
    }
    println!(
        "  tasks: {}/{} completed, {} errors logged, {} agent messages",
        status.tasks_completed, status.total_tasks, status.errors_count, status.communications_count
    );
    if let Some(path) = &summary.requirements {
        println!("  requirements: {}", path.display());
    }
}

fn write_run_memory(orchestrator: &Orchestrator) -> Result<PathBuf> {
    let path = orchestrator.output_dir().join(RUN_MEMORY_PATH);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = orchestrator.memory().to_json()?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

async fn run(args: Args) -> Result<OverallStatus> {
    let task = match args.task {
        Some(task) => task,
        None => read_task_interactively()?,
    };
    let task = task.trim().to_string();
    if task.is_empty() {
        anyhow::bail!("No task description provided");
    }

    print_banner();
    println!("Task: {}", task);
    println!("Output directory: {}", args.output_dir.display());

    let mut config = OrchestratorConfig::default().with_output_dir(&args.output_dir);
    if let Some(model) = args.model {
        config = config.with_model(model);
    }
    if let Some(key) = args.api_key {
        config = config.with_api_key(key);
    }

    let mut orchestrator = Orchestrator::new(config)?;
    let summary = orchestrator.run(&task).await?;

    print_file_tree(orchestrator.output_dir());
    print_summary(&summary, &orchestrator);
    match write_run_memory(&orchestrator) {
        Ok(path) => println!("  run memory: {}", path.display()),
        Err(e) => tracing::warn!("Could not export run memory: {:#}", e),
    }
    Ok(summary.status)
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["codeforge", "build a todo app"]);
        assert_eq!(args.task.as_deref(), Some("build a todo app"));
        assert_eq!(args.output_dir, PathBuf::from("output"));
        assert!(args.model.is_none());
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_flags() {
        let args = Args::parse_from([
            "codeforge", "-o", "site", "-m", "qwen-max", "--api-key", "k", "-v",
        ]);
        assert!(args.task.is_none());
        assert_eq!(args.output_dir, PathBuf::from("site"));
        assert_eq!(args.model.as_deref(), Some("qwen-max"));
        assert_eq!(args.api_key.as_deref(), Some("k"));
        assert!(args.verbose);
    }
}
