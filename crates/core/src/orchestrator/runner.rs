//! # Orchestrator
//!
//! Drives one run from a natural-language task to a generated project:
//!
//! 1. planning: the planner turns the task into a [`Plan`]
//! 2. execution: a FIFO queue of plan tasks, one file at a time, each
//!    file going through generate, validate, evaluate and the fix loop
//! 3. completion: Python cross-file check, `requirements.txt`, final
//!    status
//!
//! A failure inside one file is recorded in the run memory and the run
//! moves on to the next file. Only setup (missing API key, unusable output
//! directory) returns an error.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::agents::{
    Evaluator, FileSpec, GenerationContext, Generator, Plan, Planner, Review, CODEGEN_ID,
    EVALUATOR_ID, PLANNER_ID,
};
use crate::knowledge::KnowledgeBase;
use crate::llm::LlmClient;
use crate::tools::executor::ProcessRunner;
use crate::tools::filesystem::{FileStore, LocalFileStore};
use crate::tools::search::{BraveSearch, OfflineSearch, WebSearch};
use crate::validation::{FileKind, ValidationEngine};

use super::config::OrchestratorConfig;
use super::events::{RunEvent, RunEventKind};
use super::fix_loop::{FileState, FixLoop};
use super::memory::{OverallStatus, Phase, RunMemory, TaskStatus};
use super::protocol::ProtocolMessage;
use super::related::{check_links, find_related_web_files};
use super::requirements::write_requirements;
use super::scheduler::{TaskItem, TaskQueue};

/// Content shorter than this (trimmed) is treated as a failed generation
const MIN_CONTENT_CHARS: usize = 10;

/// Score ceiling for a file that fails structural validation
const STRUCTURAL_FAILURE_CAP: f64 = 0.6;

const EMPTY_FIX_NOTE: &str = "[Previous fix attempt failed to generate valid content]";

/// Final state of one planned file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    /// Plan-relative path
    pub path: String,
    pub task_id: String,
    pub state: FileState,
    pub score: f64,
    pub fix_attempts: u32,
}

/// Result of [`Orchestrator::run`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub status: OverallStatus,
    pub plan: Plan,
    pub files: Vec<FileOutcome>,
    pub requirements: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl RunSummary {
    pub fn count(&self, state: FileState) -> usize {
        self.files.iter().filter(|f| f.state == state).count()
    }
}

/// Planner, generator and evaluator wired to one output directory
pub struct Orchestrator {
    config: OrchestratorConfig,
    planner: Planner,
    generator: Generator,
    evaluator: Evaluator,
    store: Arc<dyn FileStore>,
    knowledge: KnowledgeBase,
    memory: RunMemory,
    events: Vec<RunEvent>,
    event_tx: Option<mpsc::Sender<RunEvent>>,
}

impl Orchestrator {
    /// Build every collaborator from the configuration
    ///
    /// Fails when an agent has no API key or the output directory cannot
    /// be created.
    pub fn new(config: OrchestratorConfig) -> Result<Self> {
        let client = |agent: &str| -> Result<Arc<dyn LlmClient>> {
            let model_config = config.model_config(agent);
            let client = model_config.create_client().with_context(|| {
                format!(
                    "Cannot create LLM client for {} (provider: {}, model: {})",
                    agent,
                    model_config.provider.display_name(),
                    model_config.model
                )
            })?;
            Ok(Arc::new(client))
        };
        let planner_llm = client(PLANNER_ID)?;
        let codegen_llm = client(CODEGEN_ID)?;
        let evaluator_llm = client(EVALUATOR_ID)?;

        let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(&config.output_dir)?);
        let engine = Arc::new(ValidationEngine::default());

        let mut planner = Planner::new(planner_llm);
        let mut generator = Generator::new(codegen_llm);
        if config.enable_web_search {
            let search: Arc<dyn WebSearch> = match BraveSearch::from_env() {
                Some(brave) => Arc::new(brave),
                None => {
                    tracing::info!("BRAVE_API_KEY not set, using fallback search results");
                    Arc::new(OfflineSearch)
                }
            };
            planner = planner.with_search(search.clone(), config.search_top_k);
            generator = generator.with_search(search, config.search_top_k);
        }

        let mut evaluator = Evaluator::new(
            evaluator_llm,
            store.clone(),
            engine,
            config.target_quality_score,
        );
        if config.enable_execution {
            let runner =
                ProcessRunner::new().with_timeout(Duration::from_secs(config.execution_timeout_secs));
            evaluator = evaluator.with_runner(Arc::new(runner));
        }

        Ok(Self::from_parts(config, planner, generator, evaluator, store))
    }

    /// Assemble from already-built agents
    pub fn from_parts(
        config: OrchestratorConfig,
        planner: Planner,
        generator: Generator,
        evaluator: Evaluator,
        store: Arc<dyn FileStore>,
    ) -> Self {
        let knowledge = KnowledgeBase::new().with_root(store.base_dir());
        Self {
            config,
            planner,
            generator,
            evaluator,
            store,
            knowledge,
            memory: RunMemory::new(),
            events: Vec::new(),
            event_tx: None,
        }
    }

    /// Forward run events to a channel as well
    pub fn with_event_channel(mut self, tx: mpsc::Sender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn memory(&self) -> &RunMemory {
        &self.memory
    }

    pub fn knowledge_base(&self) -> &KnowledgeBase {
        &self.knowledge
    }

    pub fn events(&self) -> &[RunEvent] {
        &self.events
    }

    pub fn output_dir(&self) -> &Path {
        self.store.base_dir()
    }

    async fn emit(&mut self, event: RunEvent) {
        self.events.push(event.clone());
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    // ========================================================================
    // Run
    // ========================================================================

    #[tracing::instrument(skip(self), fields(task_preview = %task.chars().take(50).collect::<String>()))]
    pub async fn run(&mut self, task: &str) -> Result<RunSummary> {
        self.memory.start();
        self.emit(RunEvent::new(RunEventKind::RunStarted, "orchestrator")).await;
        tracing::info!("Received task, output dir {}", self.output_dir().display());

        let plan = self.planning_phase(task).await?;

        self.memory.set_phase(Phase::Execution);
        let mut queue = TaskQueue::from_plan(&plan);
        let mut completed: HashSet<String> = HashSet::new();
        let mut outcomes = Vec::new();

        while let Some(item) = queue.next_ready(&completed) {
            tracing::info!("Starting {}: {}", item.task_id, item.description);
            let mut all_ok = true;
            for spec in &item.files {
                let outcome = match self.process_file(&item, spec, &plan, task).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        self.memory.log_error(&item.task_id, format!("{}: {:#}", spec.path, e));
                        self.memory.log_task(&item.task_id, &item.agent, TaskStatus::Failed, None);
                        self.emit(
                            RunEvent::new(RunEventKind::FileFailed, CODEGEN_ID)
                                .with_file(&spec.path)
                                .with_data(serde_json::json!({ "error": format!("{:#}", e) })),
                        )
                        .await;
                        self.memory.update_progress();
                        FileOutcome {
                            path: spec.path.clone(),
                            task_id: item.task_id.clone(),
                            state: FileState::Failed,
                            score: 0.0,
                            fix_attempts: 0,
                        }
                    }
                };
                all_ok &= outcome.state != FileState::Failed;
                outcomes.push(outcome);
            }
            if all_ok {
                completed.insert(item.task_id.clone());
            }
        }
        for blocked in queue.drain() {
            self.memory.log_error(
                &blocked.task_id,
                format!("Dependencies never completed: {:?}", blocked.dependencies),
            );
        }

        self.python_cross_file_check(&outcomes);

        let requirements = match write_requirements(self.store.base_dir()) {
            Ok(path) => path,
            Err(e) => {
                self.memory.log_error("requirements", format!("{:#}", e));
                None
            }
        };

        let status = self.memory.finish();
        tracing::info!(
            "Run finished with status {:?}: {} files, {} errors",
            status,
            outcomes.len(),
            self.memory.error_logs.len()
        );
        self.emit(
            RunEvent::new(RunEventKind::RunCompleted, "orchestrator")
                .with_data(serde_json::to_value(self.memory.status())?),
        )
        .await;

        Ok(RunSummary {
            status,
            plan,
            files: outcomes,
            requirements,
            output_dir: self.output_dir().to_path_buf(),
        })
    }

    async fn planning_phase(&mut self, task: &str) -> Result<Plan> {
        self.memory.decide("Starting planning phase");
        let started = Instant::now();
        let plan = self.planner.plan(task).await;
        self.memory
            .record_agent_call(PLANNER_ID, started.elapsed().as_secs_f64());
        self.memory.log_task(
            "planning_phase",
            PLANNER_ID,
            TaskStatus::Completed,
            Some(serde_json::to_value(&plan)?),
        );

        for (i, t) in plan.task_list.iter().enumerate() {
            let files: Vec<&str> = t.files.iter().map(|f| f.path.as_str()).collect();
            tracing::info!(" {}. {} -> files: {:?}", i + 1, t.task, files);
        }
        self.emit(
            RunEvent::new(RunEventKind::PlanReady, PLANNER_ID).with_data(serde_json::json!({
                "tasks": plan.task_list.len(),
                "files": plan.file_count(),
            })),
        )
        .await;
        Ok(plan)
    }

    // ========================================================================
    // Per file
    // ========================================================================

    fn knowledge_context(&self, path: &Path) -> String {
        match FileKind::from_path(path) {
            FileKind::Python => self.knowledge.generate_import_context(path),
            kind if kind.is_web() => self.knowledge.generate_web_file_context(path),
            _ => self.knowledge.project_structure_summary(),
        }
    }

    /// Write a version of `rel` and index it
    fn persist(&mut self, path: &Path, rel: &str, content: &str, operation: &str) -> Result<()> {
        self.store.write(path, content)?;
        self.memory.record_version(rel, content, operation);
        self.knowledge.register(path, content);
        Ok(())
    }

    async fn process_file(
        &mut self,
        item: &TaskItem,
        spec: &FileSpec,
        plan: &Plan,
        user_task: &str,
    ) -> Result<FileOutcome> {
        let rel = spec.path.as_str();
        let path = self.store.resolve(rel)?;

        let knowledge_context = self.knowledge_context(&path);
        self.memory.log_communication(ProtocolMessage::planner_to_codegen(
            plan,
            spec,
            &knowledge_context,
        ));

        let context = GenerationContext::new(user_task)
            .with_plan(plan.clone())
            .with_knowledge_context(knowledge_context);
        let started = Instant::now();
        let content = self.generator.generate(spec, &context).await?;
        self.memory
            .record_agent_call(CODEGEN_ID, started.elapsed().as_secs_f64());

        self.persist(&path, rel, &content, "create")?;
        tracing::info!("Wrote {} ({} bytes)", rel, content.len());
        self.emit(
            RunEvent::new(RunEventKind::FileGenerated, CODEGEN_ID)
                .with_file(rel)
                .with_data(serde_json::json!({ "bytes": content.len() })),
        )
        .await;

        if content.trim().chars().count() < MIN_CONTENT_CHARS {
            tracing::warn!("Generated content is empty or too short for {}", rel);
            self.memory.log_task(
                &item.task_id,
                &item.agent,
                TaskStatus::Failed,
                Some(serde_json::json!("Empty content generated")),
            );
            self.emit(
                RunEvent::new(RunEventKind::FileFailed, CODEGEN_ID)
                    .with_file(rel)
                    .with_data(serde_json::json!({ "error": "Empty content generated" })),
            )
            .await;
            self.memory.update_progress();
            return Ok(FileOutcome {
                path: rel.to_string(),
                task_id: item.task_id.clone(),
                state: FileState::Failed,
                score: 0.0,
                fix_attempts: 0,
            });
        }

        self.memory
            .log_communication(ProtocolMessage::codegen_to_evaluator(rel, &content));

        let mut fix = FixLoop::new(
            &content,
            self.config.target_quality_score,
            self.config.max_fix_attempts,
        );
        let structural = self.structural_errors(&path, rel, plan);
        fix.validated();
        self.emit(
            RunEvent::new(RunEventKind::FileValidated, EVALUATOR_ID)
                .with_file(rel)
                .with_data(serde_json::json!({ "errors": structural })),
        )
        .await;

        let mut review = self.evaluate(&path, user_task, &structural).await;
        self.emit(
            RunEvent::new(RunEventKind::FileEvaluated, EVALUATOR_ID)
                .with_file(rel)
                .with_data(serde_json::json!({ "score": review.quality_score, "ok": review.ok })),
        )
        .await;

        if fix.evaluated(review.quality_score) != FileState::Accepted {
            tracing::info!(
                "Quality score {:.2} below target for {}, attempting fix",
                review.quality_score,
                rel
            );
            self.memory
                .log_communication(ProtocolMessage::evaluator_to_codegen(&review, &content));
            self.fix_loop(&mut fix, &mut review, item, &path, rel, plan, user_task)
                .await?;
        }

        let final_state = fix.state();
        let (kind, agent) = match final_state {
            FileState::Accepted => (RunEventKind::FileAccepted, EVALUATOR_ID),
            _ => (RunEventKind::FileBestKept, CODEGEN_ID),
        };
        self.memory.log_task(
            &item.task_id,
            &item.agent,
            TaskStatus::Completed,
            Some(serde_json::json!({ "file": rel, "score": fix.best_score() })),
        );
        self.emit(
            RunEvent::new(kind, agent)
                .with_file(rel)
                .with_data(serde_json::json!({
                    "score": fix.best_score(),
                    "attempts": fix.attempts(),
                })),
        )
        .await;

        if matches!(FileKind::from_path(&path), FileKind::Html | FileKind::Js) {
            self.link_check(&item.task_id, rel, fix.best_content(), plan);
        }
        self.memory.update_progress();

        Ok(FileOutcome {
            path: rel.to_string(),
            task_id: item.task_id.clone(),
            state: final_state,
            score: fix.best_score(),
            fix_attempts: fix.attempts(),
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn fix_loop(
        &mut self,
        fix: &mut FixLoop,
        review: &mut Review,
        item: &TaskItem,
        path: &Path,
        rel: &str,
        plan: &Plan,
        user_task: &str,
    ) -> Result<()> {
        while let Some(attempt) = fix.begin_attempt() {
            tracing::info!(
                "Fix attempt {}/{} for {} (best score: {:.2}, target: {})",
                attempt,
                self.config.max_fix_attempts,
                rel,
                fix.best_score(),
                self.config.target_quality_score
            );
            self.emit(
                RunEvent::new(RunEventKind::FixAttempt, CODEGEN_ID)
                    .with_file(rel)
                    .with_data(serde_json::json!({ "attempt": attempt })),
            )
            .await;

            let base = fix.fix_base().0.to_string();
            let started = Instant::now();
            let fixed = match self.generator.fix(&base, review).await {
                Ok(fixed) => fixed,
                Err(e) => {
                    tracing::warn!("Fix attempt {} failed for {}: {:#}", attempt, rel, e);
                    continue;
                }
            };
            self.memory
                .record_agent_call(CODEGEN_ID, started.elapsed().as_secs_f64());

            if fixed.trim().is_empty() {
                tracing::warn!("Fix attempt {} produced no content, retrying from the original", attempt);
                fix.record_empty();
                review.append_note(EMPTY_FIX_NOTE);
                continue;
            }

            self.persist(path, rel, &fixed, &format!("fix_attempt_{}", attempt))?;
            let structural = self.structural_errors(path, rel, plan);
            let reevaluated = self.evaluate(path, user_task, &structural).await;
            let previous_best = fix.best_score();
            let state = fix.record_attempt(&fixed, reevaluated.quality_score);
            tracing::info!(
                "Fix attempt {} score: {:.2} (best was {:.2})",
                attempt,
                reevaluated.quality_score,
                previous_best
            );
            self.memory.log_task(
                &format!("fix_{}_attempt_{}", item.task_id, attempt),
                CODEGEN_ID,
                TaskStatus::Completed,
                None,
            );
            *review = reevaluated;
            if state == FileState::Accepted {
                tracing::info!("Target score reached for {}", rel);
                return Ok(());
            }
        }

        if fix.needs_best_rewrite() {
            let best = fix.best_content().to_string();
            self.persist(path, rel, &best, "final_best")?;
        }
        fix.keep_best();
        tracing::info!(
            "Max attempts reached for {}, keeping best version (score {:.2})",
            rel,
            fix.best_score()
        );
        Ok(())
    }

    /// Evaluate and fold structural failures into the review
    async fn evaluate(&mut self, path: &Path, user_task: &str, structural: &[String]) -> Review {
        let started = Instant::now();
        let mut review = self.evaluator.review(path, Some(user_task)).await;
        self.memory
            .record_agent_call(EVALUATOR_ID, started.elapsed().as_secs_f64());

        if !structural.is_empty() {
            let label = match FileKind::from_path(path) {
                FileKind::Python => "Python validation issues",
                _ => "Web validation errors",
            };
            review.append_note(&format!("{}: {}", label, structural.join("; ")));
            let capped = review.quality_score.min(STRUCTURAL_FAILURE_CAP);
            review.set_score(capped, self.config.target_quality_score);
        }
        review
    }

    /// Blocking structural errors of the file as written
    ///
    /// Web files are validated together with their related planned files,
    /// but only the file's own errors count. Python files count syntax
    /// errors only.
    fn structural_errors(&self, path: &Path, rel: &str, plan: &Plan) -> Vec<String> {
        let engine = self.evaluator.engine();
        match FileKind::from_path(path) {
            FileKind::Python => engine.validate_python(path).syntax_errors,
            kind if kind.is_web() => {
                let related = find_related_web_files(rel, plan);
                let mut files = vec![path.to_path_buf()];
                files.extend(related.paths().map(|p| self.store.base_dir().join(p)));
                let validation = self.evaluator.validate_web_files(&files);
                if let Some(cross) = &validation.cross_file {
                    for issue in &cross.issues {
                        tracing::debug!("Cross-file note for {}: {}", rel, issue);
                    }
                }
                validation.errors_for(path)
            }
            _ => Vec::new(),
        }
    }

    /// Post-acceptance reference check; problems are logged, never fatal
    fn link_check(&mut self, task_id: &str, rel: &str, content: &str, plan: &Plan) {
        let related = find_related_web_files(rel, plan);
        let report = check_links(rel, content, &related, &self.knowledge);
        for warning in &report.warnings {
            tracing::warn!("Reference check for {}: {}", rel, warning);
        }
        for suggestion in &report.suggestions {
            tracing::info!("Reference suggestion for {}: {}", rel, suggestion);
        }
        if !report.valid {
            self.memory.log_error(
                task_id,
                format!("Reference check failed for {}: {}", rel, report.errors.join("; ")),
            );
        }
    }

    /// Once per run, across every Python file that was written
    fn python_cross_file_check(&mut self, outcomes: &[FileOutcome]) {
        let paths: Vec<PathBuf> = outcomes
            .iter()
            .filter(|o| o.state != FileState::Failed)
            .map(|o| self.store.base_dir().join(&o.path))
            .filter(|p| FileKind::from_path(p) == FileKind::Python)
            .collect();
        if paths.is_empty() {
            return;
        }
        let report = self.evaluator.engine().validate_python_project(&paths);
        for issue in report.issues {
            self.memory.log_error("python_cross_file", issue);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedLlm;
    use crate::llm::AssistantReply;
    use crate::tools::executor::AssumeInstalled;
    use tempfile::TempDir;

    const MAIN_PY: &str = "def main() -> None:\n    print(\"todo list\")\n\n\nif __name__ == \"__main__\":\n    main()\n";

    fn review_json(score: f64) -> String {
        serde_json::json!({
            "ok": score >= 0.7,
            "quality_score": score,
            "evaluation": {
                "modularity": "fine",
                "maintainability": "fine",
                "functional_completeness": "partial",
                "requirements_adherence": "partial"
            },
            "severity": "medium",
            "ai_quality_metrics": {
                "modularity": score,
                "maintainability": score,
                "functional_completeness": score,
                "requirements_adherence": score
            },
            "notes": "needs work"
        })
        .to_string()
    }

    fn orchestrator(
        dir: &TempDir,
        config: OrchestratorConfig,
        planner: Arc<ScriptedLlm>,
        codegen: Arc<ScriptedLlm>,
        evaluator: Arc<ScriptedLlm>,
    ) -> Orchestrator {
        let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(dir.path()).unwrap());
        let engine = Arc::new(ValidationEngine::new(Arc::new(AssumeInstalled)).with_js_syntax_check(false));
        let evaluator = Evaluator::new(evaluator, store.clone(), engine, config.target_quality_score);
        Orchestrator::from_parts(
            config,
            Planner::new(planner),
            Generator::new(codegen),
            evaluator,
            store,
        )
    }

    #[test]
    fn test_new_with_explicit_key() {
        let dir = TempDir::new().unwrap();
        let config = OrchestratorConfig::default()
            .with_output_dir(dir.path().join("out"))
            .with_api_key("test-key");
        let orch = Orchestrator::new(config).unwrap();
        assert!(orch.output_dir().is_dir());
        assert!(orch.memory().task_history.is_empty());
    }

    #[tokio::test]
    async fn test_offline_run_accepts_default_plan() {
        let dir = TempDir::new().unwrap();
        let codegen = Arc::new(ScriptedLlm::always(MAIN_PY));
        let mut orch = orchestrator(
            &dir,
            OrchestratorConfig::default(),
            Arc::new(ScriptedLlm::offline()),
            codegen.clone(),
            Arc::new(ScriptedLlm::offline()),
        );
        let (tx, mut rx) = mpsc::channel(64);
        orch = orch.with_event_channel(tx);

        let summary = orch.run("create a todo app").await.unwrap();

        assert_eq!(summary.status, OverallStatus::Completed);
        assert_eq!(summary.files.len(), 1);
        let file = &summary.files[0];
        assert_eq!(file.path, "main.py");
        assert_eq!(file.state, FileState::Accepted);
        assert_eq!(file.fix_attempts, 0);
        assert!((file.score - 0.8).abs() < 1e-9);
        assert_eq!(codegen.call_count(), 1);
        assert!(summary.requirements.is_none());
        assert_eq!(std::fs::read_to_string(dir.path().join("main.py")).unwrap(), MAIN_PY.trim());

        let memory = orch.memory();
        assert_eq!(memory.task_history[0].task_id, "planning_phase");
        assert_eq!(memory.versions("main.py").len(), 1);
        assert_eq!(memory.agent_communications.len(), 2);
        assert!(orch.knowledge_base().module("main").is_some());
        assert!(orch.events().iter().all(|e| e.kind != RunEventKind::FixAttempt));

        let mut streamed = Vec::new();
        while let Ok(event) = rx.try_recv() {
            streamed.push(event.kind);
        }
        assert_eq!(streamed.first(), Some(&RunEventKind::RunStarted));
        assert_eq!(streamed.last(), Some(&RunEventKind::RunCompleted));
        assert!(streamed.contains(&RunEventKind::FileAccepted));
    }

    #[tokio::test]
    async fn test_fix_loop_keeps_best_version() {
        let dir = TempDir::new().unwrap();
        let plan = r#"{"task_list":[{"task":"Styles","files":[{"path":"css/style.css","description":"theme","role":"style"}]}],"estimated_time":"1 hour","priority":"low","dependencies":[]}"#;
        let v0 = "body {\n  color: red;\n}";
        let v1 = "body {\n  color: blue;\n}";
        let v2 = "body {\n  color: green;\n}";
        let codegen = Arc::new(ScriptedLlm::new(vec![
            AssistantReply::text(v0),
            AssistantReply::text(v1),
            AssistantReply::text(v2),
        ]));
        let evaluator = Arc::new(ScriptedLlm::new(vec![
            AssistantReply::text(review_json(0.5)),
            AssistantReply::text(review_json(0.65)),
            AssistantReply::text(review_json(0.4)),
        ]));
        let config = OrchestratorConfig {
            max_fix_attempts: 2,
            ..OrchestratorConfig::default()
        };
        let mut orch = orchestrator(
            &dir,
            config,
            Arc::new(ScriptedLlm::always(plan)),
            codegen,
            evaluator,
        );

        let summary = orch.run("style the site").await.unwrap();
        let file = &summary.files[0];
        assert_eq!(file.state, FileState::BestKept);
        assert_eq!(file.fix_attempts, 2);
        assert!((file.score - 0.65).abs() < 1e-9);
        assert_eq!(std::fs::read_to_string(dir.path().join("css/style.css")).unwrap(), v1);

        let memory = orch.memory();
        let ops: Vec<&str> = memory
            .versions("css/style.css")
            .iter()
            .map(|v| v.operation.as_str())
            .collect();
        assert_eq!(ops, vec!["create", "fix_attempt_1", "fix_attempt_2", "final_best"]);
        assert!(memory
            .task_history
            .iter()
            .any(|t| t.task_id == "fix_task_1_attempt_2"));
        assert_eq!(summary.status, OverallStatus::Completed);
        assert!(orch.events().iter().any(|e| e.kind == RunEventKind::FileBestKept));
    }

    #[tokio::test]
    async fn test_structural_failure_caps_score() {
        let dir = TempDir::new().unwrap();
        let plan = r#"{"task_list":[{"task":"Data","files":[{"path":"data/items.json","description":"items","role":"data"}]}]}"#;
        let broken = "[{\"id\": 1, \"title\": \"first\",";
        let fixed = "[{\"id\": 1, \"title\": \"first\"}]";
        let codegen = Arc::new(ScriptedLlm::new(vec![
            AssistantReply::text(broken),
            AssistantReply::text(fixed),
        ]));
        let evaluator = Arc::new(ScriptedLlm::always(&review_json(0.9)));
        let mut orch = orchestrator(
            &dir,
            OrchestratorConfig::default(),
            Arc::new(ScriptedLlm::always(plan)),
            codegen,
            evaluator,
        );

        let summary = orch.run("sample data").await.unwrap();
        let file = &summary.files[0];
        assert_eq!(file.state, FileState::Accepted);
        assert_eq!(file.fix_attempts, 1);
        assert!((file.score - 0.9).abs() < 1e-9);
        assert_eq!(std::fs::read_to_string(dir.path().join("data/items.json")).unwrap(), fixed);
    }

    #[tokio::test]
    async fn test_short_content_fails_file() {
        let dir = TempDir::new().unwrap();
        let evaluator = Arc::new(ScriptedLlm::offline());
        let mut orch = orchestrator(
            &dir,
            OrchestratorConfig::default(),
            Arc::new(ScriptedLlm::offline()),
            Arc::new(ScriptedLlm::always("x = 1")),
            evaluator.clone(),
        );

        let summary = orch.run("create a todo app").await.unwrap();
        assert_eq!(summary.files[0].state, FileState::Failed);
        assert_eq!(summary.status, OverallStatus::Failed);
        assert_eq!(evaluator.call_count(), 0);
        assert!(orch.events().iter().any(|e| e.kind == RunEventKind::FileFailed));
    }

    #[tokio::test]
    async fn test_generation_error_is_recorded_and_run_continues() {
        let dir = TempDir::new().unwrap();
        let mut orch = orchestrator(
            &dir,
            OrchestratorConfig::default(),
            Arc::new(ScriptedLlm::offline()),
            Arc::new(ScriptedLlm::offline()),
            Arc::new(ScriptedLlm::offline()),
        );

        let summary = orch.run("build a website").await.unwrap();
        assert_eq!(summary.files.len(), 6);
        assert!(summary.files.iter().all(|f| f.state == FileState::Failed));
        assert_eq!(orch.memory().error_logs.len(), 6);
        assert_eq!(summary.status, OverallStatus::Failed);
    }
}
