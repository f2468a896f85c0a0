//! # Evaluator Agent
//!
//! Scores one written file. The model's JSON verdict is accepted only when
//! it matches the review schema exactly; anything else falls back to a
//! deterministic default review. Python files are additionally run and
//! validated, and those results adjust a model verdict.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::prompts;
use super::review::{Review, Severity};
use crate::llm::{ChatMessage, ChatOptions, LlmClient};
use crate::tools::executor::CodeRunner;
use crate::tools::filesystem::FileStore;
use crate::validation::{python::PythonReport, FileKind, ValidationEngine, WebValidation};

/// Score bonus when the program runs cleanly
const EXECUTION_BONUS: f64 = 0.1;
/// Score penalty when the program exits non-zero
const EXECUTION_PENALTY: f64 = 0.2;
/// Score penalty when Python validation reports issues
const VALIDATION_PENALTY: f64 = 0.1;

pub struct Evaluator {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn FileStore>,
    engine: Arc<ValidationEngine>,
    runner: Option<Arc<dyn CodeRunner>>,
    target: f64,
}

impl Evaluator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn FileStore>,
        engine: Arc<ValidationEngine>,
        target: f64,
    ) -> Self {
        Self {
            llm,
            store,
            engine,
            runner: None,
            target,
        }
    }

    /// Run Python files through `runner` during review
    pub fn with_runner(mut self, runner: Arc<dyn CodeRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn engine(&self) -> &ValidationEngine {
        &self.engine
    }

    pub fn target(&self) -> f64 {
        self.target
    }

    /// Review the file at `path`; never fails
    pub async fn review(&self, path: &Path, requirements: Option<&str>) -> Review {
        let content = match self.store.read(path) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("Cannot evaluate {}: {:#}", path.display(), e);
                return Review::unavailable(format!("File could not be read: {}", e));
            }
        };

        let (mut review, from_model) = self.ask_model(path, &content, requirements).await;

        if FileKind::from_path(path) == FileKind::Python {
            let validation = self.engine.validate_python(path);
            let execution = match &self.runner {
                Some(runner) => match runner.run_file(path).await {
                    Ok(result) => Some(result),
                    Err(e) => {
                        tracing::warn!("Execution of {} failed to start: {:#}", path.display(), e);
                        None
                    }
                },
                None => None,
            };
            review.execution = execution;
            if from_model {
                self.apply_python_checks(&mut review, &validation);
            }
        }

        tracing::info!(
            "Evaluated {}: score {:.2}, ok {}",
            path.display(),
            review.quality_score,
            review.ok
        );
        review
    }

    /// Batch web validation for the orchestrator's structural gate
    pub fn validate_web_files(&self, paths: &[PathBuf]) -> WebValidation {
        self.engine.validate_web_files(paths)
    }

    /// Model verdict, or the default review with `false`
    async fn ask_model(&self, path: &Path, content: &str, requirements: Option<&str>) -> (Review, bool) {
        let request = format!(
            "Please evaluate the quality of the following code files:\n\n\
File Path: {}\nCode Content:\n{}\n\n\
Requirements information:{}\n\n\
Please return the evaluation result in JSON format.",
            path.display(),
            content,
            requirements.unwrap_or("No specific requirements")
        );
        let messages = vec![ChatMessage::system(prompts::EVALUATOR), ChatMessage::user(request)];

        match self.llm.chat(&messages, ChatOptions::default()).await {
            Ok(reply) => match Review::parse_strict(&reply.content, self.target) {
                Some(review) => (review, true),
                None => {
                    tracing::warn!("Evaluator answer for {} is off-schema, using default review", path.display());
                    (Review::default_for(content, self.target), false)
                }
            },
            Err(e) => {
                tracing::warn!("Evaluator LLM call failed: {}, using default review", e);
                (Review::default_for(content, self.target), false)
            }
        }
    }

    fn apply_python_checks(&self, review: &mut Review, validation: &PythonReport) {
        let mut score = review.quality_score;

        if let Some(execution) = &review.execution {
            if execution.success() {
                score += EXECUTION_BONUS;
                review
                    .evaluation
                    .functional_completeness
                    .push_str(" Code execution check passed.");
            } else {
                score -= EXECUTION_PENALTY;
                review.append_note(&format!(
                    "Code execution failed (exit code {}): {}",
                    execution.returncode,
                    execution.stderr.trim()
                ));
                review.severity = Severity::High;
            }
        }

        if !validation.issues.is_empty() {
            score -= VALIDATION_PENALTY;
            review.append_note(&format!(
                "Python validation issues: {}",
                validation.issues.join("; ")
            ));
        }

        review.set_score(score, self.target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedLlm;
    use crate::tools::executor::testing::{FixedRunner, KnownPackages};
    use crate::tools::filesystem::LocalFileStore;
    use serde_json::json;

    const CLEAN_PY: &str = "def add(a: int, b: int) -> int:\n    return a + b\n\n\nprint(add(1, 2))\n";

    fn model_verdict(score: f64) -> String {
        json!({
            "ok": true,
            "quality_score": score,
            "evaluation": {
                "modularity": "small",
                "maintainability": "clear",
                "functional_completeness": "works.",
                "requirements_adherence": "matches"
            },
            "severity": "low",
            "ai_quality_metrics": {
                "modularity": 0.7,
                "maintainability": 0.7,
                "functional_completeness": 0.8,
                "requirements_adherence": 0.8
            }
        })
        .to_string()
    }

    fn evaluator(dir: &Path, llm: ScriptedLlm) -> Evaluator {
        let store = Arc::new(LocalFileStore::new(dir).unwrap());
        let engine = Arc::new(ValidationEngine::new(Arc::new(KnownPackages(&[]))));
        Evaluator::new(Arc::new(llm), store, engine, 0.7)
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_offline_python_gets_unadjusted_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "main.py", "import os\n\nx = 1\ny = 2\nprint(x + y)\n");
        let eval = evaluator(dir.path(), ScriptedLlm::offline()).with_runner(Arc::new(FixedRunner(1, "boom")));

        let review = eval.review(&path, None).await;
        assert_eq!(review.quality_score, 0.8);
        assert!(review.ok);
        assert_eq!(review.execution.as_ref().map(|e| e.returncode), Some(1));
    }

    #[tokio::test]
    async fn test_successful_run_raises_model_score() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "calc.py", CLEAN_PY);
        let eval = evaluator(dir.path(), ScriptedLlm::always(&model_verdict(0.65)))
            .with_runner(Arc::new(FixedRunner(0, "")));

        let review = eval.review(&path, Some("add numbers")).await;
        assert!((review.quality_score - 0.75).abs() < 1e-9);
        assert!(review.ok);
        assert!(review
            .evaluation
            .functional_completeness
            .ends_with("Code execution check passed."));
    }

    #[tokio::test]
    async fn test_failed_run_lowers_score_and_raises_severity() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "calc.py", CLEAN_PY);
        let eval = evaluator(dir.path(), ScriptedLlm::always(&model_verdict(0.8)))
            .with_runner(Arc::new(FixedRunner(1, "NameError: x")));

        let review = eval.review(&path, None).await;
        assert!((review.quality_score - 0.6).abs() < 1e-9);
        assert!(!review.ok);
        assert_eq!(review.severity, Severity::High);
        assert!(review.notes.unwrap().contains("NameError: x"));
    }

    #[tokio::test]
    async fn test_validation_issues_penalize_model_score() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "util.py", "def Helper(x):\n    return x\n");
        let eval = evaluator(dir.path(), ScriptedLlm::always(&model_verdict(0.75)));

        let review = eval.review(&path, None).await;
        assert!((review.quality_score - 0.65).abs() < 1e-9);
        assert!(!review.ok);
        assert!(review.notes.unwrap().starts_with("Python validation issues: "));
    }

    #[tokio::test]
    async fn test_web_file_uses_model_verdict_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "style.css", "body { margin: 0; }\n");
        let llm = ScriptedLlm::always(&model_verdict(0.9));
        let eval = evaluator(dir.path(), llm);

        let review = eval.review(&path, None).await;
        assert_eq!(review.quality_score, 0.9);
        assert!(review.execution.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let eval = evaluator(dir.path(), ScriptedLlm::offline());
        let review = eval.review(&dir.path().join("ghost.py"), None).await;
        assert!(!review.ok);
        assert_eq!(review.quality_score, 0.0);
        assert_eq!(review.severity, Severity::High);
    }

    #[tokio::test]
    async fn test_prompt_includes_requirements() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "a.json", "[]");
        let llm = Arc::new(ScriptedLlm::offline());
        let store = Arc::new(LocalFileStore::new(dir.path()).unwrap());
        let eval = Evaluator::new(llm.clone(), store, Arc::new(ValidationEngine::default()), 0.7);

        eval.review(&path, None).await;
        let calls = llm.calls.lock().unwrap();
        assert!(calls[0].0[1]
            .content
            .contains("Requirements information:No specific requirements"));
    }
}
