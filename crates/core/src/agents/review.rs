//! # Review
//!
//! The evaluator's structured verdict on one file. Field names are a wire
//! contract: the fix loop reads the four assessment keys to build its
//! feedback.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::executor::ExecutionResult;

/// Assessment dimensions shared by `evaluation` and `ai_quality_metrics`
pub const METRIC_KEYS: [&str; 4] = [
    "modularity",
    "maintainability",
    "functional_completeness",
    "requirements_adherence",
];

/// Free-text assessment per dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Assessment {
    pub modularity: String,
    pub maintainability: String,
    pub functional_completeness: String,
    pub requirements_adherence: String,
}

impl Assessment {
    /// `(key, text)` pairs in wire order
    pub fn entries(&self) -> [(&'static str, &str); 4] {
        [
            ("modularity", &self.modularity),
            ("maintainability", &self.maintainability),
            ("functional_completeness", &self.functional_completeness),
            ("requirements_adherence", &self.requirements_adherence),
        ]
    }
}

/// Numeric score per dimension, each in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct QualityMetrics {
    pub modularity: f64,
    pub maintainability: f64,
    pub functional_completeness: f64,
    pub requirements_adherence: f64,
}

impl QualityMetrics {
    pub fn values(&self) -> [f64; 4] {
        [
            self.modularity,
            self.maintainability,
            self.functional_completeness,
            self.requirements_adherence,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Review {
    pub ok: bool,
    pub quality_score: f64,
    pub evaluation: Assessment,
    pub severity: Severity,
    pub ai_quality_metrics: QualityMetrics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Outcome of running the file, for Python sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(skip)]
    pub execution: Option<ExecutionResult>,
}

fn in_unit_range(value: Option<&Value>) -> bool {
    value
        .and_then(Value::as_f64)
        .is_some_and(|v| (0.0..=1.0).contains(&v))
}

/// Strip a surrounding ```json fence
fn strip_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let trimmed = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    trimmed.strip_suffix("```").unwrap_or(trimmed).trim()
}

impl Review {
    /// Parse an LLM answer, rejecting anything off-schema
    ///
    /// Every top-level and nested key must be present, `quality_score` and
    /// every metric must lie in [0, 1] and `severity` must be low, medium
    /// or high. `ok` is recomputed from the score against `target`.
    pub fn parse_strict(content: &str, target: f64) -> Option<Review> {
        let value: Value = serde_json::from_str(strip_fence(content)).ok()?;
        let obj = value.as_object()?;

        for key in ["ok", "quality_score", "evaluation", "severity", "ai_quality_metrics"] {
            if !obj.contains_key(key) {
                return None;
            }
        }
        let evaluation = obj.get("evaluation")?.as_object()?;
        let metrics = obj.get("ai_quality_metrics")?.as_object()?;
        if METRIC_KEYS
            .iter()
            .any(|k| !evaluation.contains_key(*k) || !metrics.contains_key(*k))
        {
            return None;
        }
        if !in_unit_range(obj.get("quality_score")) || !metrics.values().all(|v| in_unit_range(Some(v)))
        {
            return None;
        }

        let mut review: Review = serde_json::from_value(value).ok()?;
        review.set_score(review.quality_score, target);
        Some(review)
    }

    /// Deterministic verdict used when the LLM answer is unusable
    pub fn default_for(content: &str, target: f64) -> Review {
        let line_count = content.split('\n').count();
        let mut score: f64 = 0.8;
        if line_count < 5 && content.trim().len() < 100 {
            score = 0.6;
        }
        let lower = content.to_lowercase();
        if lower.contains("error") || lower.contains("exception") {
            score = (score - 0.3).max(0.3);
        }

        Review {
            ok: score >= target,
            quality_score: score,
            evaluation: Assessment {
                modularity: "Basic modularity evaluation".into(),
                maintainability: "Basic maintainability evaluation".into(),
                functional_completeness: "Basic functional completeness evaluation".into(),
                requirements_adherence: "Basic requirements adherence evaluation".into(),
            },
            severity: Severity::Low,
            ai_quality_metrics: QualityMetrics {
                modularity: 0.7,
                maintainability: 0.7,
                functional_completeness: 0.8,
                requirements_adherence: 0.8,
            },
            notes: Some("Auto-evaluation: File generated with acceptable quality".into()),
            execution: None,
        }
    }

    /// Failing verdict for a file that cannot be inspected
    pub fn unavailable(reason: impl Into<String>) -> Review {
        let reason = reason.into();
        Review {
            ok: false,
            quality_score: 0.0,
            evaluation: Assessment {
                modularity: reason.clone(),
                maintainability: reason.clone(),
                functional_completeness: reason.clone(),
                requirements_adherence: reason.clone(),
            },
            severity: Severity::High,
            ai_quality_metrics: QualityMetrics {
                modularity: 0.0,
                maintainability: 0.0,
                functional_completeness: 0.0,
                requirements_adherence: 0.0,
            },
            notes: Some(reason),
            execution: None,
        }
    }

    /// Clamp into [0, 1] and keep `ok` in step with the score
    pub fn set_score(&mut self, score: f64, target: f64) {
        self.quality_score = score.clamp(0.0, 1.0);
        self.ok = self.quality_score >= target;
    }

    pub fn append_note(&mut self, note: &str) {
        match &mut self.notes {
            Some(notes) if !notes.is_empty() => {
                notes.push(' ');
                notes.push_str(note);
            }
            _ => self.notes = Some(note.to_string()),
        }
    }

    /// Flat feedback string for the generator's fix prompt
    pub fn fix_notes(&self) -> String {
        let mut parts: Vec<String> = self
            .evaluation
            .entries()
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect();
        if let Some(notes) = self.notes.as_deref().filter(|n| !n.trim().is_empty()) {
            parts.push(format!("notes: {}", notes));
        }
        parts.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn llm_answer(score: f64, severity: &str) -> String {
        json!({
            "ok": true,
            "quality_score": score,
            "evaluation": {
                "modularity": "good",
                "maintainability": "fine",
                "functional_completeness": "complete",
                "requirements_adherence": "on target"
            },
            "severity": severity,
            "ai_quality_metrics": {
                "modularity": 0.8,
                "maintainability": 0.7,
                "functional_completeness": 0.6,
                "requirements_adherence": 0.9
            }
        })
        .to_string()
    }

    #[test]
    fn test_parse_strict_recomputes_ok() {
        let review = Review::parse_strict(&llm_answer(0.65, "medium"), 0.7).unwrap();
        assert!(!review.ok);
        assert_eq!(review.severity, Severity::Medium);

        let fenced = format!("```json\n{}\n```", llm_answer(0.9, "low"));
        assert!(Review::parse_strict(&fenced, 0.7).unwrap().ok);
    }

    #[test]
    fn test_parse_strict_rejects_off_schema() {
        assert!(Review::parse_strict(&llm_answer(1.4, "low"), 0.7).is_none());
        assert!(Review::parse_strict(&llm_answer(0.9, "critical"), 0.7).is_none());
        assert!(Review::parse_strict(r#"{"ok": true, "quality_score": 0.9}"#, 0.7).is_none());
        assert!(Review::parse_strict("looks great!", 0.7).is_none());

        let mut bad_metric: Value = serde_json::from_str(&llm_answer(0.9, "low")).unwrap();
        bad_metric["ai_quality_metrics"]["modularity"] = json!(-0.1);
        assert!(Review::parse_strict(&bad_metric.to_string(), 0.7).is_none());
    }

    #[test]
    fn test_default_scores() {
        let long = "def main():\n    total = 0\n    for i in range(10):\n        total += i\n    return total\n";
        let review = Review::default_for(long, 0.7);
        assert_eq!(review.quality_score, 0.8);
        assert!(review.ok);

        let short = Review::default_for("x = 1", 0.7);
        assert_eq!(short.quality_score, 0.6);
        assert!(!short.ok);

        let noisy = Review::default_for("raise Exception('x')", 0.7);
        assert!((noisy.quality_score - 0.3).abs() < 1e-9);
    }

    #[test]
    fn test_ok_tracks_score_after_adjustment() {
        let mut review = Review::default_for("", 0.7);
        review.set_score(1.3, 0.7);
        assert_eq!(review.quality_score, 1.0);
        assert!(review.ok);
        review.set_score(0.69, 0.7);
        assert!(!review.ok);
    }

    #[test]
    fn test_fix_notes_include_every_dimension() {
        let mut review = Review::parse_strict(&llm_answer(0.5, "high"), 0.7).unwrap();
        assert_eq!(
            review.fix_notes(),
            "modularity: good, maintainability: fine, functional_completeness: complete, requirements_adherence: on target"
        );
        review.append_note("Structural validation failed: missing body");
        assert!(review.fix_notes().ends_with("notes: Structural validation failed: missing body"));
    }
}
