//! Deterministic multi-criteria scoring of finished content.
//!
//! [`QualityGate::evaluate`] runs the five checks in [`checks`], awards the
//! points from the [`CRITERIA`] table for every passing criterion and derives
//! a [`Decision`] from the criticality of the failures.

pub mod checks;
pub mod criteria;
pub mod text;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::content::{ContentItem, PublishedItem, ResearchReport};
pub use checks::{CheckDetails, CheckError, CheckOutcome};
pub use criteria::{CRITERIA, Criterion, Criticality, Decision, TOTAL_POINTS};

/// Inclusive range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> Band<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: T) -> bool {
        self.min <= value && value <= self.max
    }
}

/// Thresholds for the quality checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub word_count: Band<u32>,
    pub factual_threshold: f64,
    pub factual_lead_terms: usize,
    pub requirement_threshold: f64,
    pub requirement_lead_terms: usize,
    pub similarity_threshold: f64,
    pub recent_window: usize,
    pub readability_min: f64,
    /// Percent.
    pub keyword_density: Band<f64>,
    pub density_keywords: usize,
    pub meta_title: Band<usize>,
    pub meta_description: Band<usize>,
    pub internal_links: Band<usize>,
    pub media: Band<usize>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            word_count: Band::new(2500, 3500),
            factual_threshold: 0.70,
            factual_lead_terms: 3,
            requirement_threshold: 0.80,
            requirement_lead_terms: 2,
            similarity_threshold: 0.20,
            recent_window: 5,
            readability_min: 60.0,
            keyword_density: Band::new(1.0, 3.0),
            density_keywords: 2,
            meta_title: Band::new(50, 60),
            meta_description: Band::new(140, 160),
            internal_links: Band::new(2, 5),
            media: Band::new(3, 5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionResult {
    pub criterion: Criterion,
    pub passed: bool,
    pub points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<CheckDetails>,
    /// Set when the check could not be evaluated and was passed by default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub revisions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityVerdict {
    pub criteria: Vec<CriterionResult>,
    /// In [0, 1].
    pub weighted_score: f64,
    pub decision: Decision,
    pub feedback: Feedback,
    pub recommendation: String,
}

impl QualityVerdict {
    pub fn result(&self, criterion: Criterion) -> Option<&CriterionResult> {
        self.criteria.iter().find(|r| r.criterion == criterion)
    }

    pub fn failed(&self) -> impl Iterator<Item = Criterion> + '_ {
        self.criteria
            .iter()
            .filter(|r| !r.passed)
            .map(|r| r.criterion)
    }
}

pub struct QualityGate {
    config: QualityConfig,
}

impl QualityGate {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QualityConfig {
        &self.config
    }

    /// Score `content` against the research it was written from and the
    /// most recent published items (newest first).
    pub fn evaluate(
        &self,
        content: &ContentItem,
        research: &ResearchReport,
        recent: &[PublishedItem],
    ) -> QualityVerdict {
        let body = content.plain_text();
        let body_lower = body.to_lowercase();
        let config = &self.config;

        let results: Vec<CriterionResult> = CRITERIA
            .iter()
            .map(|rule| {
                let outcome = match rule.criterion {
                    Criterion::FactualCoverage => {
                        checks::factual_coverage(&body_lower, research, config)
                    }
                    Criterion::StructuralCompliance => {
                        checks::structural_compliance(content, &body, research, config)
                    }
                    Criterion::RequirementCoverage => {
                        checks::requirement_coverage(&body_lower, research, config)
                    }
                    Criterion::Novelty => checks::novelty(&content.title, recent, config),
                    Criterion::Readability => checks::readability(content, &body, config),
                };
                to_result(rule.criterion, rule.points, outcome)
            })
            .collect();

        let points =
            criteria::score_points(results.iter().filter(|r| r.passed).map(|r| r.criterion));
        let weighted_score = f64::from(points) / f64::from(TOTAL_POINTS);
        let decision =
            criteria::decide(results.iter().filter(|r| !r.passed).map(|r| r.criterion));
        let feedback = build_feedback(&results, points, config);
        let recommendation = recommendation(decision, points).to_string();

        debug!(
            score = weighted_score,
            decision = %decision,
            "Quality evaluation complete"
        );

        QualityVerdict {
            criteria: results,
            weighted_score,
            decision,
            feedback,
            recommendation,
        }
    }
}

fn to_result(
    criterion: Criterion,
    points: u32,
    outcome: Result<CheckOutcome, CheckError>,
) -> CriterionResult {
    match outcome {
        Ok(outcome) => CriterionResult {
            criterion,
            passed: outcome.passed,
            points: if outcome.passed { points } else { 0 },
            details: Some(outcome.details),
            annotation: None,
        },
        Err(e) => {
            warn!(criterion = %criterion, error = %e, "Check could not be evaluated, passing by default");
            CriterionResult {
                criterion,
                passed: true,
                points,
                details: None,
                annotation: Some(e.to_string()),
            }
        }
    }
}

/// Points at or above which overall quality counts as excellent.
const EXCELLENT_POINTS: u32 = 90;

fn build_feedback(results: &[CriterionResult], points: u32, config: &QualityConfig) -> Feedback {
    let mut feedback = Feedback::default();

    for result in results {
        match (&result.details, result.passed) {
            (Some(CheckDetails::Factual { rate, .. }), passed) => {
                if *rate >= 0.9 {
                    feedback.strengths.push("Excellent factual accuracy".into());
                } else if !passed {
                    feedback.weaknesses.push("Some key facts missing".into());
                    feedback.revisions.push("Add missing facts from research".into());
                }
            }
            (
                Some(CheckDetails::Structural {
                    density_in_band,
                    meta_title_ok,
                    meta_description_ok,
                    internal_links,
                    media,
                    ..
                }),
                passed,
            ) => {
                if passed {
                    feedback.strengths.push("Strong SEO compliance".into());
                } else {
                    feedback.weaknesses.push("SEO needs optimization".into());
                }
                if !density_in_band {
                    feedback.revisions.push("Adjust keyword density".into());
                }
                if !meta_title_ok {
                    feedback.revisions.push("Optimize meta title length".into());
                }
                if !meta_description_ok {
                    feedback.revisions.push("Optimize meta description length".into());
                }
                if *internal_links < config.internal_links.min {
                    feedback.revisions.push("Add internal links".into());
                } else if *internal_links > config.internal_links.max {
                    feedback.revisions.push("Reduce internal links".into());
                }
                if *media < config.media.min {
                    feedback.revisions.push("Add more images".into());
                } else if *media > config.media.max {
                    feedback.revisions.push("Reduce number of images".into());
                }
            }
            (Some(CheckDetails::Requirements { .. }), false) => {
                feedback.weaknesses.push("Must-include items missing".into());
                feedback.revisions.push("Cover all must-include items from research".into());
            }
            (Some(CheckDetails::Novelty { .. }), true) => {
                feedback.strengths.push("Unique content angle".into());
            }
            (Some(CheckDetails::Novelty { .. }), false) => {
                feedback.weaknesses.push("Too similar to recent content".into());
                feedback.revisions.push("Differentiate from recent content".into());
            }
            (
                Some(CheckDetails::Readability {
                    word_count_in_band,
                    score,
                    ..
                }),
                false,
            ) => {
                feedback.weaknesses.push("Length or readability out of range".into());
                if !word_count_in_band {
                    feedback.revisions.push(format!(
                        "Adjust length to {}-{} words",
                        config.word_count.min, config.word_count.max
                    ));
                }
                if *score < config.readability_min {
                    feedback.revisions.push("Shorten sentences to improve readability".into());
                }
            }
            _ => {}
        }
    }

    if points >= EXCELLENT_POINTS {
        feedback.strengths.push("High overall quality".into());
    }
    feedback
}

fn recommendation(decision: Decision, points: u32) -> &'static str {
    match decision {
        Decision::Approved if points >= EXCELLENT_POINTS => {
            "APPROVE - Excellent quality, ready for publication"
        }
        Decision::Approved => "APPROVE - Good quality, ready for publication",
        Decision::NeedsRevision => "REVIEW - Minor issues found, recommend human review",
        Decision::Rejected => "REJECT - Critical issues found, needs significant revision",
    }
}
