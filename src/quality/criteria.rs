use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    FactualCoverage,
    StructuralCompliance,
    RequirementCoverage,
    Novelty,
    Readability,
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Criterion::FactualCoverage => "factual coverage",
            Criterion::StructuralCompliance => "structural compliance",
            Criterion::RequirementCoverage => "requirement coverage",
            Criterion::Novelty => "novelty",
            Criterion::Readability => "readability",
        };
        f.write_str(name)
    }
}

/// How a failing criterion affects the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criticality {
    /// Failure rejects the content outright.
    Critical,
    /// Failure sends the content back for revision.
    Advisory,
}

#[derive(Debug, Clone, Copy)]
pub struct CriterionRule {
    pub criterion: Criterion,
    /// Weight in points out of [`TOTAL_POINTS`].
    pub points: u32,
    pub criticality: Criticality,
}

pub const TOTAL_POINTS: u32 = 100;

/// Scoring policy. Evaluation order follows this table.
pub const CRITERIA: [CriterionRule; 5] = [
    CriterionRule {
        criterion: Criterion::FactualCoverage,
        points: 25,
        criticality: Criticality::Critical,
    },
    CriterionRule {
        criterion: Criterion::StructuralCompliance,
        points: 25,
        criticality: Criticality::Advisory,
    },
    CriterionRule {
        criterion: Criterion::RequirementCoverage,
        points: 20,
        criticality: Criticality::Critical,
    },
    CriterionRule {
        criterion: Criterion::Novelty,
        points: 15,
        criticality: Criticality::Critical,
    },
    CriterionRule {
        criterion: Criterion::Readability,
        points: 15,
        criticality: Criticality::Advisory,
    },
];

pub fn rule_for(criterion: Criterion) -> &'static CriterionRule {
    let index = match criterion {
        Criterion::FactualCoverage => 0,
        Criterion::StructuralCompliance => 1,
        Criterion::RequirementCoverage => 2,
        Criterion::Novelty => 3,
        Criterion::Readability => 4,
    };
    &CRITERIA[index]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Approved,
    NeedsRevision,
    Rejected,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Approved => f.write_str("APPROVED"),
            Decision::NeedsRevision => f.write_str("NEEDS_REVISION"),
            Decision::Rejected => f.write_str("REJECTED"),
        }
    }
}

/// Sum of points of the passing criteria.
pub fn score_points(passed: impl IntoIterator<Item = Criterion>) -> u32 {
    passed
        .into_iter()
        .map(|criterion| rule_for(criterion).points)
        .sum()
}

/// Any critical failure rejects; otherwise any advisory failure asks for
/// revision.
pub fn decide(failed: impl IntoIterator<Item = Criterion>) -> Decision {
    let mut decision = Decision::Approved;
    for criterion in failed {
        match rule_for(criterion).criticality {
            Criticality::Critical => return Decision::Rejected,
            Criticality::Advisory => decision = Decision::NeedsRevision,
        }
    }
    decision
}
