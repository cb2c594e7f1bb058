//! The five independent quality checks.
//!
//! Each check returns `Err(CheckError)` when it cannot be evaluated; the
//! gate records that as a pass with an annotation.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::QualityConfig;
use super::text;
use crate::content::{ContentItem, PublishedItem, ResearchReport};

/// Missing items reported per check.
const MAX_REPORTED_MISSING: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckError {
    #[error("research report lists no key facts")]
    NoKeyFacts,

    #[error("research report lists no must-include items")]
    NoRequirements,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CheckDetails {
    Factual {
        verified: usize,
        total: usize,
        missing: Vec<String>,
        rate: f64,
    },
    Structural {
        /// Mean density over the checked primary keywords, in percent.
        keyword_density: Option<f64>,
        density_in_band: bool,
        meta_title_length: usize,
        meta_title_ok: bool,
        meta_description_length: usize,
        meta_description_ok: bool,
        internal_links: usize,
        media: usize,
    },
    Requirements {
        present: usize,
        total: usize,
        missing: Vec<String>,
        coverage: f64,
    },
    Novelty {
        max_similarity: f64,
        most_similar: Option<String>,
    },
    Readability {
        word_count: u32,
        word_count_in_band: bool,
        score: f64,
        average_sentence_length: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckOutcome {
    pub passed: bool,
    pub details: CheckDetails,
}

/// Fraction of key facts whose leading terms appear in the body.
pub fn factual_coverage(
    body_lower: &str,
    research: &ResearchReport,
    config: &QualityConfig,
) -> Result<CheckOutcome, CheckError> {
    if research.key_facts.is_empty() {
        return Err(CheckError::NoKeyFacts);
    }
    let (verified, missing) = partition_matches(
        &research.key_facts,
        config.factual_lead_terms,
        body_lower,
    );
    let total = research.key_facts.len();
    let rate = verified as f64 / total as f64;
    Ok(CheckOutcome {
        passed: rate >= config.factual_threshold,
        details: CheckDetails::Factual {
            verified,
            total,
            missing,
            rate,
        },
    })
}

/// Keyword density, meta lengths, link and media counts.
///
/// Density outside the band is reported but does not fail the check; link
/// and media counts only gate on their minimum.
pub fn structural_compliance(
    content: &ContentItem,
    body: &str,
    research: &ResearchReport,
    config: &QualityConfig,
) -> Result<CheckOutcome, CheckError> {
    let densities: Vec<f64> = research
        .keywords
        .primary
        .iter()
        .filter(|kw| !kw.trim().is_empty())
        .take(config.density_keywords)
        .map(|kw| text::keyword_density(body, kw))
        .collect();
    let keyword_density = if densities.is_empty() || body.trim().is_empty() {
        None
    } else {
        Some(densities.iter().sum::<f64>() / densities.len() as f64)
    };
    let density_in_band = keyword_density.is_none_or(|d| config.keyword_density.contains(d));

    let (title, description) = content
        .seo
        .as_ref()
        .map(|seo| (seo.meta_title.as_str(), seo.meta_description.as_str()))
        .unwrap_or(("", ""));
    let meta_title_length = title.chars().count();
    let meta_description_length = description.chars().count();
    let meta_title_ok = config.meta_title.contains(meta_title_length);
    let meta_description_ok = config.meta_description.contains(meta_description_length);

    let internal_links = content.internal_links.len();
    let media = content.media.len();

    let passed = meta_title_ok
        && meta_description_ok
        && internal_links >= config.internal_links.min
        && media >= config.media.min;

    Ok(CheckOutcome {
        passed,
        details: CheckDetails::Structural {
            keyword_density,
            density_in_band,
            meta_title_length,
            meta_title_ok,
            meta_description_length,
            meta_description_ok,
            internal_links,
            media,
        },
    })
}

/// Fraction of must-include items whose leading terms appear in the body.
pub fn requirement_coverage(
    body_lower: &str,
    research: &ResearchReport,
    config: &QualityConfig,
) -> Result<CheckOutcome, CheckError> {
    if research.must_include.is_empty() {
        return Err(CheckError::NoRequirements);
    }
    let (present, missing) = partition_matches(
        &research.must_include,
        config.requirement_lead_terms,
        body_lower,
    );
    let total = research.must_include.len();
    let coverage = present as f64 / total as f64;
    Ok(CheckOutcome {
        passed: coverage >= config.requirement_threshold,
        details: CheckDetails::Requirements {
            present,
            total,
            missing,
            coverage,
        },
    })
}

/// Highest title similarity against the most recent published items.
pub fn novelty(
    title: &str,
    recent: &[PublishedItem],
    config: &QualityConfig,
) -> Result<CheckOutcome, CheckError> {
    let mut max_similarity = 0.0;
    let mut most_similar = None;
    for item in recent.iter().take(config.recent_window) {
        let similarity = text::jaccard(title, &item.title);
        if similarity > max_similarity {
            max_similarity = similarity;
            most_similar = Some(item.title.clone());
        }
    }
    Ok(CheckOutcome {
        passed: max_similarity < config.similarity_threshold,
        details: CheckDetails::Novelty {
            max_similarity,
            most_similar,
        },
    })
}

/// Word count band and sentence-length readability proxy.
pub fn readability(
    content: &ContentItem,
    body: &str,
    config: &QualityConfig,
) -> Result<CheckOutcome, CheckError> {
    let word_count_in_band = config.word_count.contains(content.word_count);
    let score = text::readability(body);
    Ok(CheckOutcome {
        passed: word_count_in_band && score >= config.readability_min,
        details: CheckDetails::Readability {
            word_count: content.word_count,
            word_count_in_band,
            score,
            average_sentence_length: text::average_sentence_length(body),
        },
    })
}

fn partition_matches(items: &[String], lead_terms: usize, body_lower: &str) -> (usize, Vec<String>) {
    let mut found = 0;
    let mut missing = Vec::new();
    for item in items {
        if text::leading_terms_match(item, lead_terms, body_lower) {
            found += 1;
        } else if missing.len() < MAX_REPORTED_MISSING {
            missing.push(item.clone());
        }
    }
    (found, missing)
}
