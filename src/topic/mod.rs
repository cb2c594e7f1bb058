//! Chooses the next topic from coverage gaps in the publishing history.

mod catalog;

use std::collections::{BTreeMap, HashSet};

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::content::PublishedItem;
pub use catalog::{TopicCatalog, TopicEntry};

/// Categories chosen at most this many times count as underrepresented.
const UNDERREPRESENTED_MAX: usize = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicCandidate {
    pub title: String,
    pub category: String,
    pub keywords: Vec<String>,
    /// 1.0 for a never-chosen title, 0.5 for a forced repeat.
    pub uniqueness_score: f64,
    pub selection_reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicAnalysis {
    pub total: usize,
    pub distribution: BTreeMap<String, usize>,
    /// Catalog categories never chosen.
    pub gap_categories: Vec<String>,
    /// Chosen categories with at most one selection.
    pub underrepresented: Vec<String>,
}

pub struct TopicSelector {
    catalog: TopicCatalog,
}

impl TopicSelector {
    pub fn new(catalog: TopicCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &TopicCatalog {
        &self.catalog
    }

    pub fn analyze(&self, history: &[PublishedItem]) -> TopicAnalysis {
        let mut distribution = BTreeMap::new();
        for item in history {
            *distribution.entry(item.category.clone()).or_insert(0) += 1;
        }

        let gap_categories = self
            .catalog
            .categories()
            .into_iter()
            .filter(|category| !distribution.contains_key(*category))
            .map(str::to_string)
            .collect();
        let underrepresented = distribution
            .iter()
            .filter(|(_, count)| **count <= UNDERREPRESENTED_MAX)
            .map(|(category, _)| category.clone())
            .collect();

        TopicAnalysis {
            total: history.len(),
            distribution,
            gap_categories,
            underrepresented,
        }
    }

    pub fn select_next(&self, history: &[PublishedItem]) -> TopicCandidate {
        self.select_next_with(history, &mut rand::thread_rng())
    }

    /// Pick the next topic.
    ///
    /// Titles already in `history` are excluded (case-insensitive). If that
    /// leaves nothing, the whole catalog is used and repeats are allowed.
    /// Within the pool, topics from gap or underrepresented categories win;
    /// ties break uniformly at random.
    pub fn select_next_with<R: Rng + ?Sized>(
        &self,
        history: &[PublishedItem],
        rng: &mut R,
    ) -> TopicCandidate {
        let analysis = self.analyze(history);
        let used: HashSet<String> = history.iter().map(|item| item.title.to_lowercase()).collect();

        let fresh: Vec<&TopicEntry> = self
            .catalog
            .entries()
            .iter()
            .filter(|entry| !used.contains(&entry.title.to_lowercase()))
            .collect();
        let exhausted = fresh.is_empty();
        let pool: Vec<&TopicEntry> = if exhausted {
            warn!(
                catalog_size = self.catalog.entries().len(),
                "Every topic has been used, allowing repeats"
            );
            self.catalog.entries().iter().collect()
        } else {
            fresh
        };

        let priority: Vec<&TopicEntry> = pool
            .iter()
            .copied()
            .filter(|entry| {
                analysis.gap_categories.contains(&entry.category)
                    || analysis.underrepresented.contains(&entry.category)
            })
            .collect();

        let (chosen, reason) = match priority.choose(rng) {
            Some(entry) => {
                let why = if analysis.gap_categories.contains(&entry.category) {
                    "never covered"
                } else {
                    "underrepresented"
                };
                (*entry, format!("Fills content gap: category '{}' is {why}", entry.category))
            }
            None => {
                // The pool is never empty: the catalog is non-empty.
                let entry = pool.choose(rng).copied().unwrap_or(&self.catalog.entries()[0]);
                (entry, "No coverage gaps, chosen at random from unused topics".to_string())
            }
        };

        let repeat = used.contains(&chosen.title.to_lowercase());
        let reason = if exhausted {
            format!("Topic catalog exhausted, repeating a topic. {reason}")
        } else {
            reason
        };

        info!(
            title = %chosen.title,
            category = %chosen.category,
            repeat,
            "Topic selected"
        );

        TopicCandidate {
            title: chosen.title.clone(),
            category: chosen.category.clone(),
            keywords: chosen.keywords.clone(),
            uniqueness_score: if repeat { 0.5 } else { 1.0 },
            selection_reason: reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn entry(title: &str, category: &str) -> TopicEntry {
        TopicEntry {
            title: title.into(),
            category: category.into(),
            keywords: vec![title.to_lowercase()],
        }
    }

    fn published(title: &str, category: &str) -> PublishedItem {
        PublishedItem {
            title: title.into(),
            category: category.into(),
            created_at: Utc::now(),
        }
    }

    fn small_selector() -> TopicSelector {
        TopicSelector::new(
            TopicCatalog::new(vec![
                entry("Alpine Passes", "Mountains"),
                entry("Glacier Valleys", "Mountains"),
                entry("Harbour Towns", "Coast"),
                entry("Cliff Paths", "Coast"),
            ])
            .unwrap(),
        )
    }

    #[test]
    fn analysis_finds_gaps_and_underrepresented() {
        let selector = small_selector();
        let history = vec![
            published("Alpine Passes", "Mountains"),
            published("Glacier Valleys", "Mountains"),
            published("Old Piers", "Harbours"),
        ];
        let analysis = selector.analyze(&history);
        assert_eq!(analysis.total, 3);
        assert_eq!(analysis.distribution["Mountains"], 2);
        assert_eq!(analysis.gap_categories, vec!["Coast".to_string()]);
        assert_eq!(analysis.underrepresented, vec!["Harbours".to_string()]);
    }

    #[test]
    fn never_repeats_while_fresh_topics_remain() {
        let selector = TopicSelector::new(TopicCatalog::builtin());
        let history: Vec<PublishedItem> = selector
            .catalog()
            .entries()
            .iter()
            .skip(1)
            .map(|e| published(&e.title.to_uppercase(), &e.category))
            .collect();
        let expected = &selector.catalog().entries()[0].title;

        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let candidate = selector.select_next_with(&history, &mut rng);
            assert_eq!(&candidate.title, expected);
            assert_eq!(candidate.uniqueness_score, 1.0);
        }
    }

    #[test]
    fn exhausted_catalog_falls_back_to_repeats() {
        let selector = small_selector();
        let history: Vec<PublishedItem> = selector
            .catalog()
            .entries()
            .iter()
            .map(|e| published(&e.title, &e.category))
            .collect();

        let mut rng = StdRng::seed_from_u64(7);
        let candidate = selector.select_next_with(&history, &mut rng);
        assert!(history.iter().any(|h| h.title == candidate.title));
        assert_eq!(candidate.uniqueness_score, 0.5);
        assert!(candidate.selection_reason.contains("exhausted"));
    }

    #[test]
    fn gap_categories_take_priority() {
        let selector = small_selector();
        let history = vec![
            published("Alpine Passes", "Mountains"),
            published("Some Older Mountain Story", "Mountains"),
        ];
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let candidate = selector.select_next_with(&history, &mut rng);
            assert_eq!(candidate.category, "Coast");
            assert!(candidate.selection_reason.contains("never covered"));
        }
    }

    #[test]
    fn without_gaps_any_unused_topic_can_win() {
        let selector = small_selector();
        let history = vec![
            published("Alpine Passes", "Mountains"),
            published("Mountain Huts", "Mountains"),
            published("Harbour Towns", "Coast"),
            published("Sea Caves", "Coast"),
        ];
        let mut seen = HashSet::new();
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let candidate = selector.select_next_with(&history, &mut rng);
            assert!(candidate.selection_reason.contains("at random"));
            seen.insert(candidate.title);
        }
        let expected: HashSet<String> = ["Glacier Valleys", "Cliff Paths"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn empty_history_prefers_everything() {
        let selector = small_selector();
        let candidate = selector.select_next(&[]);
        assert_eq!(candidate.uniqueness_score, 1.0);
        assert!(candidate.selection_reason.contains("never covered"));
    }
}
