//! Payloads that flow between stages: the research report, the written
//! content item and the metadata kept about published items.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Average reading speed used for `reading_time_minutes`.
pub const WORDS_PER_MINUTE: u32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Heading,
    Paragraph,
    Quote,
    ListItem,
    #[serde(other)]
    Other,
}

/// One typed block of body text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub text: String,
}

impl ContentBlock {
    pub fn paragraph(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Paragraph,
            text: text.into(),
        }
    }

    pub fn heading(text: impl Into<String>) -> Self {
        Self {
            kind: BlockKind::Heading,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeoMetadata {
    pub meta_title: String,
    pub meta_description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaItem {
    pub url: String,
    #[serde(default)]
    pub alt_text: String,
    #[serde(default)]
    pub attribution: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalLink {
    pub anchor: String,
    pub url: String,
}

/// Output of the writing stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub title: String,
    pub body: Vec<ContentBlock>,
    #[serde(default)]
    pub word_count: u32,
    #[serde(default)]
    pub seo: Option<SeoMetadata>,
    #[serde(default)]
    pub media: Vec<MediaItem>,
    #[serde(default)]
    pub internal_links: Vec<InternalLink>,
    #[serde(default)]
    pub image_search_terms: Vec<String>,
    #[serde(default)]
    pub reading_time_minutes: u32,
}

impl ContentItem {
    /// All block text joined with single spaces.
    pub fn plain_text(&self) -> String {
        self.body
            .iter()
            .map(|block| block.text.trim())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn estimate_word_count(&self) -> u32 {
        self.body
            .iter()
            .map(|block| block.text.split_whitespace().count() as u32)
            .sum()
    }

    /// Fill in derived fields the model may have left out.
    pub fn normalize(&mut self) {
        if self.word_count == 0 {
            self.word_count = self.estimate_word_count();
        }
        self.reading_time_minutes = (self.word_count / WORDS_PER_MINUTE).max(1);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordResearch {
    pub primary: Vec<String>,
    #[serde(default)]
    pub secondary: Vec<String>,
    /// Target density in percent.
    #[serde(default = "default_density_target")]
    pub density_target: f64,
}

fn default_density_target() -> f64 {
    1.5
}

/// Output of the research stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchReport {
    pub topic_title: String,
    pub topic_category: String,
    pub key_facts: Vec<String>,
    pub must_include: Vec<String>,
    pub keywords: KeywordResearch,
    #[serde(default)]
    pub content_angle: String,
}

/// What the pipeline remembers about a published item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedItem {
    pub title: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}
