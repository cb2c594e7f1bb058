use serde::Deserialize;
use tracing::{info, warn};

use crate::collaborators::MediaSource;
use crate::content::{ContentBlock, ContentItem, InternalLink, ResearchReport, SeoMetadata};
use crate::error::PressroomError;
use crate::generator::{ContentGenerator, GenerationRequest, extract_as};

const MAX_TOKENS: u32 = 16_000;
const TEMPERATURE: f32 = 0.7;

const SYSTEM_PROMPT: &str = "You write long-form, search-optimised cycling travel articles. \
Answer with a single JSON object and nothing else.";

/// Body as returned by the model: typed blocks, or plain text with
/// blank-line separated paragraphs and `#` headings.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DraftBody {
    Blocks(Vec<ContentBlock>),
    Text(String),
}

impl Default for DraftBody {
    fn default() -> Self {
        DraftBody::Blocks(Vec::new())
    }
}

impl DraftBody {
    fn into_blocks(self) -> Vec<ContentBlock> {
        match self {
            DraftBody::Blocks(blocks) => blocks
                .into_iter()
                .filter(|block| !block.text.trim().is_empty())
                .collect(),
            DraftBody::Text(text) => text
                .split("\n\n")
                .map(str::trim)
                .filter(|chunk| !chunk.is_empty())
                .map(|chunk| match chunk.strip_prefix('#') {
                    Some(heading) => ContentBlock::heading(heading.trim_start_matches('#').trim()),
                    None => ContentBlock::paragraph(chunk),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Draft {
    title: String,
    body: DraftBody,
    word_count: u32,
    seo: Option<SeoMetadata>,
    internal_links: Vec<InternalLink>,
    image_search_terms: Vec<String>,
}

/// Writing: turn the research report into a [`ContentItem`] and attach up
/// to `media_limit` images. Missing title, body or SEO metadata is a
/// validation error; a failed media search only leaves the item without
/// images.
pub async fn write_article(
    generator: &dyn ContentGenerator,
    media: &dyn MediaSource,
    research: &ResearchReport,
    media_limit: usize,
) -> Result<ContentItem, PressroomError> {
    let request = GenerationRequest::new(writing_prompt(research), MAX_TOKENS, TEMPERATURE)
        .with_system(SYSTEM_PROMPT);
    let reply = generator.generate(&request).await?;
    let draft: Draft = extract_as(&reply)?;

    let title = draft.title.trim().to_string();
    if title.is_empty() {
        return Err(PressroomError::Validation("draft has no title".into()));
    }
    let body = draft.body.into_blocks();
    if body.is_empty() {
        return Err(PressroomError::Validation("draft has no body".into()));
    }
    let Some(seo) = draft.seo else {
        return Err(PressroomError::Validation("draft has no SEO metadata".into()));
    };

    let mut item = ContentItem {
        title,
        body,
        word_count: draft.word_count,
        seo: Some(seo),
        media: Vec::new(),
        internal_links: draft.internal_links,
        image_search_terms: draft.image_search_terms,
        reading_time_minutes: 0,
    };
    item.normalize();

    let terms = if item.image_search_terms.is_empty() {
        research.keywords.primary.clone()
    } else {
        item.image_search_terms.clone()
    };
    match media.search(&terms).await {
        Ok(mut found) => {
            found.truncate(media_limit);
            item.media = found;
        }
        Err(e) => warn!(error = %e, "Media search failed, continuing without images"),
    }

    info!(
        title = %item.title,
        word_count = item.word_count,
        media = item.media.len(),
        "Draft complete"
    );
    Ok(item)
}

fn writing_prompt(research: &ResearchReport) -> String {
    let bullets = |items: &[String]| {
        items
            .iter()
            .map(|item| format!("- {item}"))
            .collect::<Vec<_>>()
            .join("\n")
    };
    format!(
        "Write an article titled around \"{title}\" ({category}).\n\n\
         Angle: {angle}\n\n\
         Use every one of these facts:\n{facts}\n\n\
         Cover each of these:\n{must}\n\n\
         Primary keywords (about {density}% density): {primary}\n\
         Secondary keywords: {secondary}\n\n\
         Return JSON with: \"title\", \"body\" (array of {{\"type\": \"heading\"|\"paragraph\", \
         \"text\"}}), \"word_count\", \"seo\" ({{\"meta_title\" of 50-60 characters, \
         \"meta_description\" of 140-160 characters, \"keywords\"}}), \"internal_links\" \
         (2-5 of {{\"anchor\", \"url\"}}) and \"image_search_terms\".\n",
        title = research.topic_title,
        category = research.topic_category,
        angle = research.content_angle,
        facts = bullets(&research.key_facts),
        must = bullets(&research.must_include),
        density = research.keywords.density_target,
        primary = research.keywords.primary.join(", "),
        secondary = research.keywords.secondary.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::NoMediaSource;
    use crate::content::{BlockKind, KeywordResearch, MediaItem};
    use crate::pipeline::fixtures::ScriptedGenerator;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StockPhotos {
        terms: Mutex<Vec<String>>,
        fail: bool,
    }

    impl StockPhotos {
        fn new(fail: bool) -> Self {
            Self {
                terms: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl MediaSource for StockPhotos {
        async fn search(&self, terms: &[String]) -> anyhow::Result<Vec<MediaItem>> {
            *self.terms.lock().unwrap() = terms.to_vec();
            if self.fail {
                anyhow::bail!("photo service down");
            }
            Ok((0..8)
                .map(|i| MediaItem {
                    url: format!("https://img.example/{i}.jpg"),
                    alt_text: String::new(),
                    attribution: String::new(),
                })
                .collect())
        }
    }

    fn research() -> ResearchReport {
        ResearchReport {
            topic_title: "Lagoon Loops".into(),
            topic_category: "Coast".into(),
            key_facts: vec!["The lagoon is tidal".into()],
            must_include: vec!["Route details".into()],
            keywords: KeywordResearch {
                primary: vec!["lagoon cycling".into()],
                secondary: vec![],
                density_target: 1.5,
            },
            content_angle: "Dawn rides".into(),
        }
    }

    const DRAFT: &str = r#"{
        "title": "Lagoon Loops at Dawn",
        "body": [
            {"type": "heading", "text": "Setting off"},
            {"type": "paragraph", "text": "The lagoon is tidal and calm at first light."},
            {"type": "paragraph", "text": "  "}
        ],
        "seo": {"meta_title": "Lagoon cycling", "meta_description": "Dawn rides"},
        "internal_links": [{"anchor": "tours", "url": "/tours"}]
    }"#;

    #[tokio::test]
    async fn builds_item_and_attaches_limited_media() {
        let generator = ScriptedGenerator::always(DRAFT);
        let photos = StockPhotos::new(false);
        let item = write_article(&generator, &photos, &research(), 5).await.unwrap();

        assert_eq!(item.title, "Lagoon Loops at Dawn");
        assert_eq!(item.body.len(), 2);
        assert_eq!(item.body[0].kind, BlockKind::Heading);
        assert_eq!(item.word_count, 11);
        assert_eq!(item.reading_time_minutes, 1);
        assert_eq!(item.media.len(), 5);
        assert_eq!(*photos.terms.lock().unwrap(), vec!["lagoon cycling".to_string()]);

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("- The lagoon is tidal"));
    }

    #[tokio::test]
    async fn media_failure_is_not_fatal() {
        let generator = ScriptedGenerator::always(DRAFT);
        let item = write_article(&generator, &StockPhotos::new(true), &research(), 5)
            .await
            .unwrap();
        assert!(item.media.is_empty());
    }

    #[tokio::test]
    async fn plain_text_body_is_split_into_blocks() {
        let generator = ScriptedGenerator::always(
            r###"{"title": "T", "body": "## Start\n\nFirst paragraph here.\n\nSecond one.",
                "seo": {"meta_title": "m", "meta_description": "d"}}"###,
        );
        let item = write_article(&generator, &NoMediaSource, &research(), 5)
            .await
            .unwrap();
        assert_eq!(item.body.len(), 3);
        assert_eq!(item.body[0], ContentBlock::heading("Start"));
        assert_eq!(item.body[2], ContentBlock::paragraph("Second one."));
    }

    #[tokio::test]
    async fn missing_fields_are_validation_errors() {
        for reply in [
            r#"{"body": "text", "seo": {"meta_title": "m", "meta_description": "d"}}"#,
            r#"{"title": "T", "seo": {"meta_title": "m", "meta_description": "d"}}"#,
            r#"{"title": "T", "body": "text"}"#,
        ] {
            let generator = ScriptedGenerator::always(reply);
            let err = write_article(&generator, &NoMediaSource, &research(), 5)
                .await
                .unwrap_err();
            assert!(matches!(err, PressroomError::Validation(_)), "{reply}");
        }
    }
}
