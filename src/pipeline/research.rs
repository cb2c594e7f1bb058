use serde::Deserialize;
use tracing::{debug, info};

use crate::content::{KeywordResearch, ResearchReport};
use crate::error::PressroomError;
use crate::generator::{ContentGenerator, GenerationRequest, extract_as};
use crate::topic::TopicCandidate;

const MAX_TOKENS: u32 = 4096;
const TEMPERATURE: f32 = 0.5;

const SYSTEM_PROMPT: &str = "You are a travel researcher preparing briefs for long-form \
cycling articles. Answer with a single JSON object and nothing else.";

/// Shape the model is asked to return. Everything is optional on the wire;
/// the stage decides what is required.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Synthesis {
    key_facts: Vec<String>,
    must_include: Vec<String>,
    content_angle: String,
    unique_angle: String,
    secondary_keywords: Vec<String>,
}

/// Research: ask the generator for a fact brief on `topic` and turn it into
/// a [`ResearchReport`]. A reply without usable key facts is a validation
/// error.
pub async fn research_topic(
    generator: &dyn ContentGenerator,
    topic: &TopicCandidate,
) -> Result<ResearchReport, PressroomError> {
    let request = GenerationRequest::new(research_prompt(topic), MAX_TOKENS, TEMPERATURE)
        .with_system(SYSTEM_PROMPT);
    let reply = generator.generate(&request).await?;
    debug!(chars = reply.len(), "Research reply received");

    let synthesis: Synthesis = extract_as(&reply)?;
    let key_facts = non_blank(synthesis.key_facts);
    if key_facts.is_empty() {
        return Err(PressroomError::Validation(
            "research reply contained no key facts".into(),
        ));
    }

    let must_include = match non_blank(synthesis.must_include) {
        items if items.is_empty() => default_requirements(&topic.category),
        items => items,
    };
    let content_angle = [synthesis.content_angle, synthesis.unique_angle]
        .into_iter()
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
        .unwrap_or_else(|| topic.title.clone());

    info!(
        topic = %topic.title,
        key_facts = key_facts.len(),
        must_include = must_include.len(),
        "Research complete"
    );

    Ok(ResearchReport {
        topic_title: topic.title.clone(),
        topic_category: topic.category.clone(),
        key_facts,
        must_include,
        keywords: KeywordResearch {
            primary: topic.keywords.clone(),
            secondary: non_blank(synthesis.secondary_keywords),
            density_target: 1.5,
        },
        content_angle,
    })
}

fn research_prompt(topic: &TopicCandidate) -> String {
    format!(
        "Research the following article topic.\n\n\
         Title: {title}\n\
         Category: {category}\n\
         Target keywords: {keywords}\n\n\
         Return JSON with these fields:\n\
         - \"key_facts\": 5 to 8 concrete, checkable facts (history, geography, \
         statistics, seasons, notable sights)\n\
         - \"must_include\": elements the article has to cover\n\
         - \"content_angle\": the storytelling approach for the article\n\
         - \"unique_angle\": what sets this route or topic apart\n\
         - \"secondary_keywords\": related search phrases\n",
        title = topic.title,
        category = topic.category,
        keywords = topic.keywords.join(", "),
    )
}

/// Requirements used when the model suggests none.
fn default_requirements(category: &str) -> Vec<String> {
    let category = category.to_lowercase();
    let first = if category.contains("heritage") || category.contains("cultural") {
        "Heritage site descriptions"
    } else {
        "Route details"
    };
    [
        first,
        "Best season and weather",
        "Safety tips",
        "Accommodation suggestions",
        "Local cultural insights",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn non_blank(items: Vec<String>) -> Vec<String> {
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
