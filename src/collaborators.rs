//! External collaborators: stock media, notifications and the publish
//! target, plus the local implementations the CLI wires in.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

use crate::content::{ContentItem, MediaItem};

/// Stock media search. An empty result is valid.
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn search(&self, terms: &[String]) -> anyhow::Result<Vec<MediaItem>>;
}

#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, html_body: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishReceipt {
    pub document_id: String,
    pub url: String,
}

#[async_trait]
pub trait PublishTarget: Send + Sync {
    async fn publish(&self, content: &ContentItem, media: &[MediaItem]) -> anyhow::Result<PublishReceipt>;
}

/// Media source that never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoMediaSource;

#[async_trait]
impl MediaSource for NoMediaSource {
    async fn search(&self, _terms: &[String]) -> anyhow::Result<Vec<MediaItem>> {
        Ok(Vec::new())
    }
}

/// Writes each notification as an HTML file into an outbox directory.
pub struct OutboxNotifier {
    dir: PathBuf,
}

impl OutboxNotifier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl NotificationChannel for OutboxNotifier {
    async fn send(&self, recipient: &str, subject: &str, html_body: &str) -> anyhow::Result<()> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating outbox {}", self.dir.display()))?;
        let path = self.dir.join(format!(
            "{}-{}.html",
            Utc::now().format("%Y%m%dT%H%M%S"),
            Uuid::new_v4().simple()
        ));
        let document = format!(
            "<!-- to: {recipient} -->\n<!-- subject: {subject} -->\n{html_body}\n"
        );
        fs::write(&path, document)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        debug!(recipient, path = %path.display(), "Notification written to outbox");
        Ok(())
    }
}

/// Publishes content as JSON documents in a local directory.
pub struct DirectoryPublisher {
    dir: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[derive(Serialize)]
struct PublishedDocument<'a> {
    id: &'a str,
    published_at: String,
    content: &'a ContentItem,
    media: &'a [MediaItem],
}

#[async_trait]
impl PublishTarget for DirectoryPublisher {
    async fn publish(&self, content: &ContentItem, media: &[MediaItem]) -> anyhow::Result<PublishReceipt> {
        fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("creating {}", self.dir.display()))?;
        let document_id = Uuid::new_v4().to_string();
        let doc = PublishedDocument {
            id: &document_id,
            published_at: Utc::now().to_rfc3339(),
            content,
            media,
        };
        let path = self.dir.join(format!("{document_id}.json"));
        fs::write(&path, serde_json::to_string_pretty(&doc)?)
            .await
            .with_context(|| format!("writing {}", path.display()))?;

        let absolute = std::path::absolute(&path).unwrap_or(path);
        Ok(PublishReceipt {
            document_id,
            url: format!("file://{}", absolute.display()),
        })
    }
}
