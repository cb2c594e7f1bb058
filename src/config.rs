//! Configuração do pressroom carregada a partir de `pressroom.toml`.
//!
//! A struct [`PressroomConfig`] agrupa todas as seções configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `ANTHROPIC_API_KEY` tem precedência sobre o arquivo.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::orchestrator::WorkflowSettings;
use crate::quality::QualityConfig;
use crate::retry::RetryPolicy;
use crate::topic::TopicEntry;

/// Arquivo procurado no diretório atual quando `--config` não é informado.
pub const DEFAULT_CONFIG_FILE: &str = "pressroom.toml";

/// Configuração de nível superior.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PressroomConfig {
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Retentativas dentro de um estágio.
    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub quality: QualityConfig,

    /// Catálogo de tópicos; vazio usa o catálogo embutido.
    #[serde(default)]
    pub topics: Vec<TopicEntry>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub notification: NotificationConfig,

    #[serde(default)]
    pub publish: PublishConfig,
}

/// Modelo generativo.
#[derive(Debug, Clone, Deserialize)]
pub struct GeneratorConfig {
    /// Chave da API Anthropic.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Endpoint alternativo (proxy, servidor de teste).
    #[serde(default)]
    pub base_url: Option<String>,
}

fn default_model() -> String {
    "claude-sonnet-4-5-20250929".to_string()
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            base_url: None,
        }
    }
}

/// Backoff exponencial por estágio.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_stage_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,

    #[serde(default = "default_true")]
    pub jitter: bool,
}

// 3 retentativas após a primeira chamada.
fn default_stage_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_backoff_base() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_stage_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_base: default_backoff_base(),
            jitter: default_true(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            backoff_base: self.backoff_base,
            jitter: self.jitter,
        }
    }
}

/// Parâmetros do fluxo completo.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowConfig {
    /// Reinícios completos antes de marcar o workflow como FAILED.
    #[serde(default = "default_workflow_retries")]
    pub max_retries: u32,

    /// Janela da verificação de execução duplicada.
    #[serde(default = "default_conflict_window_minutes")]
    pub conflict_window_minutes: i64,

    /// Idade a partir da qual pedidos de aprovação pendentes são apagados.
    #[serde(default = "default_stale_horizon_hours")]
    pub stale_horizon_hours: i64,

    #[serde(default = "default_topic_history")]
    pub topic_history: usize,

    #[serde(default = "default_media_limit")]
    pub media_limit: usize,
}

fn default_workflow_retries() -> u32 {
    2
}

fn default_conflict_window_minutes() -> i64 {
    10
}

fn default_stale_horizon_hours() -> i64 {
    24
}

fn default_topic_history() -> usize {
    50
}

fn default_media_limit() -> usize {
    5
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_retries: default_workflow_retries(),
            conflict_window_minutes: default_conflict_window_minutes(),
            stale_horizon_hours: default_stale_horizon_hours(),
            topic_history: default_topic_history(),
            media_limit: default_media_limit(),
        }
    }
}

/// Onde os registros de workflow ficam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    File,
    /// Só em memória; tudo se perde ao sair.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(".pressroom")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_storage_path(),
        }
    }
}

/// Pedido de aprovação.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_approver")]
    pub approver: String,

    /// Diretório onde as mensagens HTML são gravadas.
    #[serde(default = "default_outbox")]
    pub outbox: PathBuf,

    /// URL base para links de aprovação; sem ela o e-mail traz comandos da CLI.
    #[serde(default)]
    pub approval_url: Option<String>,
}

fn default_approver() -> String {
    "editor@localhost".to_string()
}

fn default_outbox() -> PathBuf {
    PathBuf::from(".pressroom/outbox")
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            approver: default_approver(),
            outbox: default_outbox(),
            approval_url: None,
        }
    }
}

/// Destino de publicação local.
#[derive(Debug, Clone, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_publish_dir")]
    pub dir: PathBuf,
}

fn default_publish_dir() -> PathBuf {
    PathBuf::from(".pressroom/published")
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            dir: default_publish_dir(),
        }
    }
}

impl PressroomConfig {
    /// Carrega a configuração de `path`, ou de `pressroom.toml` no diretório
    /// atual. Sem arquivo padrão, usa os defaults; um `path` explícito que
    /// não existe é erro.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };

        // Variável de ambiente tem precedência sobre o arquivo para a chave API.
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY")
            && !key.is_empty()
        {
            config.generator.api_key = key;
        }

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
    }

    /// Configurações do orquestrador derivadas das seções `workflow` e
    /// `notification`.
    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            max_retries: self.workflow.max_retries,
            conflict_window: chrono::Duration::minutes(self.workflow.conflict_window_minutes),
            stale_horizon: chrono::Duration::hours(self.workflow.stale_horizon_hours),
            topic_history: self.workflow.topic_history,
            media_limit: self.workflow.media_limit,
            approver: self.notification.approver.clone(),
            approval_url: self.notification.approval_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_values() {
        let config = PressroomConfig::default();
        assert_eq!(config.workflow.max_retries, 2);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.base_delay_ms, 2_000);
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert!(config.topics.is_empty());
        assert!(config.generator.api_key.is_empty());
    }

    #[test]
    fn deserialize_partial_toml() {
        let toml_str = r#"
            [generator]
            api_key = "sk-test-123"

            [workflow]
            max_retries = 4

            [quality]
            readability_min = 50.0

            [[topics]]
            title = "River Valleys"
            category = "Rivers"
            keywords = ["river cycling"]

            [storage]
            backend = "memory"
        "#;
        let config: PressroomConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.generator.api_key, "sk-test-123");
        assert_eq!(config.generator.model, default_model());
        assert_eq!(config.workflow.max_retries, 4);
        assert_eq!(config.workflow.conflict_window_minutes, 10);
        assert_eq!(config.quality.readability_min, 50.0);
        assert_eq!(config.quality.recent_window, 5);
        assert_eq!(config.topics.len(), 1);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn retry_section_builds_policy() {
        let config: PressroomConfig = toml::from_str(
            r#"
            [retry]
            max_retries = 1
            base_delay_ms = 10
            jitter = false
        "#,
        )
        .unwrap();
        let policy = config.retry.policy();
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
        assert_eq!(policy.max_delay, Duration::from_secs(30));
        assert!(!policy.jitter);
    }

    #[test]
    fn workflow_settings_carry_windows() {
        let settings = PressroomConfig::default().workflow_settings();
        assert_eq!(settings.conflict_window, chrono::Duration::minutes(10));
        assert_eq!(settings.stale_horizon, chrono::Duration::hours(24));
        assert_eq!(settings.approver, "editor@localhost");
    }

    #[test]
    fn load_reads_explicit_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "[workflow]\nmedia_limit = 3\n").unwrap();
        let config = PressroomConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.workflow.media_limit, 3);
    }

    #[test]
    fn load_rejects_missing_explicit_file() {
        assert!(PressroomConfig::load(Some(Path::new("/nonexistent/pressroom.toml"))).is_err());
    }
}
