//! Interface de linha de comando do pressroom baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, status, list,
//! sweep, migrate, approve, decline) e flags globais (--config,
//! --max-retries, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::state_machine::{TriggerType, WorkflowStatus};

/// pressroom: pipeline de conteúdo com aprovação humana.
#[derive(Debug, Parser)]
#[command(name = "pressroom", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Arquivo de configuração (padrão: ./pressroom.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Reinícios completos do workflow antes de falhar.
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Origem da execução aceita pela CLI.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum TriggerArg {
    Daily,
    Manual,
}

impl From<TriggerArg> for TriggerType {
    fn from(arg: TriggerArg) -> Self {
        match arg {
            TriggerArg::Daily => TriggerType::Daily,
            TriggerArg::Manual => TriggerType::Manual,
        }
    }
}

/// Filtro de status para `list`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StatusArg {
    Active,
    Awaiting,
    Published,
    Declined,
    Rejected,
    Failed,
}

impl StatusArg {
    pub fn statuses(self) -> Vec<WorkflowStatus> {
        match self {
            StatusArg::Active => WorkflowStatus::ALL
                .into_iter()
                .filter(|s| s.is_in_progress())
                .collect(),
            StatusArg::Awaiting => vec![WorkflowStatus::EmailSent],
            StatusArg::Published => vec![WorkflowStatus::Published],
            StatusArg::Declined => vec![WorkflowStatus::Declined],
            StatusArg::Rejected => vec![WorkflowStatus::Rejected],
            StatusArg::Failed => vec![WorkflowStatus::Failed],
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa um workflow completo até o pedido de aprovação.
    Run {
        #[arg(long, value_enum, default_value = "manual")]
        trigger: TriggerArg,
    },

    /// Mostra o registro de um workflow.
    Status {
        id: String,
    },

    /// Lista workflows, do mais recente ao mais antigo.
    List {
        #[arg(long, value_enum)]
        status: Option<StatusArg>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Apaga pedidos de aprovação mais antigos que o horizonte configurado.
    Sweep,

    /// Atualiza registros gravados com um esquema antigo.
    Migrate,

    /// Aprova e publica um workflow aguardando aprovação.
    Approve {
        /// Id do workflow; pode ser omitido quando `--token` é informado.
        id: Option<String>,

        #[arg(long)]
        token: Option<String>,
    },

    /// Recusa um workflow aguardando aprovação.
    Decline {
        id: Option<String>,

        #[arg(long)]
        token: Option<String>,
    },
}
