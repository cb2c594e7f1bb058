//! Interface de terminal do pressroom: spinners e saída colorida.
//!
//! Usa as crates `indicatif` para spinners de progresso e `console` para
//! estilização com cores. O [`WorkflowProgress`] acompanha visualmente a
//! execução de um workflow no terminal.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::PressroomError;
use crate::housekeeping::SweepReport;
use crate::orchestrator::WorkflowOutcome;
use crate::quality::QualityVerdict;
use crate::state_machine::{TriggerType, WorkflowRecord, WorkflowStatus};

/// Indicador visual de progresso para a execução de um workflow.
///
/// Exibe um spinner animado enquanto os estágios rodam e mensagens
/// coloridas para sucesso (verde), falha (vermelho) e avisos (amarelo).
pub struct WorkflowProgress {
    // Barra de progresso/spinner do indicatif.
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl WorkflowProgress {
    /// Inicia o spinner e retorna a instância de progresso.
    pub fn start(trigger: TriggerType) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("Running {trigger} workflow"));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Finaliza o spinner e exibe o resultado do workflow.
    pub fn complete(&self, result: &Result<WorkflowOutcome, PressroomError>) {
        self.pb.finish_and_clear();
        match result {
            Ok(WorkflowOutcome::AwaitingApproval {
                workflow_id,
                title,
                verdict,
                notified,
            }) => {
                println!(
                    "  {} \"{title}\" is waiting for approval ({workflow_id})",
                    self.green.apply_to("✓")
                );
                if !notified {
                    println!(
                        "  {} Approval notification could not be sent",
                        self.yellow.apply_to("!")
                    );
                }
                print_verdict(verdict);
            }
            Ok(WorkflowOutcome::Rejected {
                workflow_id,
                verdict,
            }) => {
                println!(
                    "  {} Draft rejected by the quality gate ({workflow_id})",
                    self.red.apply_to("✗")
                );
                print_verdict(verdict);
            }
            Ok(WorkflowOutcome::Conflict {
                existing_workflow_id,
            }) => {
                println!(
                    "  {} Workflow {existing_workflow_id} is still active, nothing started",
                    self.yellow.apply_to("↻")
                );
            }
            Err(e) => {
                println!("  {} {e}", self.red.apply_to("✗"));
            }
        }
    }
}

fn status_style(status: WorkflowStatus) -> Style {
    match status {
        WorkflowStatus::Published => Style::new().green().bold(),
        WorkflowStatus::EmailSent => Style::new().cyan(),
        WorkflowStatus::Failed | WorkflowStatus::Rejected => Style::new().red().bold(),
        WorkflowStatus::Declined => Style::new().red(),
        _ => Style::new().yellow(),
    }
}

/// Pontuação, critérios reprovados e revisões sugeridas.
pub fn print_verdict(verdict: &QualityVerdict) {
    let dim = Style::new().dim();
    println!(
        "    score {:.0}/100 · {} · {}",
        verdict.weighted_score * 100.0,
        verdict.decision,
        dim.apply_to(&verdict.recommendation)
    );
    for criterion in verdict.failed() {
        println!("    {} {criterion}", Style::new().red().apply_to("-"));
    }
    for revision in &verdict.feedback.revisions {
        println!("    {} {revision}", dim.apply_to("›"));
    }
}

/// Imprime o registro completo em JSON com cabeçalho colorido.
pub fn print_record(record: &WorkflowRecord) {
    println!(
        "{}",
        status_style(record.status).apply_to(format!("─── {} · {} ───", record.id, record.status))
    );
    println!(
        "{}",
        serde_json::to_string_pretty(record).unwrap_or_default()
    );
}

/// Uma linha por workflow: id, status, criação e título.
pub fn print_list(records: &[WorkflowRecord]) {
    if records.is_empty() {
        println!("No workflows found");
        return;
    }
    for record in records {
        let title = record
            .content
            .as_ref()
            .map(|c| c.title.as_str())
            .or_else(|| record.topic.as_ref().map(|t| t.title.as_str()))
            .unwrap_or("-");
        println!(
            "{}  {:<18}  {}  {}",
            record.id,
            status_style(record.status).apply_to(record.status.to_string()),
            record.created_at.format("%Y-%m-%d %H:%M"),
            title
        );
    }
}

pub fn print_sweep(report: &SweepReport) {
    println!(
        "  {} Deleted {} stale workflow(s)",
        Style::new().green().bold().apply_to("✓"),
        report.deleted.len()
    );
    for id in &report.failed {
        println!("  {} Could not delete {id}", Style::new().red().apply_to("✗"));
    }
}

/// Resultado de uma decisão de aprovação.
pub fn print_resolution(record: &WorkflowRecord) {
    match (&record.status, &record.published_url) {
        (WorkflowStatus::Published, Some(url)) => println!(
            "  {} Published: {url}",
            Style::new().green().bold().apply_to("✓")
        ),
        (status, _) => println!(
            "  {} Workflow {} is now {status}",
            status_style(*status).apply_to("•"),
            record.id
        ),
    }
}
