//! Interface de terminal do invoker — spinner e saída colorida.
//!
//! Usa as crates `indicatif` para o spinner de progresso e `console` para
//! estilização com cores. O [`JobProgress`] se registra como ouvinte de
//! estado e de mensagens de uma [`JobInvocation`] e mostra cada evento
//! no terminal à medida que chega.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::invocation::{JobInfo, JobInvocation, JobMessage, JobState, MessageImportance};
use crate::runner::PipelineRunner;

/// Indicador visual de progresso para uma invocação de job no terminal.
///
/// Exibe um spinner animado enquanto o job não termina e uma linha por
/// transição de estado ou mensagem de diagnóstico.
pub struct JobProgress {
    // Barra de progresso/spinner do indicatif.
    pb: ProgressBar,
}

impl JobProgress {
    /// Inicia o spinner para o job e retorna a instância de progresso.
    pub fn start(job_id: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(format!("{job_id}: {}", JobState::Stopped));
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        Self { pb }
    }

    /// Registra os ouvintes de estado e de mensagens na invocação.
    pub fn attach<R: PipelineRunner>(&self, job: &JobInvocation<R>) {
        let pb = self.pb.clone();
        let job_id = job.id().to_string();
        job.add_state_listener(move |state| {
            pb.set_message(format!("{job_id}: {state}"));
            pb.println(format!("  {} {state}", state_style(state).apply_to(state_marker(state))));
        });

        let pb = self.pb.clone();
        job.add_message_listener(move |msg: &JobMessage| {
            let style = message_style(msg.importance);
            pb.println(format!(
                "    {} {}",
                style.apply_to(format!("[{}]", msg.importance)),
                msg.text
            ));
        });
    }

    /// Finaliza o spinner e exibe o estado final do job.
    pub fn complete(&self, state: JobState) {
        self.pb.finish_and_clear();
        println!(
            "  {} Job finished in state {state}",
            state_style(state).apply_to(state_marker(state))
        );
    }

    /// Imprime o resumo da invocação em JSON.
    pub fn print_info(&self, info: &JobInfo) {
        println!();
        println!("{}", state_style(info.state).apply_to("─── Job Info ───"));
        println!("{}", serde_json::to_string_pretty(info).unwrap_or_default());
    }
}

// Símbolo exibido ao lado de cada estado.
fn state_marker(state: JobState) -> &'static str {
    match state {
        JobState::Done => "✓",
        JobState::Failed | JobState::Cancelled => "✗",
        JobState::Drained | JobState::Unspecified => "?",
        JobState::Stopped | JobState::Starting | JobState::Running => "●",
    }
}

// Verde para sucesso, vermelho para falha, amarelo para o resto.
fn state_style(state: JobState) -> Style {
    match state {
        JobState::Done => Style::new().green().bold(),
        JobState::Failed | JobState::Cancelled => Style::new().red().bold(),
        _ => Style::new().yellow(),
    }
}

fn message_style(importance: MessageImportance) -> Style {
    match importance {
        MessageImportance::Error => Style::new().red(),
        MessageImportance::Warning => Style::new().yellow(),
        _ => Style::new().dim(),
    }
}
