//! Interface de linha de comando do invoker baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (run, states)
//! e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::runner::{PipelineState, SimulatedOutcome};

/// invoker — Executa e acompanha uma invocação de job simulada.
#[derive(Debug, Parser)]
#[command(name = "invoker", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo de configuração (padrão: invoker.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

/// Como a execução simulada termina.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutcomeArg {
    /// O runner devolve um resultado em DONE.
    Done,
    /// O runner falha com um erro.
    Fail,
    /// O runner devolve um resultado que não está em DONE.
    NonDone,
    /// O runner termina sem resultado.
    Empty,
}

impl From<OutcomeArg> for SimulatedOutcome {
    fn from(arg: OutcomeArg) -> Self {
        match arg {
            OutcomeArg::Done => SimulatedOutcome::Done,
            OutcomeArg::Fail => SimulatedOutcome::Fail("simulated pipeline failure".into()),
            OutcomeArg::NonDone => SimulatedOutcome::NonDone(PipelineState::Failed),
            OutcomeArg::Empty => SimulatedOutcome::Empty,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Executa uma invocação simulada e mostra seus estados e mensagens.
    Run {
        /// Resultado da execução simulada.
        #[arg(long, value_enum, default_value_t = OutcomeArg::Done)]
        outcome: OutcomeArg,

        /// Duração da execução em milissegundos (padrão: da configuração).
        #[arg(long)]
        duration_ms: Option<u64>,

        /// Cancela o job depois deste número de milissegundos.
        #[arg(long)]
        cancel_after_ms: Option<u64>,

        /// Faz o cancelamento do resultado falhar.
        #[arg(long, default_value_t = false)]
        fail_cancel: bool,
    },

    /// Lista os estados de job e indica quais são terminais.
    States,
}
