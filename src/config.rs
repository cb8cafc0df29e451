//! Configuração do invoker carregada a partir de `invoker.toml`.
//!
//! A struct [`InvokerConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `INVOKER_LOG` tem precedência sobre o arquivo
//! para o nível de log.

use serde::Deserialize;
use std::path::Path;

use crate::error::InvokerError;

/// Arquivo lido quando nenhum caminho é passado via `--config`.
pub const DEFAULT_CONFIG_FILE: &str = "invoker.toml";

/// Configuração de nível superior carregada de `invoker.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct InvokerConfig {
    /// Número de threads do runtime tokio onde os jobs são executados.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,

    /// Filtro de log padrão (sintaxe do `EnvFilter`).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Duração padrão, em milissegundos, de uma execução simulada.
    #[serde(default = "default_simulated_duration_ms")]
    pub simulated_duration_ms: u64,
}

// Valor padrão para threads do runtime: 2.
fn default_worker_threads() -> usize {
    2
}

// Valor padrão para o nível de log: "info".
fn default_log_level() -> String {
    "info".to_string()
}

// Valor padrão para a duração simulada: 250ms.
fn default_simulated_duration_ms() -> u64 {
    250
}

impl Default for InvokerConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
            log_level: default_log_level(),
            simulated_duration_ms: default_simulated_duration_ms(),
        }
    }
}

impl InvokerConfig {
    /// Carrega a configuração do caminho dado, ou de `invoker.toml` no
    /// diretório atual. Usa valores padrão se o arquivo não existir.
    pub fn load(path: Option<&Path>) -> Result<Self, InvokerError> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str::<InvokerConfig>(&contents)?
        } else {
            Self::default()
        };

        config.apply_log_override(std::env::var("INVOKER_LOG").ok());
        config.validate()?;
        Ok(config)
    }

    // Variável de ambiente tem precedência sobre o arquivo de configuração.
    fn apply_log_override(&mut self, value: Option<String>) {
        if let Some(level) = value
            && !level.is_empty()
        {
            self.log_level = level;
        }
    }

    fn validate(&self) -> Result<(), InvokerError> {
        if self.worker_threads == 0 {
            return Err(InvokerError::Config(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
