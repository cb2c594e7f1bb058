//! Tipos de erro para geração de texto.
//!
//! Define [`GeneratorError`] para falhas ao chamar o modelo e
//! [`ExtractError`] para falhas ao decodificar JSON da resposta.

use thiserror::Error;

/// Erros que podem ocorrer ao chamar o modelo generativo.
///
/// - [`RateLimited`](GeneratorError::RateLimited): HTTP 429
/// - [`ApiError`](GeneratorError::ApiError): qualquer outro erro HTTP (4xx/5xx)
/// - [`Timeout`](GeneratorError::Timeout): a requisição excedeu o tempo limite
/// - [`NetworkError`](GeneratorError::NetworkError): falha na camada de rede
/// - [`EmptyResponse`](GeneratorError::EmptyResponse): resposta sem bloco de texto
#[derive(Debug, Error)]
pub enum GeneratorError {
    /// O servidor retornou HTTP 429.
    /// `retry_after_ms` indica quantos milissegundos esperar antes de retentar.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Erro retornado pela API (ex.: 401 chave inválida, 503 indisponível).
    #[error("API error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("request timed out")]
    Timeout,

    /// Falha de rede subjacente (DNS, conexão recusada).
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("model returned no text content")]
    EmptyResponse,
}

impl GeneratorError {
    /// Vale a pena retentar? Rate limit, 5xx, timeout e falhas de conexão sim;
    /// erros de cliente (4xx) e respostas vazias não.
    pub fn is_transient(&self) -> bool {
        match self {
            GeneratorError::RateLimited { .. } | GeneratorError::Timeout => true,
            GeneratorError::ApiError { status, .. } => *status >= 500,
            GeneratorError::NetworkError(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            GeneratorError::EmptyResponse => false,
        }
    }
}

/// Falha ao extrair um objeto JSON da saída do modelo.
///
/// É o sentinela de "parse falhou": quem chama decide se isso é um
/// erro de validação.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("no JSON object found in model output")]
    NotFound,

    #[error("malformed JSON in model output: {0}")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limited_display() {
        let err = GeneratorError::RateLimited {
            retry_after_ms: 5000,
        };
        assert_eq!(err.to_string(), "rate limited, retry after 5000ms");
    }

    #[test]
    fn api_error_display() {
        let err = GeneratorError::ApiError {
            status: 401,
            message: "Invalid API key".into(),
        };
        assert_eq!(err.to_string(), "API error (status 401): Invalid API key");
    }

    #[test]
    fn transient_classification() {
        assert!(GeneratorError::Timeout.is_transient());
        assert!(GeneratorError::RateLimited { retry_after_ms: 1 }.is_transient());
        assert!(
            GeneratorError::ApiError {
                status: 502,
                message: String::new()
            }
            .is_transient()
        );
        assert!(
            !GeneratorError::ApiError {
                status: 400,
                message: String::new()
            }
            .is_transient()
        );
        assert!(!GeneratorError::EmptyResponse.is_transient());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GeneratorError>();
        assert_send_sync::<ExtractError>();
    }
}
