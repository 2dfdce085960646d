use thiserror::Error;

/// Erros comuns da workspace Mevscope
#[derive(Error, Debug)]
pub enum Error {
    /// Erro de comunicação com o node Ethereum
    #[error("Erro de RPC: {0}")]
    RpcError(String),

    /// Erro de decodificação de dados
    #[error("Erro de decodificação: {0}")]
    DecodeError(String),

    /// Dados indisponíveis (trace, recibo, ABI ou preço)
    #[error("Dados ausentes: {0}")]
    MissingData(String),

    /// Falha de simulação histórica (chamada revertida ou retorno ilegível)
    #[error("Falha de simulação: {0}")]
    SimulationFailure(String),

    /// Violação de invariante da classificação
    #[error("Erro de validação: {0}")]
    ValidationError(String),

    /// Recurso não encontrado
    #[error("Não encontrado: {0}")]
    NotFound(String),

    /// Erro genérico
    #[error("{0}")]
    Other(String),
}

/// Tipo de resultado usado em toda a workspace
pub type Result<T> = std::result::Result<T, Error>;
