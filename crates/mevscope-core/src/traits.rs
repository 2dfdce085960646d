/*!
 * Mevscope Traits
 *
 * Contratos dos colaboradores externos consumidos pelo núcleo de classificação
 */

use async_trait::async_trait;
use crate::error::Result;
use crate::types::{CallFrame, TokenInfo, TransactionHash, TxReceipt};
use ethereum_types::Address;
use std::collections::HashMap;

/// Fonte de traces e recibos de transações
#[async_trait]
pub trait TraceSource: Send + Sync {
    /// Obtém a árvore de chamadas de uma transação, se disponível
    async fn call_trace(&self, tx_hash: TransactionHash) -> Result<Option<CallFrame>>;

    /// Obtém o recibo de uma transação, se disponível
    async fn receipt(&self, tx_hash: TransactionHash) -> Result<Option<TxReceipt>>;
}

/// Resolutor de metadados de tokens (símbolo e decimais por endereço)
#[async_trait]
pub trait TokenResolver: Send + Sync {
    /// Resolve um único token
    async fn resolve(&self, token: Address) -> Result<Option<TokenInfo>>;

    /// Resolve um conjunto de tokens de uma vez
    async fn resolve_many(&self, tokens: &[Address]) -> Result<HashMap<Address, TokenInfo>> {
        let mut out = HashMap::with_capacity(tokens.len());
        for &token in tokens {
            if let Some(info) = self.resolve(token).await? {
                out.insert(token, info);
            }
        }
        Ok(out)
    }
}

/// Chamada de contrato em estado histórico
#[async_trait]
pub trait ContractCaller: Send + Sync {
    /// Executa um `eth_call` contra `to` no bloco informado
    /// (ou no mais recente, quando `block` é `None`)
    async fn call_at(&self, to: Address, data: Vec<u8>, block: Option<u64>) -> Result<Vec<u8>>;
}

/// Serviço de preços históricos em USD
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// Preço do token em USD no instante unix informado, se conhecido
    async fn price_at(&self, token: Address, unix_timestamp: u64) -> Result<Option<f64>>;
}
