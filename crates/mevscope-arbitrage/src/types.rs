use async_trait::async_trait;
use ethereum_types::{Address, U256};
use mevscope_core::{
    error::Result,
    types::{native_token_address, wrapped_native_mainnet, TokenAmount, TransactionHash},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Caso de fluxo de valor de uma arbitragem atômica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArbCase {
    /// O valor extraído permanece com o bot ou o operador
    ValueStays,
    /// O valor extraído sai para uma terceira folha do grafo
    ValueExitsToLeaf,
}

/// Quantia que pode não ser separável das demais (caso B)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BribeValue {
    Known(TokenAmount),
    Unknown,
}

/// Ganho líquido, quando computável
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NetWin {
    Known(Vec<TokenAmount>),
    Unknown,
}

/// Custo de gas da transação
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasInfo {
    pub used: U256,
    pub price: U256,
    pub cost_native: f64,
}

/// Resultado positivo da classificação de arbitragem atômica
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomicArbResult {
    pub case: ArbCase,
    pub extracted_value: Vec<TokenAmount>,
    pub bribe: BribeValue,
    pub net_win: NetWin,
    pub gas: GasInfo,
}

/// Motivos de rejeição, na ordem em que os pré-filtros rodam
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotArbReason {
    TooFewSwapPairs,
    AggregatorInvolved,
    SparseBotActivity,
    ProxyForwarding,
    OriginMismatch,
    ExternalLeafInflow,
    TooManyTokens,
    BatchSettlement,
    PositionBeyondCeiling,
    GovernanceProxy,
    GlobalBackrun,
    NoValueFlowPattern,
}

impl fmt::Display for NotArbReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NotArbReason::TooFewSwapPairs => "too_few_swap_pairs",
            NotArbReason::AggregatorInvolved => "aggregator_involved",
            NotArbReason::SparseBotActivity => "sparse_bot_activity",
            NotArbReason::ProxyForwarding => "proxy_forwarding",
            NotArbReason::OriginMismatch => "origin_mismatch",
            NotArbReason::ExternalLeafInflow => "external_leaf_inflow",
            NotArbReason::TooManyTokens => "too_many_tokens",
            NotArbReason::BatchSettlement => "batch_settlement",
            NotArbReason::PositionBeyondCeiling => "position_beyond_ceiling",
            NotArbReason::GovernanceProxy => "governance_proxy",
            NotArbReason::GlobalBackrun => "global_backrun",
            NotArbReason::NoValueFlowPattern => "no_value_flow_pattern",
        };
        write!(f, "{}", s)
    }
}

/// Veredito da classificação
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArbClassification {
    NotArb(NotArbReason),
    Arb(AtomicArbResult),
}

/// Contexto posicional da transação dentro do bloco
#[derive(Debug, Clone)]
pub struct ArbTxContext {
    pub tx_hash: TransactionHash,
    /// Operador que assinou a transação
    pub from: Address,
    /// Contrato do bot
    pub to: Address,
    pub gas_used: U256,
    pub gas_price: U256,
    /// Posição da transação no bloco
    pub block_position: usize,
    /// `(from, to)` das transações anteriores do bloco, em ordem
    pub preceding_txs: Vec<(Address, Address)>,
}

/// Configuração do detector de arbitragem
#[derive(Debug, Clone)]
pub struct ArbConfig {
    /// Contratos agregadores conhecidos, cujo envolvimento rejeita a transação
    pub aggregators: HashSet<Address>,
    /// Contratos de liquidação em lote conhecidos
    pub settlement_contracts: HashSet<Address>,
    /// Posição de bloco máxima que ainda vale a pena verificar
    pub max_block_position: usize,
    /// Máximo de tokens distintos fluindo pelo contrato do bot
    pub max_distinct_tokens: usize,
    /// Janela inicial do trace considerada setup da chamada
    pub setup_position_ceiling: usize,
    /// Tamanho da fatia concorrente nos lotes
    pub chunk_size: usize,
    pub native_token: Address,
    pub wrapped_native: Address,
}

impl Default for ArbConfig {
    fn default() -> Self {
        Self {
            aggregators: HashSet::new(),
            settlement_contracts: HashSet::new(),
            max_block_position: 10,
            max_distinct_tokens: 8,
            setup_position_ceiling: 5,
            chunk_size: 16,
            native_token: native_token_address(),
            wrapped_native: wrapped_native_mainnet(),
        }
    }
}

/// Persistência do resultado de classificação por transação
#[async_trait]
pub trait ArbSink: Send + Sync {
    async fn store_classification(
        &self,
        tx_hash: TransactionHash,
        result: &ArbClassification,
    ) -> Result<()>;
}
