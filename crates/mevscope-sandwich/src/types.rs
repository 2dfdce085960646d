use async_trait::async_trait;
use ethereum_types::{Address, U256};
use mevscope_core::{error::Result, types::TransactionHash};
use serde::{Deserialize, Serialize};

/// Operação de um trader contra o pool monitorado, já decodificada
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PoolOperation {
    Swap {
        /// Índice do coin de entrada no pool
        coin_in: i32,
        /// Índice do coin de saída no pool
        coin_out: i32,
        amount_in: U256,
        amount_out: U256,
        /// Troca pelos ativos subjacentes (pools com lending wrappers)
        underlying: bool,
    },
    Deposit {
        /// Quantias depositadas, uma por coin do pool
        amounts: Vec<U256>,
        /// Tokens LP efetivamente cunhados, quando o lookup direto resolve
        minted: Option<U256>,
    },
    Withdraw {
        /// Tokens LP queimados
        burned: U256,
        /// Índice do coin sacado
        coin_index: i32,
        received: U256,
    },
}

/// Uma transação do cluster, anotada com seus movimentos resolvidos
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterTx {
    pub tx_id: TransactionHash,
    /// Posição da transação dentro do bloco
    pub trace_position: usize,
    pub trader: Address,
    pub op: PoolOperation,
}

/// Cluster de transações do mesmo bloco contra o mesmo pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandwichCluster {
    pub pool: Address,
    pub pool_id: u64,
    pub block_number: u64,
    /// Timestamp unix do bloco, usado na valoração em USD
    pub block_timestamp: u64,
    pub txs: Vec<ClusterTx>,
}

/// Prejuízo de uma vítima: diferença entre o rendimento simulado contra o
/// estado do pool em `block - 1` e o rendimento realizado
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VictimLoss {
    pub tx_id: TransactionHash,
    pub amount: f64,
    pub unit: String,
    pub unit_address: Address,
    pub loss_in_percentage: f64,
    pub loss_in_usd: Option<f64>,
}

/// Registro persistido uma vez por par de bot detectado
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandwichRecord {
    pub pool_id: u64,
    pub frontrun_tx_id: TransactionHash,
    pub backrun_tx_id: TransactionHash,
    /// Ao menos uma perda foi medida diretamente contra o replay do pool
    pub extracted_from_curve: bool,
    pub loss_transactions: Option<Vec<VictimLoss>>,
}

/// Metadados de um coin do pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinInfo {
    pub address: Address,
    pub symbol: String,
    pub decimals: u32,
}

/// Diretório de pools: lista de coins por índice e token LP
#[async_trait]
pub trait PoolDirectory: Send + Sync {
    async fn pool_coins(&self, pool: Address) -> Result<Vec<CoinInfo>>;
    async fn lp_token(&self, pool: Address) -> Result<CoinInfo>;
}

/// Busca de eventos Transfer on-chain, usada na reconciliação de depósitos
#[async_trait]
pub trait TransferLogSource: Send + Sync {
    /// Quantias de `token` transferidas para `to` dentro do bloco
    async fn minted_amounts(&self, token: Address, to: Address, block: u64) -> Result<Vec<U256>>;
}

/// Persistência dos registros de sandwich
#[async_trait]
pub trait SandwichSink: Send + Sync {
    async fn upsert_record(&self, record: &SandwichRecord) -> Result<()>;
    async fn mark_sandwich(&self, tx_id: TransactionHash, is_sandwich: bool) -> Result<()>;
}

/// Configuração do detector de sandwich
#[derive(Debug, Clone)]
pub struct SandwichConfig {
    /// Clusters avaliados concorrentemente por lote
    pub chunk_size: usize,
    /// Tolerância relativa na reconciliação do minted de um depósito
    pub deposit_match_tolerance: f64,
}

impl Default for SandwichConfig {
    fn default() -> Self {
        Self {
            chunk_size: 16,
            deposit_match_tolerance: 0.05,
        }
    }
}
