/*!
 * Mevscope RPC
 *
 * Cliente RPC para interação com nodes Ethereum: traces no formato
 * callTracer, recibos, chamadas em estado histórico e cache com TTL.
 * Dados históricos são imutáveis, então respostas são cacheadas livremente.
 */

use async_trait::async_trait;
use ethereum_types::Address;
use mevscope_core::{
    error::Result,
    traits::{ContractCaller, TraceSource},
    types::{CallFrame, LogEntry, TransactionHash, TxReceipt},
    Error,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;
use web3::{
    transports::{Http, WebSocket},
    types::{BlockId, BlockNumber, Bytes, CallRequest, U64},
    Transport, Web3,
};

/// Configuração do cliente RPC
#[derive(Debug, Clone)]
pub struct RpcConfig {
    pub endpoint: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub use_cache: bool,
    pub cache_ttl: Duration,
    pub connection_pool_size: usize,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8545".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
            use_cache: true,
            cache_ttl: Duration::from_secs(60),
            connection_pool_size: 10,
        }
    }
}

/// Enum para diferentes tipos de transporte
pub enum TransportType {
    Http(Web3<Http>),
    WebSocket(Web3<WebSocket>),
}

/// Cliente RPC para Ethereum
pub struct MevscopeRpcClient {
    transport: TransportType,
    config: RpcConfig,
    cache: Arc<RwLock<HashMap<String, (Vec<u8>, Instant)>>>,
}

/// Aplica um prazo a uma chamada de transporte, normalizando o erro
async fn bounded<F, E>(
    limit: Duration,
    call: F,
) -> std::result::Result<serde_json::Value, String>
where
    F: std::future::Future<Output = std::result::Result<serde_json::Value, E>>,
    E: std::fmt::Display,
{
    match tokio::time::timeout(limit, call).await {
        Ok(inner) => inner.map_err(|e| e.to_string()),
        Err(_) => Err(format!("tempo esgotado após {:?}", limit)),
    }
}

impl MevscopeRpcClient {
    /// Cria um novo cliente RPC HTTP
    pub async fn new_http(config: RpcConfig) -> Result<Self> {
        let transport = Http::new(&config.endpoint)
            .map_err(|e| Error::RpcError(format!("Falha ao conectar via HTTP: {}", e)))?;

        let web3 = Web3::new(transport);

        // Verifica a conexão
        web3.eth()
            .block_number()
            .await
            .map_err(|e| Error::RpcError(format!("Falha ao conectar ao node Ethereum: {}", e)))?;

        Ok(Self {
            transport: TransportType::Http(web3),
            config,
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Cria um novo cliente RPC WebSocket
    pub async fn new_websocket(config: RpcConfig) -> Result<Self> {
        let transport = WebSocket::new(&config.endpoint)
            .await
            .map_err(|e| Error::RpcError(format!("Falha ao conectar via WebSocket: {}", e)))?;

        let web3 = Web3::new(transport);

        // Verifica a conexão
        web3.eth()
            .block_number()
            .await
            .map_err(|e| Error::RpcError(format!("Falha ao conectar ao node Ethereum: {}", e)))?;

        Ok(Self {
            transport: TransportType::WebSocket(web3),
            config,
            cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Cria um novo cliente baseado na URL
    pub async fn new(config: RpcConfig) -> Result<Self> {
        if config.endpoint.starts_with("ws") {
            Self::new_websocket(config).await
        } else {
            Self::new_http(config).await
        }
    }

    /// Executa um método JSON-RPC cru, com retry, backoff fixo e o
    /// prazo por tentativa de `config.timeout`
    async fn execute(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let mut attempt = 0u32;
        loop {
            let call = async {
                match &self.transport {
                    TransportType::Http(web3) => {
                        web3.transport().execute(method, params.clone()).await
                    }
                    TransportType::WebSocket(web3) => {
                        web3.transport().execute(method, params.clone()).await
                    }
                }
            };
            match bounded(self.config.timeout, call).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(method, attempt, error = %e, "chamada RPC falhou, repetindo");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => {
                    return Err(Error::RpcError(format!(
                        "Falha na chamada {}: {}",
                        method, e
                    )))
                }
            }
        }
    }

    fn cache_get(&self, key: &str) -> Option<Vec<u8>> {
        if !self.config.use_cache {
            return None;
        }
        let cache = self.cache.read();
        cache.get(key).and_then(|(data, timestamp)| {
            if timestamp.elapsed() < self.config.cache_ttl {
                Some(data.clone())
            } else {
                None
            }
        })
    }

    fn cache_put(&self, key: String, data: Vec<u8>) {
        if !self.config.use_cache {
            return;
        }
        let mut cache = self.cache.write();
        cache.insert(key, (data, Instant::now()));
    }

    /// Obtém a árvore de chamadas de uma transação via callTracer
    pub async fn transaction_trace(&self, tx_hash: TransactionHash) -> Result<Option<CallFrame>> {
        let cache_key = format!("trace_{:x}", tx_hash);
        if let Some(data) = self.cache_get(&cache_key) {
            let frame = serde_json::from_slice(&data)
                .map_err(|e| Error::DecodeError(format!("Falha ao decodificar trace: {}", e)))?;
            return Ok(Some(frame));
        }

        let params = vec![
            serde_json::Value::String(format!("{:?}", tx_hash)),
            serde_json::json!({
                "tracer": "callTracer",
                "timeout": "60s"
            }),
        ];
        let value = self.execute("debug_traceTransaction", params).await?;
        if value.is_null() {
            return Ok(None);
        }
        let frame: CallFrame = serde_json::from_value(value)
            .map_err(|e| Error::DecodeError(format!("Falha ao decodificar trace: {}", e)))?;

        let bytes = serde_json::to_vec(&frame)
            .map_err(|e| Error::DecodeError(format!("Falha ao serializar trace: {}", e)))?;
        self.cache_put(cache_key, bytes);
        Ok(Some(frame))
    }

    /// Obtém o recibo de uma transação, reduzido ao que o núcleo consome
    pub async fn transaction_receipt(
        &self,
        tx_hash: TransactionHash,
    ) -> Result<Option<TxReceipt>> {
        let cache_key = format!("receipt_{:x}", tx_hash);
        if let Some(data) = self.cache_get(&cache_key) {
            let receipt = serde_json::from_slice(&data)
                .map_err(|e| Error::DecodeError(format!("Falha ao decodificar recibo: {}", e)))?;
            return Ok(Some(receipt));
        }

        let receipt = match &self.transport {
            TransportType::Http(web3) => web3
                .eth()
                .transaction_receipt(tx_hash)
                .await
                .map_err(|e| Error::RpcError(format!("Falha ao obter recibo: {}", e)))?,
            TransportType::WebSocket(web3) => web3
                .eth()
                .transaction_receipt(tx_hash)
                .await
                .map_err(|e| Error::RpcError(format!("Falha ao obter recibo: {}", e)))?,
        };
        let Some(receipt) = receipt else {
            return Ok(None);
        };
        let receipt = reduce_receipt(receipt);

        let bytes = serde_json::to_vec(&receipt)
            .map_err(|e| Error::DecodeError(format!("Falha ao serializar recibo: {}", e)))?;
        self.cache_put(cache_key, bytes);
        Ok(Some(receipt))
    }

    /// Timestamp unix de um bloco
    pub async fn block_timestamp(&self, block_number: u64) -> Result<u64> {
        let id = BlockId::Number(BlockNumber::Number(U64::from(block_number)));
        let block = match &self.transport {
            TransportType::Http(web3) => web3
                .eth()
                .block(id)
                .await
                .map_err(|e| Error::RpcError(format!("Falha ao obter bloco: {}", e)))?,
            TransportType::WebSocket(web3) => web3
                .eth()
                .block(id)
                .await
                .map_err(|e| Error::RpcError(format!("Falha ao obter bloco: {}", e)))?,
        };
        let block = block.ok_or_else(|| Error::NotFound("Bloco não encontrado".to_string()))?;
        Ok(block.timestamp.as_u64())
    }

    /// Obtém o número do bloco atual
    pub async fn block_number(&self) -> Result<u64> {
        let number = match &self.transport {
            TransportType::Http(web3) => web3
                .eth()
                .block_number()
                .await
                .map_err(|e| Error::RpcError(format!("Falha ao obter número do bloco: {}", e)))?,
            TransportType::WebSocket(web3) => web3
                .eth()
                .block_number()
                .await
                .map_err(|e| Error::RpcError(format!("Falha ao obter número do bloco: {}", e)))?,
        };
        Ok(number.as_u64())
    }

    /// Limpa o cache
    pub fn clear_cache(&self) {
        let mut cache = self.cache.write();
        cache.clear();
    }
}

/// Reduz o recibo do web3 ao formato interno
fn reduce_receipt(receipt: web3::types::TransactionReceipt) -> TxReceipt {
    TxReceipt {
        block_number: receipt.block_number.map(|n| n.as_u64()).unwrap_or_default(),
        gas_used: receipt.gas_used.unwrap_or_default(),
        effective_gas_price: receipt.effective_gas_price,
        status: receipt.status.map(|s| s.as_u64() == 1).unwrap_or_default(),
        logs: receipt
            .logs
            .into_iter()
            .map(|log| LogEntry {
                address: log.address,
                topics: log.topics,
                data: log.data.0,
            })
            .collect(),
    }
}

#[async_trait]
impl TraceSource for MevscopeRpcClient {
    async fn call_trace(&self, tx_hash: TransactionHash) -> Result<Option<CallFrame>> {
        self.transaction_trace(tx_hash).await
    }

    async fn receipt(&self, tx_hash: TransactionHash) -> Result<Option<TxReceipt>> {
        self.transaction_receipt(tx_hash).await
    }
}

#[async_trait]
impl ContractCaller for MevscopeRpcClient {
    async fn call_at(&self, to: Address, data: Vec<u8>, block: Option<u64>) -> Result<Vec<u8>> {
        let request = CallRequest {
            from: None,
            to: Some(to),
            gas: None,
            gas_price: None,
            value: None,
            data: Some(Bytes(data)),
            transaction_type: None,
            access_list: None,
            max_fee_per_gas: None,
            max_priority_fee_per_gas: None,
        };
        let at = block.map(|n| BlockId::Number(BlockNumber::Number(U64::from(n))));

        let result = match &self.transport {
            TransportType::Http(web3) => web3
                .eth()
                .call(request, at)
                .await
                .map_err(|e| Error::SimulationFailure(format!("Falha na chamada: {}", e)))?,
            TransportType::WebSocket(web3) => web3
                .eth()
                .call(request, at)
                .await
                .map_err(|e| Error::SimulationFailure(format!("Falha na chamada: {}", e)))?,
        };
        Ok(result.0)
    }
}

/// Pool de conexões RPC com distribuição round-robin
pub struct RpcConnectionPool {
    clients: Vec<Arc<MevscopeRpcClient>>,
    current_index: std::sync::atomic::AtomicUsize,
}

impl RpcConnectionPool {
    /// Cria um novo pool de conexões
    pub async fn new(config: RpcConfig, pool_size: usize) -> Result<Self> {
        let mut clients = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            clients.push(Arc::new(MevscopeRpcClient::new(config.clone()).await?));
        }
        Ok(Self {
            clients,
            current_index: std::sync::atomic::AtomicUsize::new(0),
        })
    }

    /// Obtém o próximo cliente do pool
    pub fn get_client(&self) -> Arc<MevscopeRpcClient> {
        let index = self
            .current_index
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
            % self.clients.len();
        self.clients[index].clone()
    }
}

/// Cliente RPC com balanceamento de carga sobre o pool
pub struct LoadBalancedRpcClient {
    pool: RpcConnectionPool,
}

impl LoadBalancedRpcClient {
    pub async fn new(config: RpcConfig) -> Result<Self> {
        let pool = RpcConnectionPool::new(config.clone(), config.connection_pool_size).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl TraceSource for LoadBalancedRpcClient {
    async fn call_trace(&self, tx_hash: TransactionHash) -> Result<Option<CallFrame>> {
        self.pool.get_client().transaction_trace(tx_hash).await
    }

    async fn receipt(&self, tx_hash: TransactionHash) -> Result<Option<TxReceipt>> {
        self.pool.get_client().transaction_receipt(tx_hash).await
    }
}

#[async_trait]
impl ContractCaller for LoadBalancedRpcClient {
    async fn call_at(&self, to: Address, data: Vec<u8>, block: Option<u64>) -> Result<Vec<u8>> {
        self.pool.get_client().call_at(to, data, block).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::{H256, U256};

    #[test]
    fn test_reduce_receipt_maps_logs_and_status() {
        let receipt = web3::types::TransactionReceipt {
            block_number: Some(U64::from(100u64)),
            gas_used: Some(U256::from(21_000u64)),
            effective_gas_price: Some(U256::from(1_000_000_000u64)),
            status: Some(U64::from(1u64)),
            logs: vec![web3::types::Log {
                address: Address::from_low_u64_be(5),
                topics: vec![H256::repeat_byte(0xaa)],
                data: Bytes(vec![1, 2, 3]),
                block_hash: None,
                block_number: None,
                transaction_hash: None,
                transaction_index: None,
                log_index: None,
                transaction_log_index: None,
                log_type: None,
                removed: None,
            }],
            ..Default::default()
        };

        let reduced = reduce_receipt(receipt);
        assert_eq!(reduced.block_number, 100);
        assert!(reduced.status);
        assert_eq!(reduced.logs.len(), 1);
        assert_eq!(reduced.logs[0].data, vec![1, 2, 3]);
    }

    #[test]
    fn test_trace_value_parses_into_call_frame() {
        let value = serde_json::json!({
            "from": "0x0000000000000000000000000000000000000001",
            "to": "0x0000000000000000000000000000000000000002",
            "input": "0xa9059cbb",
            "type": "CALL",
            "calls": [
                {"from": "0x0000000000000000000000000000000000000002",
                 "to": "0x0000000000000000000000000000000000000003",
                 "input": "0x"}
            ]
        });
        let frame: CallFrame = serde_json::from_value(value).unwrap();
        assert_eq!(frame.call_type.as_deref(), Some("CALL"));
        assert_eq!(frame.calls.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bounded_cuts_off_stalled_call() {
        let stalled = std::future::pending::<std::result::Result<serde_json::Value, String>>();
        let result = bounded(Duration::from_millis(10), stalled).await;
        assert!(result.unwrap_err().contains("tempo esgotado"));
    }

    #[tokio::test]
    async fn test_bounded_passes_through_prompt_result() {
        let prompt = async { Ok::<_, String>(serde_json::json!(7)) };
        let result = bounded(Duration::from_secs(1), prompt).await;
        assert_eq!(result.unwrap(), serde_json::json!(7));
    }
}
