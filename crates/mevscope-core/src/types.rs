/*!
 * Mevscope Types
 *
 * Tipos comuns usados em toda a workspace Mevscope
 */

use ethereum_types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// Alias para hash de transação
pub type TransactionHash = H256;

/// Valor de `decimals` usado como marcador de "não é token" no diretório
/// de metadados. Transferências com esse valor são descartadas.
pub const NON_TOKEN_DECIMALS: u32 = 666;

/// Pseudo-endereço reservado para a moeda nativa, distinto do contrato
/// do token nativo encapsulado.
pub fn native_token_address() -> Address {
    Address::repeat_byte(0xee)
}

/// Endereço do WETH na mainnet, usado como padrão de token nativo encapsulado.
pub fn wrapped_native_mainnet() -> Address {
    Address::from_slice(&[
        0xc0, 0x2a, 0xaa, 0x39, 0xb2, 0x23, 0xfe, 0x8d, 0x0a, 0x0e,
        0x5c, 0x4f, 0x27, 0xea, 0xd9, 0x08, 0x3c, 0x75, 0x6c, 0xc2,
    ])
}

/// Informações sobre um token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: Option<String>,
    pub decimals: Option<u32>,
}

impl TokenInfo {
    /// Indica se o registro pode ser usado para normalização decimal.
    pub fn is_usable(&self) -> bool {
        self.symbol.is_some()
            && matches!(self.decimals, Some(d) if d != 0 && d != NON_TOKEN_DECIMALS)
    }
}

/// Quantia de um token com símbolo resolvido, já ajustada por decimais
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenAmount {
    pub token: Address,
    pub symbol: String,
    pub amount: f64,
}

/// Nó de um call trace no formato do callTracer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallFrame {
    pub from: String,
    #[serde(default)]
    pub to: String,
    pub input: String,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(rename = "type", default)]
    pub call_type: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub calls: Option<Vec<CallFrame>>,
}

/// Log de evento emitido por uma transação
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Vec<u8>,
}

/// Recibo de transação reduzido ao que a classificação consome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxReceipt {
    pub block_number: u64,
    pub gas_used: U256,
    pub effective_gas_price: Option<U256>,
    pub status: bool,
    pub logs: Vec<LogEntry>,
}
