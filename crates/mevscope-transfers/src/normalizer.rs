use ethereum_types::{Address, H256, U256};
use lru::LruCache;
use mevscope_core::{
    error::Result,
    traits::{TokenResolver, TraceSource},
    types::{native_token_address, wrapped_native_mainnet, LogEntry, TransactionHash},
    utils,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

use crate::methods::{MethodKind, MethodRegistry};
use crate::trace::{flatten_trace, FlatCall};
use mevscope_core::types::CallFrame;

/// Transferência bruta extraída do trace ou dos logs, ainda sem metadados
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub from: Address,
    pub to: Address,
    pub token: Address,
    pub amount: U256,
}

/// Transferência enriquecida com símbolo, quantia decimal e posição estável
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadableTransfer {
    pub from: Address,
    pub to: Address,
    pub token: Address,
    pub symbol: String,
    pub amount: U256,
    pub parsed_amount: f64,
    pub position: usize,
}

/// Configuração do normalizador de transferências
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// Pseudo-endereço da moeda nativa
    pub native_token: Address,
    /// Contrato do token nativo encapsulado
    pub wrapped_native: Address,
    /// Posição mínima a partir da qual mints fantasmas são sintetizados
    pub mint_position_floor: usize,
    /// Capacidade do cache de metadados de tokens
    pub metadata_cache_size: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            native_token: native_token_address(),
            wrapped_native: wrapped_native_mainnet(),
            mint_position_floor: 5,
            metadata_cache_size: 4096,
        }
    }
}

type Metadata = HashMap<Address, (String, u32)>;

/// Normalizador: converte árvore de chamadas + logs decodificados em uma
/// lista plana e ordenada de transferências legíveis.
pub struct TransferNormalizer {
    config: NormalizerConfig,
    methods: Arc<MethodRegistry>,
    resolver: Arc<dyn TokenResolver>,
    metadata_cache: Mutex<LruCache<Address, Option<(String, u32)>>>,
}

impl TransferNormalizer {
    pub fn new(
        resolver: Arc<dyn TokenResolver>,
        methods: Arc<MethodRegistry>,
        config: Option<NormalizerConfig>,
    ) -> Self {
        let config = config.unwrap_or_default();
        let cache_size = NonZeroUsize::new(config.metadata_cache_size.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            config,
            methods,
            resolver,
            metadata_cache: Mutex::new(LruCache::new(cache_size)),
        }
    }

    /// Normaliza uma transação a partir da fonte de traces. Retorna `None`
    /// quando trace ou recibo não estão disponíveis.
    pub async fn normalize_tx(
        &self,
        source: &dyn TraceSource,
        tx_hash: TransactionHash,
    ) -> Result<Option<Vec<ReadableTransfer>>> {
        let trace = match source.call_trace(tx_hash).await? {
            Some(trace) => trace,
            None => {
                debug!(tx = ?tx_hash, "trace indisponível");
                return Ok(None);
            }
        };
        let receipt = match source.receipt(tx_hash).await? {
            Some(receipt) => receipt,
            None => {
                debug!(tx = ?tx_hash, "recibo indisponível");
                return Ok(None);
            }
        };
        let tx_to = utils::hex_to_address(&trace.to).unwrap_or_default();
        self.normalize(&trace, &receipt.logs, tx_to).await.map(Some)
    }

    /// Normaliza um trace já obtido, com os logs do recibo para conferência
    pub async fn normalize(
        &self,
        trace: &CallFrame,
        logs: &[LogEntry],
        tx_to: Address,
    ) -> Result<Vec<ReadableTransfer>> {
        let calls = flatten_trace(trace)?;

        let mut raw = Vec::new();
        for call in &calls {
            self.decode_call(call, &mut raw);
        }
        self.merge_receipt_logs(&mut raw, logs);

        let meta = self.resolve_metadata(&raw).await?;
        let mut list = self.to_readable(raw, &meta);

        self.repair_wraps(&mut list, &meta);
        self.synthesize_mints(&mut list, tx_to);
        dedup_proxy_relay(&mut list);
        dedup_token_aliases(&mut list);
        reindex(&mut list);

        Ok(list)
    }

    /// Decodifica uma chamada em zero ou mais transferências brutas.
    /// Calldata malformado degrada descartando só a chamada em questão.
    fn decode_call(&self, call: &FlatCall, out: &mut Vec<TokenTransfer>) {
        let token = match call.to {
            Some(to) => to,
            None => return, // criação de contrato
        };

        let input = &call.input;
        match self.methods.lookup(token, input) {
            MethodKind::Transfer => {
                if let (Some(to), Some(amount)) =
                    (utils::address_from_word(input, 0), utils::u256_from_word(input, 1))
                {
                    push_transfer(out, call.from, to, token, amount);
                }
            }
            MethodKind::TransferFrom => {
                if let (Some(from), Some(to), Some(amount)) = (
                    utils::address_from_word(input, 0),
                    utils::address_from_word(input, 1),
                    utils::u256_from_word(input, 2),
                ) {
                    push_transfer(out, from, to, token, amount);
                }
            }
            MethodKind::Withdraw => {
                // unwrap: o token encapsulado volta para o contrato
                if let Some(amount) = utils::u256_from_word(input, 0) {
                    push_transfer(out, call.from, token, token, amount);
                }
            }
            MethodKind::Burn => {
                if let Some(amount) = utils::u256_from_word(input, 0) {
                    push_transfer(out, call.from, Address::zero(), token, amount);
                }
            }
            MethodKind::BurnFrom => {
                if let (Some(from), Some(amount)) =
                    (utils::address_from_word(input, 0), utils::u256_from_word(input, 1))
                {
                    push_transfer(out, from, Address::zero(), token, amount);
                }
            }
            MethodKind::AddLiquidity => {
                // amounts[0..2] depositados no pool; sobrevivem à resolução
                // apenas quando o pool é o próprio LP token
                for idx in 0..2 {
                    if let Some(amount) = utils::u256_from_word(input, idx) {
                        push_transfer(out, call.from, token, token, amount);
                    }
                }
            }
            MethodKind::Skip => {}
        }

        if !call.value.is_zero() {
            out.push(TokenTransfer {
                from: call.from,
                to: token,
                token: self.config.native_token,
                amount: call.value,
            });
        }
    }

    /// Acrescenta eventos `Transfer` do recibo que não têm contraparte
    /// nas transferências extraídas do trace
    fn merge_receipt_logs(&self, raw: &mut Vec<TokenTransfer>, logs: &[LogEntry]) {
        let transfer_topic =
            H256::from(utils::keccak256(b"Transfer(address,address,uint256)"));
        for log in logs {
            if log.topics.len() != 3 || log.topics[0] != transfer_topic {
                continue;
            }
            if log.data.len() < 32 {
                continue;
            }
            let from = Address::from_slice(&log.topics[1].as_bytes()[12..]);
            let to = Address::from_slice(&log.topics[2].as_bytes()[12..]);
            let amount = U256::from_big_endian(&log.data[..32]);
            if amount.is_zero() {
                continue;
            }
            let transfer = TokenTransfer { from, to, token: log.address, amount };
            if !raw.contains(&transfer) {
                raw.push(transfer);
            }
        }
    }

    /// Resolve símbolo e decimais dos tokens envolvidos, com cache LRU.
    /// Tokens irresolvíveis ficam fora do mapa e são descartados depois.
    async fn resolve_metadata(&self, raw: &[TokenTransfer]) -> Result<Metadata> {
        let mut meta: Metadata = HashMap::new();
        meta.insert(self.config.native_token, ("ETH".to_string(), 18));

        let mut missing = Vec::new();
        {
            let mut cache = self.metadata_cache.lock();
            for transfer in raw {
                let token = transfer.token;
                if meta.contains_key(&token) || missing.contains(&token) {
                    continue;
                }
                match cache.get(&token) {
                    Some(Some(entry)) => {
                        meta.insert(token, entry.clone());
                    }
                    Some(None) => {}
                    None => missing.push(token),
                }
            }
        }

        // garante metadados do wrapped para as sínteses de wrap/unwrap
        if !meta.contains_key(&self.config.wrapped_native)
            && !missing.contains(&self.config.wrapped_native)
        {
            missing.push(self.config.wrapped_native);
        }

        if !missing.is_empty() {
            let resolved = self.resolver.resolve_many(&missing).await?;
            let mut cache = self.metadata_cache.lock();
            for token in missing {
                let entry = resolved.get(&token).filter(|info| info.is_usable()).map(|info| {
                    (
                        info.symbol.clone().unwrap_or_default(),
                        info.decimals.unwrap_or_default(),
                    )
                });
                if let Some(entry) = &entry {
                    meta.insert(token, entry.clone());
                }
                cache.put(token, entry);
            }
        }

        Ok(meta)
    }

    fn to_readable(&self, raw: Vec<TokenTransfer>, meta: &Metadata) -> Vec<ReadableTransfer> {
        let mut list = Vec::with_capacity(raw.len());
        for transfer in raw {
            let (symbol, decimals) = match meta.get(&transfer.token) {
                Some(entry) => entry.clone(),
                None => {
                    debug!(token = ?transfer.token, "token sem metadados, descartando");
                    continue;
                }
            };
            let parsed_amount = utils::parsed_amount(&transfer.amount, decimals);
            list.push(ReadableTransfer {
                from: transfer.from,
                to: transfer.to,
                token: transfer.token,
                symbol,
                amount: transfer.amount,
                parsed_amount,
                position: list.len(),
            });
        }
        list
    }

    /// Sintetiza a perna que contratos de wrap opacos omitem: todo depósito
    /// nativo no contrato wrapped ganha o retorno em token wrapped, e todo
    /// token wrapped devolvido ao contrato ganha a saída nativa.
    pub(crate) fn repair_wraps(&self, list: &mut Vec<ReadableTransfer>, meta: &Metadata) {
        let native = self.config.native_token;
        let wrapped = self.config.wrapped_native;
        let wrapped_meta = meta.get(&wrapped).cloned();

        let mut inserts: Vec<(usize, ReadableTransfer)> = Vec::new();
        for i in 0..list.len() {
            let t = &list[i];
            if t.token == native && t.to == wrapped {
                let Some((symbol, decimals)) = wrapped_meta.clone() else { continue };
                let repair = ReadableTransfer {
                    from: wrapped,
                    to: t.from,
                    token: wrapped,
                    symbol,
                    parsed_amount: utils::parsed_amount(&t.amount, decimals),
                    amount: t.amount,
                    position: 0,
                };
                if !is_at(list, i + 1, &repair) {
                    inserts.push((i + 1, repair));
                }
            } else if t.token == wrapped && t.to == wrapped {
                let repair = ReadableTransfer {
                    from: wrapped,
                    to: t.from,
                    token: native,
                    symbol: "ETH".to_string(),
                    parsed_amount: utils::parsed_amount(&t.amount, 18),
                    amount: t.amount,
                    position: 0,
                };
                if !is_at(list, i + 1, &repair) {
                    inserts.push((i + 1, repair));
                }
            }
        }
        apply_inserts(list, inserts);
    }

    /// Sintetiza um "mint fantasma" antes de toda saída do contrato alvo
    /// cujo token nunca entrou nele, desde que além da posição de setup
    pub(crate) fn synthesize_mints(&self, list: &mut Vec<ReadableTransfer>, tx_to: Address) {
        let floor = self.config.mint_position_floor;
        let mut inserts: Vec<(usize, ReadableTransfer)> = Vec::new();
        for i in 0..list.len() {
            let t = &list[i];
            if t.from != tx_to || t.position <= floor {
                continue;
            }
            let has_inflow = list[..i].iter().any(|u| u.token == t.token && u.to == tx_to)
                || inserts.iter().any(|(_, m)| m.token == t.token);
            if !has_inflow {
                inserts.push((
                    i,
                    ReadableTransfer {
                        from: t.token,
                        to: tx_to,
                        token: t.token,
                        symbol: t.symbol.clone(),
                        amount: t.amount,
                        parsed_amount: t.parsed_amount,
                        position: 0,
                    },
                ));
            }
        }
        apply_inserts(list, inserts);
    }
}

fn push_transfer(out: &mut Vec<TokenTransfer>, from: Address, to: Address, token: Address, amount: U256) {
    if amount.is_zero() {
        return;
    }
    out.push(TokenTransfer { from, to, token, amount });
}

fn is_at(list: &[ReadableTransfer], idx: usize, expected: &ReadableTransfer) -> bool {
    list.get(idx).map_or(false, |t| {
        t.from == expected.from
            && t.to == expected.to
            && t.token == expected.token
            && t.amount == expected.amount
    })
}

fn apply_inserts(list: &mut Vec<ReadableTransfer>, mut inserts: Vec<(usize, ReadableTransfer)>) {
    if inserts.is_empty() {
        return;
    }
    inserts.sort_by(|a, b| b.0.cmp(&a.0));
    for (idx, transfer) in inserts {
        list.insert(idx, transfer);
    }
    reindex(list);
}

/// Colapsa o par em que um proxy intermediário repassa a mesma quantia
/// um salto adiante (mesmo destino, token como remetente do próximo,
/// posições consecutivas). A transferência anterior é mantida.
pub(crate) fn dedup_proxy_relay(list: &mut Vec<ReadableTransfer>) {
    let mut i = 0;
    while i + 1 < list.len() {
        let relayed = {
            let a = &list[i];
            let b = &list[i + 1];
            b.from == a.token
                && b.to == a.to
                && b.symbol == a.symbol
                && b.parsed_amount == a.parsed_amount
        };
        if relayed {
            list.remove(i + 1);
        } else {
            i += 1;
        }
    }
}

/// Colapsa duas transferências consecutivas idênticas em remetente,
/// destino, quantia e símbolo, mas com endereços de token diferentes
/// (artefato de proxy tokens)
pub(crate) fn dedup_token_aliases(list: &mut Vec<ReadableTransfer>) {
    let mut i = 0;
    while i + 1 < list.len() {
        let duplicated = {
            let a = &list[i];
            let b = &list[i + 1];
            a.from == b.from
                && a.to == b.to
                && a.parsed_amount == b.parsed_amount
                && a.symbol == b.symbol
                && a.token != b.token
        };
        if duplicated {
            list.remove(i + 1);
        } else {
            i += 1;
        }
    }
}

/// Reatribui posições densas 0..n após qualquer edição estrutural
pub fn reindex(list: &mut [ReadableTransfer]) {
    for (i, transfer) in list.iter_mut().enumerate() {
        transfer.position = i;
    }
}
