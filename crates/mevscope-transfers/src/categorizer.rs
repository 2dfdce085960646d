use ethereum_types::Address;
use mevscope_core::{
    error::Result,
    types::{native_token_address, wrapped_native_mainnet},
    Error,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::normalizer::ReadableTransfer;

/// Partição de uma lista de transferências em grupos econômicos disjuntos.
/// Toda transferência de entrada aparece em exatamente um grupo.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct CategorizedTransfers {
    pub swaps: Vec<(ReadableTransfer, ReadableTransfer)>,
    pub multi_step_swaps: Vec<Vec<ReadableTransfer>>,
    pub liquidity_pairs: Vec<(ReadableTransfer, ReadableTransfer)>,
    pub liquidity_events: Vec<Vec<ReadableTransfer>>,
    pub wraps_and_unwraps: Vec<(ReadableTransfer, ReadableTransfer)>,
    pub inflowing_eth: Vec<ReadableTransfer>,
    pub outflowing_eth: Vec<ReadableTransfer>,
    pub isolated_transfers: Vec<ReadableTransfer>,
    pub remainder: Vec<ReadableTransfer>,
}

impl CategorizedTransfers {
    /// Número total de transferências particionadas
    pub fn total_len(&self) -> usize {
        self.swaps.len() * 2
            + self.multi_step_swaps.iter().map(Vec::len).sum::<usize>()
            + self.liquidity_pairs.len() * 2
            + self.liquidity_events.iter().map(Vec::len).sum::<usize>()
            + self.wraps_and_unwraps.len() * 2
            + self.inflowing_eth.len()
            + self.outflowing_eth.len()
            + self.isolated_transfers.len()
            + self.remainder.len()
    }

    /// Quantidade de pares com cara de swap (swaps diretos e cadeias)
    pub fn swap_like_count(&self) -> usize {
        self.swaps.len() + self.multi_step_swaps.len()
    }
}

/// Configuração do categorizador
#[derive(Debug, Clone)]
pub struct CategorizerConfig {
    pub native_token: Address,
    pub wrapped_native: Address,
}

impl Default for CategorizerConfig {
    fn default() -> Self {
        Self {
            native_token: native_token_address(),
            wrapped_native: wrapped_native_mainnet(),
        }
    }
}

/// Particiona a lista em grupos semânticos. Pipeline ordenado de extrações:
/// cada passo remove o que casou antes do próximo rodar, e a primeira
/// correspondência vence; a ordem dos passos é parte da semântica.
pub fn categorize(
    transfers: &[ReadableTransfer],
    config: &CategorizerConfig,
) -> Result<CategorizedTransfers> {
    let mut working: Vec<ReadableTransfer> = transfers.to_vec();
    let mut result = CategorizedTransfers::default();

    extract_wraps(&mut working, config, &mut result.wraps_and_unwraps);
    extract_liquidity_events(&mut working, &mut result.liquidity_events);
    extract_swaps(&mut working, &mut result.swaps);
    extract_eth_flows(&mut working, config, &mut result.inflowing_eth, &mut result.outflowing_eth);
    extract_liquidity_pairs(&mut working, &mut result.liquidity_pairs);
    extract_isolated(&mut working, &mut result.isolated_transfers);
    extract_multi_step_swaps(&mut working, &mut result.multi_step_swaps);
    result.remainder = working;

    if result.total_len() != transfers.len() {
        return Err(Error::ValidationError(format!(
            "partição incompleta: {} transferências de entrada, {} particionadas",
            transfers.len(),
            result.total_len()
        )));
    }

    Ok(result)
}

/// Passo 1: pares nativo⇄wrapped de mesma quantia e direção invertida
fn extract_wraps(
    working: &mut Vec<ReadableTransfer>,
    config: &CategorizerConfig,
    out: &mut Vec<(ReadableTransfer, ReadableTransfer)>,
) {
    let wrapped = config.wrapped_native;
    let mut i = 0;
    while i < working.len() {
        let touches = working[i].from == wrapped || working[i].to == wrapped;
        if !touches {
            i += 1;
            continue;
        }
        let matched = (i + 1..working.len()).find(|&j| {
            working[j].from == working[i].to
                && working[j].to == working[i].from
                && working[j].parsed_amount == working[i].parsed_amount
        });
        if let Some(j) = matched {
            let second = working.remove(j);
            let first = working.remove(i);
            out.push((first, second));
        } else {
            i += 1;
        }
    }
}

/// Passo 2: uma saída correspondida por ≥2 entradas posteriores da mesma
/// contraparte em tokens distintos
fn extract_liquidity_events(
    working: &mut Vec<ReadableTransfer>,
    out: &mut Vec<Vec<ReadableTransfer>>,
) {
    let mut i = 0;
    while i < working.len() {
        let returns: Vec<usize> = (i + 1..working.len())
            .filter(|&j| {
                working[j].from == working[i].to
                    && working[j].to == working[i].from
                    && working[j].token != working[i].token
            })
            .collect();

        let distinct: HashSet<Address> = returns.iter().map(|&j| working[j].token).collect();
        if distinct.len() >= 2 {
            let mut group = Vec::with_capacity(returns.len() + 1);
            for &j in returns.iter().rev() {
                group.push(working.remove(j));
            }
            group.push(working.remove(i));
            group.reverse();
            out.push(group);
        } else {
            i += 1;
        }
    }
}

/// Passo 3: pares de swap. A primeira transferência recíproca adiante vence
fn extract_swaps(
    working: &mut Vec<ReadableTransfer>,
    out: &mut Vec<(ReadableTransfer, ReadableTransfer)>,
) {
    let mut i = 0;
    while i < working.len() {
        let matched = (i + 1..working.len()).find(|&j| {
            working[j].from == working[i].to && working[j].to == working[i].from
        });
        if let Some(j) = matched {
            let second = working.remove(j);
            let first = working.remove(i);
            out.push((first, second));
        } else {
            i += 1;
        }
    }
}

/// Passo 4: transferências nativas cuja contraparte aparece uma única vez
/// no conjunto restante são isoladas como entrada/saída de ETH
fn extract_eth_flows(
    working: &mut Vec<ReadableTransfer>,
    config: &CategorizerConfig,
    inflows: &mut Vec<ReadableTransfer>,
    outflows: &mut Vec<ReadableTransfer>,
) {
    let occurrences = occurrence_counts(working);
    let native = config.native_token;

    let mut i = 0;
    while i < working.len() {
        if working[i].token != native {
            i += 1;
            continue;
        }
        let from_count = occurrences.get(&working[i].from).copied().unwrap_or(0);
        let to_count = occurrences.get(&working[i].to).copied().unwrap_or(0);
        if from_count == 1 {
            inflows.push(working.remove(i));
        } else if to_count == 1 {
            outflows.push(working.remove(i));
        } else {
            i += 1;
        }
    }
}

/// Passo 5: mint/burn (endereço nulo) casado com contra-transferência em
/// posição adjacente envolvendo a mesma contraparte
fn extract_liquidity_pairs(
    working: &mut Vec<ReadableTransfer>,
    out: &mut Vec<(ReadableTransfer, ReadableTransfer)>,
) {
    let null = Address::zero();
    let mut i = 0;
    while i < working.len() {
        let t = &working[i];
        let counterparty = if t.from == null {
            Some(t.to)
        } else if t.to == null {
            Some(t.from)
        } else {
            None
        };
        let Some(counterparty) = counterparty else {
            i += 1;
            continue;
        };
        let position = t.position;
        let matched = (0..working.len()).find(|&j| {
            j != i
                && working[j].position.abs_diff(position) == 1
                && (working[j].from == counterparty || working[j].to == counterparty)
        });
        if let Some(j) = matched {
            let (first, second) = if j > i {
                let second = working.remove(j);
                (working.remove(i), second)
            } else {
                let first = working.remove(i);
                (working.remove(j), first)
            };
            out.push((first, second));
        } else {
            i += 1;
        }
    }
}

/// Passo 6: transferências tocando um endereço que aparece exatamente
/// uma vez no conjunto restante
fn extract_isolated(working: &mut Vec<ReadableTransfer>, out: &mut Vec<ReadableTransfer>) {
    let occurrences = occurrence_counts(working);
    let mut i = 0;
    while i < working.len() {
        let from_count = occurrences.get(&working[i].from).copied().unwrap_or(0);
        let to_count = occurrences.get(&working[i].to).copied().unwrap_or(0);
        if from_count == 1 || to_count == 1 {
            out.push(working.remove(i));
        } else {
            i += 1;
        }
    }
}

/// Passo 7: cadeias onde o remetente de k+1 é o destinatário de k,
/// mantidas apenas quando fecham no remetente de origem
fn extract_multi_step_swaps(
    working: &mut Vec<ReadableTransfer>,
    out: &mut Vec<Vec<ReadableTransfer>>,
) {
    let mut start = 0;
    while start < working.len() {
        if let Some(chain) = trace_chain(working, start) {
            let mut group = Vec::with_capacity(chain.len());
            for &j in chain.iter().rev() {
                group.push(working.remove(j));
            }
            group.reverse();
            out.push(group);
            start = 0;
        } else {
            start += 1;
        }
    }
}

/// Segue a cadeia a partir de `start`; devolve os índices quando a cadeia
/// fecha na origem, `None` quando morre sem fechar
fn trace_chain(working: &[ReadableTransfer], start: usize) -> Option<Vec<usize>> {
    let origin = working[start].from;
    let mut chain = vec![start];
    let mut last = start;

    loop {
        if chain.len() >= 2 && working[last].to == origin {
            return Some(chain);
        }
        let next = (last + 1..working.len())
            .find(|&j| working[j].from == working[last].to && !chain.contains(&j));
        match next {
            Some(j) => {
                chain.push(j);
                last = j;
            }
            None => return None,
        }
    }
}

fn occurrence_counts(working: &[ReadableTransfer]) -> HashMap<Address, usize> {
    let mut counts = HashMap::new();
    for t in working {
        *counts.entry(t.from).or_insert(0) += 1;
        *counts.entry(t.to).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::U256;

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn rt(from: Address, to: Address, token: Address, amount: f64, symbol: &str, position: usize) -> ReadableTransfer {
        ReadableTransfer {
            from,
            to,
            token,
            symbol: symbol.into(),
            amount: U256::from((amount * 1e6) as u64),
            parsed_amount: amount,
            position,
        }
    }

    #[test]
    fn test_simple_swap_pair() {
        // [A→B 10 TKN, B→A 10 TKN] vira um par de swap e resto vazio
        let transfers = vec![
            rt(addr(1), addr(2), addr(10), 10.0, "TKN", 0),
            rt(addr(2), addr(1), addr(10), 10.0, "TKN", 1),
        ];
        let result = categorize(&transfers, &CategorizerConfig::default()).unwrap();
        assert_eq!(result.swaps.len(), 1);
        assert!(result.remainder.is_empty());
        assert_eq!(result.total_len(), 2);
    }

    #[test]
    fn test_mint_followed_by_forward_is_liquidity_pair() {
        // null→bot 5 LP seguido de bot→user 5 LP
        let bot = addr(9);
        let transfers = vec![
            rt(Address::zero(), bot, addr(10), 5.0, "LP", 0),
            rt(bot, addr(2), addr(10), 5.0, "LP", 1),
        ];
        let result = categorize(&transfers, &CategorizerConfig::default()).unwrap();
        assert_eq!(result.liquidity_pairs.len(), 1);
        assert_eq!(result.liquidity_pairs[0].0.from, Address::zero());
        assert!(result.remainder.is_empty());
    }

    #[test]
    fn test_wrap_pair_extracted_before_swaps() {
        let weth = wrapped_native_mainnet();
        let native = native_token_address();
        let user = addr(1);
        let transfers = vec![
            rt(user, weth, native, 2.0, "ETH", 0),
            rt(weth, user, weth, 2.0, "WETH", 1),
        ];
        let result = categorize(&transfers, &CategorizerConfig::default()).unwrap();
        assert_eq!(result.wraps_and_unwraps.len(), 1);
        assert!(result.swaps.is_empty());
    }

    #[test]
    fn test_liquidity_event_groups_distinct_token_returns() {
        let user = addr(1);
        let pool = addr(2);
        let transfers = vec![
            rt(user, pool, addr(10), 5.0, "LP", 0),
            rt(pool, user, addr(11), 3.0, "AAA", 1),
            rt(pool, user, addr(12), 4.0, "BBB", 2),
        ];
        let result = categorize(&transfers, &CategorizerConfig::default()).unwrap();
        assert_eq!(result.liquidity_events.len(), 1);
        assert_eq!(result.liquidity_events[0].len(), 3);
        assert!(result.remainder.is_empty());
    }

    #[test]
    fn test_eth_flows_from_leaf_counterparties() {
        let native = native_token_address();
        let hub = addr(5);
        let transfers = vec![
            // hub aparece várias vezes; 7 e 8 são folhas
            rt(addr(7), hub, native, 1.0, "ETH", 0),
            rt(hub, addr(8), native, 1.0, "ETH", 1),
            rt(hub, hub, addr(10), 1.0, "TKN", 2),
        ];
        let result = categorize(&transfers, &CategorizerConfig::default()).unwrap();
        assert_eq!(result.inflowing_eth.len(), 1);
        assert_eq!(result.inflowing_eth[0].from, addr(7));
        assert_eq!(result.outflowing_eth.len(), 1);
        assert_eq!(result.outflowing_eth[0].to, addr(8));
    }

    #[test]
    fn test_closed_multi_step_chain_kept_open_discarded() {
        let a = addr(1);
        let b = addr(2);
        let c = addr(3);
        let closed = vec![
            rt(a, b, addr(10), 1.0, "T1", 0),
            rt(b, c, addr(11), 2.0, "T2", 1),
            rt(c, a, addr(12), 3.0, "T3", 2),
            // todos os endereços repetidos para não cair em isolados
            rt(a, b, addr(13), 9.0, "T4", 3),
            rt(b, c, addr(14), 9.0, "T5", 4),
            rt(c, a, addr(15), 9.0, "T6", 5),
        ];
        let result = categorize(&closed, &CategorizerConfig::default()).unwrap();
        assert_eq!(result.multi_step_swaps.len(), 2);
        assert_eq!(result.multi_step_swaps[0].len(), 3);
        assert!(result.remainder.is_empty());
    }

    #[test]
    fn test_partition_completeness_on_mixed_input() {
        let native = native_token_address();
        let weth = wrapped_native_mainnet();
        let transfers = vec![
            rt(addr(1), weth, native, 2.0, "ETH", 0),
            rt(weth, addr(1), weth, 2.0, "WETH", 1),
            rt(addr(1), addr(2), addr(10), 10.0, "TKN", 2),
            rt(addr(2), addr(1), addr(11), 9.0, "OTR", 3),
            rt(addr(3), addr(4), addr(12), 1.0, "ZZZ", 4),
            rt(addr(5), addr(6), addr(13), 1.0, "YYY", 5),
        ];
        let result = categorize(&transfers, &CategorizerConfig::default()).unwrap();
        assert_eq!(result.total_len(), transfers.len());
        // os dois últimos tocam endereços únicos
        assert_eq!(result.isolated_transfers.len(), 2);
    }

    #[test]
    fn test_empty_input() {
        let result = categorize(&[], &CategorizerConfig::default()).unwrap();
        assert_eq!(result.total_len(), 0);
    }

    #[test]
    fn test_categorized_transfers_survive_json_round_trip() {
        let transfers = vec![
            rt(addr(1), addr(2), addr(10), 10.0, "TKN", 0),
            rt(addr(2), addr(1), addr(10), 10.0, "TKN", 1),
        ];
        let result = categorize(&transfers, &CategorizerConfig::default()).unwrap();
        let json = serde_json::to_string(&result).unwrap();
        let back: CategorizedTransfers = serde_json::from_str(&json).unwrap();
        assert_eq!(back.swaps, result.swaps);
        assert_eq!(back.total_len(), result.total_len());
    }
}
