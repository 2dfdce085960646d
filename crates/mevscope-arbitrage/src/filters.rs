use ethereum_types::Address;
use mevscope_transfers::{CategorizedTransfers, ReadableTransfer};
use std::collections::{HashMap, HashSet};

use crate::types::{ArbConfig, ArbTxContext, NotArbReason};

/// Roda os pré-filtros na ordem documentada. Qualquer um que falhe
/// classifica a transação como "não é arbitragem".
pub fn run_pre_filters(
    ctx: &ArbTxContext,
    transfers: &[ReadableTransfer],
    categorized: &CategorizedTransfers,
    config: &ArbConfig,
) -> Option<NotArbReason> {
    check_swap_pairs(categorized)
        .or_else(|| check_aggregators(transfers, config))
        .or_else(|| check_bot_activity(ctx, transfers, config))
        .or_else(|| check_proxy_forwarding(ctx, transfers))
        .or_else(|| check_origin(ctx, categorized))
        .or_else(|| check_external_leaf_inflow(ctx, transfers))
        .or_else(|| check_token_fanout(ctx, transfers, config))
        .or_else(|| check_settlement(ctx, config))
        .or_else(|| check_position_ceiling(ctx, config))
}

/// Menos de dois pares com cara de swap não é arbitragem
fn check_swap_pairs(categorized: &CategorizedTransfers) -> Option<NotArbReason> {
    if categorized.swap_like_count() < 2 {
        return Some(NotArbReason::TooFewSwapPairs);
    }
    None
}

/// Envolvimento de agregador conhecido
fn check_aggregators(
    transfers: &[ReadableTransfer],
    config: &ArbConfig,
) -> Option<NotArbReason> {
    if config.aggregators.is_empty() {
        return None;
    }
    let touched = transfers
        .iter()
        .any(|t| config.aggregators.contains(&t.from) || config.aggregators.contains(&t.to));
    if touched {
        return Some(NotArbReason::AggregatorInvolved);
    }
    None
}

/// O bot precisa de mais de duas transferências próprias, com pelo menos
/// uma dentro da janela de setup do trace
fn check_bot_activity(
    ctx: &ArbTxContext,
    transfers: &[ReadableTransfer],
    config: &ArbConfig,
) -> Option<NotArbReason> {
    let bot_transfers: Vec<&ReadableTransfer> = transfers
        .iter()
        .filter(|t| t.from == ctx.to || t.to == ctx.to)
        .collect();
    if bot_transfers.len() <= 2 {
        return Some(NotArbReason::SparseBotActivity);
    }
    if !bot_transfers.iter().any(|t| t.position <= config.setup_position_ceiling) {
        return Some(NotArbReason::SparseBotActivity);
    }
    None
}

/// Padrão de proxy que só repassa: entrada no bot seguida da mesma quantia
/// no mesmo token saindo para uma folha. Pools legítimos reaparecem no
/// trace devolvendo o token trocado, folhas não.
fn check_proxy_forwarding(
    ctx: &ArbTxContext,
    transfers: &[ReadableTransfer],
) -> Option<NotArbReason> {
    let occurrences = occurrence_counts(transfers);
    for window in transfers.windows(2) {
        let (a, b) = (&window[0], &window[1]);
        if a.to == ctx.to
            && b.from == ctx.to
            && a.token == b.token
            && a.parsed_amount == b.parsed_amount
            && b.to != ctx.from
            && occurrences.get(&b.to).copied().unwrap_or(0) == 1
        {
            return Some(NotArbReason::ProxyForwarding);
        }
    }
    None
}

/// O primeiro swap deve ter sido financiado pelo operador ou pelo bot
fn check_origin(ctx: &ArbTxContext, categorized: &CategorizedTransfers) -> Option<NotArbReason> {
    let first_leg = categorized
        .swaps
        .iter()
        .map(|(a, _)| a)
        .chain(categorized.multi_step_swaps.iter().filter_map(|c| c.first()))
        .min_by_key(|t| t.position)?;

    if first_leg.from != ctx.from && first_leg.from != ctx.to {
        return Some(NotArbReason::OriginMismatch);
    }
    None
}

/// Uma folha externa injetou tokens no bot que não vieram do operador
fn check_external_leaf_inflow(
    ctx: &ArbTxContext,
    transfers: &[ReadableTransfer],
) -> Option<NotArbReason> {
    let occurrences = occurrence_counts(transfers);
    let injected = transfers.iter().any(|t| {
        t.to == ctx.to
            && t.from != ctx.from
            && t.from != Address::zero()
            && t.from != t.token // mints sintetizados não contam
            && occurrences.get(&t.from).copied().unwrap_or(0) == 1
    });
    if injected {
        return Some(NotArbReason::ExternalLeafInflow);
    }
    None
}

/// Mais tokens distintos fluindo pelo bot do que o teto configurado
fn check_token_fanout(
    ctx: &ArbTxContext,
    transfers: &[ReadableTransfer],
    config: &ArbConfig,
) -> Option<NotArbReason> {
    let tokens: HashSet<Address> = transfers
        .iter()
        .filter(|t| t.from == ctx.to || t.to == ctx.to)
        .map(|t| t.token)
        .collect();
    if tokens.len() > config.max_distinct_tokens {
        return Some(NotArbReason::TooManyTokens);
    }
    None
}

/// O alvo é um contrato de liquidação em lote conhecido
fn check_settlement(ctx: &ArbTxContext, config: &ArbConfig) -> Option<NotArbReason> {
    if config.settlement_contracts.contains(&ctx.to) {
        return Some(NotArbReason::BatchSettlement);
    }
    None
}

/// Transações fundas demais no bloco não valem a verificação
fn check_position_ceiling(ctx: &ArbTxContext, config: &ArbConfig) -> Option<NotArbReason> {
    if ctx.block_position > config.max_block_position {
        return Some(NotArbReason::PositionBeyondCeiling);
    }
    None
}

pub(crate) fn occurrence_counts(transfers: &[ReadableTransfer]) -> HashMap<Address, usize> {
    let mut counts = HashMap::new();
    for t in transfers {
        *counts.entry(t.from).or_insert(0) += 1;
        *counts.entry(t.to).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethereum_types::{H256, U256};

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn rt(from: Address, to: Address, token: Address, amount: f64, position: usize) -> ReadableTransfer {
        ReadableTransfer {
            from,
            to,
            token,
            symbol: "TKN".into(),
            amount: U256::from((amount * 1e9) as u64),
            parsed_amount: amount,
            position,
        }
    }

    fn ctx(from: Address, to: Address, block_position: usize) -> ArbTxContext {
        ArbTxContext {
            tx_hash: H256::zero(),
            from,
            to,
            gas_used: U256::from(100_000u64),
            gas_price: U256::from(1_000_000_000u64),
            block_position,
            preceding_txs: Vec::new(),
        }
    }

    #[test]
    fn test_too_few_swap_pairs() {
        let categorized = CategorizedTransfers::default();
        assert_eq!(check_swap_pairs(&categorized), Some(NotArbReason::TooFewSwapPairs));
    }

    #[test]
    fn test_aggregator_involvement() {
        let mut config = ArbConfig::default();
        let agg = addr(77);
        config.aggregators.insert(agg);
        let transfers = vec![rt(addr(1), agg, addr(10), 1.0, 0)];
        assert_eq!(
            check_aggregators(&transfers, &config),
            Some(NotArbReason::AggregatorInvolved)
        );
        assert_eq!(check_aggregators(&[], &config), None);
    }

    #[test]
    fn test_sparse_bot_activity() {
        let bot = addr(9);
        let config = ArbConfig::default();
        let c = ctx(addr(1), bot, 0);

        let two = vec![
            rt(addr(1), bot, addr(10), 1.0, 0),
            rt(bot, addr(1), addr(11), 1.0, 1),
        ];
        assert_eq!(
            check_bot_activity(&c, &two, &config),
            Some(NotArbReason::SparseBotActivity)
        );

        // três transferências, mas todas tarde demais no trace
        let late: Vec<_> = (0..3).map(|i| rt(addr(1), bot, addr(10), 1.0, 6 + i)).collect();
        assert_eq!(
            check_bot_activity(&c, &late, &config),
            Some(NotArbReason::SparseBotActivity)
        );

        let ok: Vec<_> = (0..3).map(|i| rt(addr(1), bot, addr(10), 1.0, i)).collect();
        assert_eq!(check_bot_activity(&c, &ok, &config), None);
    }

    #[test]
    fn test_proxy_forwarding_pattern() {
        let bot = addr(9);
        let c = ctx(addr(1), bot, 0);
        let transfers = vec![
            rt(addr(1), bot, addr(10), 5.0, 0),
            rt(bot, addr(2), addr(10), 5.0, 1),
        ];
        assert_eq!(
            check_proxy_forwarding(&c, &transfers),
            Some(NotArbReason::ProxyForwarding)
        );
        // quantias diferentes não configuram repasse
        let kept = vec![
            rt(addr(1), bot, addr(10), 5.0, 0),
            rt(bot, addr(2), addr(10), 4.0, 1),
        ];
        assert_eq!(check_proxy_forwarding(&c, &kept), None);
    }

    #[test]
    fn test_external_leaf_inflow() {
        let bot = addr(9);
        let c = ctx(addr(1), bot, 0);
        let leaf = addr(50);
        let transfers = vec![
            rt(addr(1), bot, addr(10), 1.0, 0),
            rt(leaf, bot, addr(11), 2.0, 1),
        ];
        assert_eq!(
            check_external_leaf_inflow(&c, &transfers),
            Some(NotArbReason::ExternalLeafInflow)
        );
        // mint fantasma (token como remetente) não conta como injeção
        let minted = vec![rt(addr(11), bot, addr(11), 2.0, 0)];
        assert_eq!(check_external_leaf_inflow(&c, &minted), None);
    }

    #[test]
    fn test_token_fanout_cap() {
        let bot = addr(9);
        let c = ctx(addr(1), bot, 0);
        let config = ArbConfig::default();
        let transfers: Vec<_> = (0..9)
            .map(|i| rt(addr(1), bot, addr(100 + i as u64), 1.0, i))
            .collect();
        assert_eq!(
            check_token_fanout(&c, &transfers, &config),
            Some(NotArbReason::TooManyTokens)
        );
    }

    #[test]
    fn test_position_ceiling() {
        let config = ArbConfig::default();
        assert_eq!(
            check_position_ceiling(&ctx(addr(1), addr(2), 11), &config),
            Some(NotArbReason::PositionBeyondCeiling)
        );
        assert_eq!(check_position_ceiling(&ctx(addr(1), addr(2), 10), &config), None);
    }
}
