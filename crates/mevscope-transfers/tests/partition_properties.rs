use ethereum_types::{Address, U256};
use mevscope_core::types::{native_token_address, wrapped_native_mainnet};
use mevscope_transfers::{
    balance_changes, categorize, reindex, CategorizerConfig, ReadableTransfer, DUST_THRESHOLD,
};

fn addr(n: u64) -> Address {
    Address::from_low_u64_be(n)
}

fn rt(from: Address, to: Address, token: Address, amount: f64, symbol: &str) -> ReadableTransfer {
    ReadableTransfer {
        from,
        to,
        token,
        symbol: symbol.into(),
        amount: U256::from((amount * 1e9) as u64),
        parsed_amount: amount,
        position: 0,
    }
}

/// Monta uma transação realista: wrap, swap em dois passos, mint de LP,
/// gorjeta em ETH e uma transferência avulsa.
fn busy_transfer_list() -> Vec<ReadableTransfer> {
    let native = native_token_address();
    let weth = wrapped_native_mainnet();
    let bot = addr(1);
    let pool_a = addr(2);
    let pool_b = addr(3);
    let tok_a = addr(10);
    let tok_b = addr(11);
    let lp = addr(12);

    let mut list = vec![
        // wrap
        rt(bot, weth, native, 3.0, "ETH"),
        rt(weth, bot, weth, 3.0, "WETH"),
        // swap no pool A
        rt(bot, pool_a, tok_a, 7.0, "AAA"),
        rt(pool_a, bot, tok_b, 6.5, "BBB"),
        // mint de LP adjacente a um depósito
        rt(Address::zero(), bot, lp, 1.0, "LP"),
        rt(bot, pool_b, lp, 1.0, "LP"),
        // gorjeta nativa para uma folha
        rt(bot, addr(99), native, 0.1, "ETH"),
        // transferência avulsa entre folhas
        rt(addr(50), addr(51), tok_a, 2.0, "AAA"),
    ];
    reindex(&mut list);
    list
}

#[test]
fn partition_is_complete_and_disjoint() {
    let list = busy_transfer_list();
    let result = categorize(&list, &CategorizerConfig::default()).unwrap();

    // a união dos grupos, como multiconjunto de posições, é a entrada
    let mut positions: Vec<usize> = Vec::new();
    for (a, b) in &result.swaps {
        positions.extend([a.position, b.position]);
    }
    for chain in &result.multi_step_swaps {
        positions.extend(chain.iter().map(|t| t.position));
    }
    for (a, b) in &result.liquidity_pairs {
        positions.extend([a.position, b.position]);
    }
    for group in &result.liquidity_events {
        positions.extend(group.iter().map(|t| t.position));
    }
    for (a, b) in &result.wraps_and_unwraps {
        positions.extend([a.position, b.position]);
    }
    for t in result
        .inflowing_eth
        .iter()
        .chain(&result.outflowing_eth)
        .chain(&result.isolated_transfers)
        .chain(&result.remainder)
    {
        positions.push(t.position);
    }

    positions.sort_unstable();
    assert_eq!(positions, (0..list.len()).collect::<Vec<_>>());
}

#[test]
fn expected_groups_on_busy_list() {
    let list = busy_transfer_list();
    let result = categorize(&list, &CategorizerConfig::default()).unwrap();

    assert_eq!(result.wraps_and_unwraps.len(), 1);
    assert_eq!(result.swaps.len(), 1);
    assert_eq!(result.liquidity_pairs.len(), 1);
    // gorjeta para folha sai como outflow nativo
    assert_eq!(result.outflowing_eth.len(), 1);
    assert_eq!(result.outflowing_eth[0].to, addr(99));
    // a transferência entre folhas é isolada
    assert_eq!(result.isolated_transfers.len(), 1);
}

#[test]
fn categorization_is_idempotent() {
    let list = busy_transfer_list();
    let first = categorize(&list, &CategorizerConfig::default()).unwrap();
    let second = categorize(&list, &CategorizerConfig::default()).unwrap();
    assert_eq!(first.swaps, second.swaps);
    assert_eq!(first.remainder, second.remainder);
    assert_eq!(first.total_len(), second.total_len());
}

#[test]
fn balance_conservation_per_token() {
    let list = busy_transfer_list();
    let tok_a = addr(10);
    let closed: Vec<_> = list
        .iter()
        .filter(|t| t.token == tok_a && t.from != Address::zero() && t.to != Address::zero())
        .cloned()
        .collect();

    let mut participants: Vec<Address> = closed.iter().flat_map(|t| [t.from, t.to]).collect();
    participants.sort_unstable();
    participants.dedup();

    let total: f64 = participants
        .iter()
        .flat_map(|&a| balance_changes(a, &closed))
        .map(|c| c.change)
        .sum();
    assert!(total.abs() < DUST_THRESHOLD);
}
