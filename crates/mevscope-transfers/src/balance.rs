use ethereum_types::{Address, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::normalizer::ReadableTransfer;

/// Limiar abaixo do qual variações de saldo são tratadas como poeira
pub const DUST_THRESHOLD: f64 = 1e-7;

/// Variação líquida de saldo de um endereço em um token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub token: Address,
    pub symbol: String,
    pub change: f64,
}

/// Variação de saldo em unidades inteiras, pré-decimal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBalance {
    pub received: U256,
    pub sent: U256,
}

/// Calcula a variação líquida por token para um endereço, descartando
/// entradas com magnitude abaixo do limiar de poeira
pub fn balance_changes(address: Address, transfers: &[ReadableTransfer]) -> Vec<BalanceChange> {
    let mut deltas: Vec<BalanceChange> = Vec::new();

    for transfer in transfers {
        let signed = if transfer.to == address && transfer.from == address {
            continue;
        } else if transfer.to == address {
            transfer.parsed_amount
        } else if transfer.from == address {
            -transfer.parsed_amount
        } else {
            continue;
        };

        match deltas.iter_mut().find(|d| d.token == transfer.token) {
            Some(entry) => entry.change += signed,
            None => deltas.push(BalanceChange {
                token: transfer.token,
                symbol: transfer.symbol.clone(),
                change: signed,
            }),
        }
    }

    deltas.retain(|d| d.change.abs() >= DUST_THRESHOLD);
    deltas
}

/// Variante inteira em wei, usada na reconciliação de baixo nível do trace
pub fn raw_balance_changes(
    address: Address,
    transfers: &[ReadableTransfer],
) -> HashMap<Address, RawBalance> {
    let mut deltas: HashMap<Address, RawBalance> = HashMap::new();

    for transfer in transfers {
        if transfer.to == address && transfer.from != address {
            deltas.entry(transfer.token).or_default().received += transfer.amount;
        } else if transfer.from == address && transfer.to != address {
            deltas.entry(transfer.token).or_default().sent += transfer.amount;
        }
    }

    deltas
}
