/*!
 * Mevscope Utils
 *
 * Utilitários comuns usados em toda a workspace Mevscope
 */

use ethereum_types::{Address, H256, U256};
use std::str::FromStr;
use tiny_keccak::{Hasher, Keccak};

/// Converte uma string hexadecimal para Address
pub fn hex_to_address(hex: &str) -> Option<Address> {
    let hex_str = hex.strip_prefix("0x").unwrap_or(hex);
    Address::from_str(hex_str).ok()
}

/// Converte uma string hexadecimal para H256
pub fn hex_to_h256(hex: &str) -> Option<H256> {
    let hex_str = hex.strip_prefix("0x").unwrap_or(hex);
    H256::from_str(hex_str).ok()
}

/// Converte uma string hexadecimal (como vinda do callTracer) para U256
pub fn hex_to_u256(hex: &str) -> Option<U256> {
    let hex_str = hex.strip_prefix("0x").unwrap_or(hex);
    if hex_str.is_empty() {
        return Some(U256::zero());
    }
    U256::from_str_radix(hex_str, 16).ok()
}

/// Formata um Address para exibição
pub fn format_address(address: &Address) -> String {
    format!("0x{:x}", address)
}

/// Calcula o hash Keccak-256 de dados
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak::v256();
    let mut result = [0u8; 32];
    hasher.update(data);
    hasher.finalize(&mut result);
    result
}

/// Seletor de 4 bytes de uma assinatura de função
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Fatia a palavra de 32 bytes de índice `idx` do calldata (após o seletor)
pub fn calldata_word(input: &[u8], idx: usize) -> Option<&[u8]> {
    let start = 4 + idx * 32;
    input.get(start..start + 32)
}

/// Extrai um Address da palavra de calldata de índice `idx`
pub fn address_from_word(input: &[u8], idx: usize) -> Option<Address> {
    calldata_word(input, idx).map(|w| Address::from_slice(&w[12..32]))
}

/// Extrai um U256 da palavra de calldata de índice `idx`
pub fn u256_from_word(input: &[u8], idx: usize) -> Option<U256> {
    calldata_word(input, idx).map(U256::from_big_endian)
}

/// Conversão com perda de U256 para f64
pub fn u256_to_f64_lossy(value: &U256) -> f64 {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    let mut result = 0f64;
    for &b in &bytes {
        result = result * 256f64 + b as f64;
    }
    result
}

/// Ajusta uma quantia inteira pelos decimais do token, arredondando
/// a 15 casas fracionárias.
pub fn parsed_amount(amount: &U256, decimals: u32) -> f64 {
    let raw = u256_to_f64_lossy(amount) / 10f64.powi(decimals as i32);
    round_fractional(raw)
}

/// Arredonda um valor a 15 casas fracionárias
pub fn round_fractional(value: f64) -> f64 {
    let factor = 1e15;
    (value * factor).round() / factor
}

/// Formata um valor com decimais para exibição
pub fn format_token_amount(amount: &U256, decimals: u32) -> String {
    if decimals == 0 {
        return amount.to_string();
    }

    let divisor = U256::from(10).pow(U256::from(decimals));
    let integer_part = amount / divisor;
    let fractional_part = amount % divisor;

    let fractional_str = fractional_part.to_string();
    let mut padded = String::with_capacity(decimals as usize);
    for _ in 0..(decimals as usize - fractional_str.len()) {
        padded.push('0');
    }
    padded.push_str(&fractional_str);

    while padded.ends_with('0') {
        padded.pop();
    }

    if padded.is_empty() {
        integer_part.to_string()
    } else {
        format!("{}.{}", integer_part, padded)
    }
}
