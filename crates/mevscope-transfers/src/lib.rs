/*!
 * Mevscope Transfers
 *
 * Normalização de call traces em listas semânticas de transferências de
 * tokens, particionamento em grupos econômicos (swaps, liquidez, wraps)
 * e cálculo de variação de saldo por endereço.
 */

mod trace;
mod methods;
mod normalizer;
mod categorizer;
mod balance;

// Re-exportações públicas
pub use trace::*;
pub use methods::*;
pub use normalizer::*;
pub use categorizer::*;
pub use balance::*;
