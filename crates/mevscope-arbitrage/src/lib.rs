/*!
 * Mevscope Arbitrage
 *
 * Detector de arbitragem atômica: pré-filtros sobre o grafo de
 * transferências, os dois casos de fluxo de valor (valor fica com o bot,
 * valor sai para uma folha) e as exclusões de backrun.
 */

mod types;
mod filters;
mod detector;

// Re-exportações públicas
pub use types::*;
pub use filters::run_pre_filters;
pub use detector::*;
