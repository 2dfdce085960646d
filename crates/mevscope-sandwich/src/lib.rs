/*!
 * Mevscope Sandwich
 *
 * Detecção de sandwich sobre clusters de mesmo bloco e mesmo pool:
 * identificação dos pares de ida e volta do bot, triagem das vítimas entre
 * o front-run e o back-run e cálculo da perda de cada vítima por replay da
 * operação contra o estado histórico do pool.
 */

mod types;
mod detector;
mod loss;

// Re-exportações públicas
pub use types::*;
pub use detector::SandwichDetector;
pub use loss::LossCalculator;
