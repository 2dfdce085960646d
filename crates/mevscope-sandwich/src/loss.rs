/*!
 * Cálculo de perda das vítimas por replay histórico.
 *
 * Cada operação da vítima é re-simulada contra o estado do pool no bloco
 * anterior ao sandwich, usando as próprias funções de cotação do contrato
 * (get_dy, get_dy_underlying, calc_token_amount, calc_withdraw_one_coin).
 */

use ethabi::{short_signature, ParamType, Token};
use ethereum_types::U256;
use mevscope_core::{
    error::Result,
    traits::{ContractCaller, PriceOracle},
    utils, Error,
};
use std::sync::Arc;
use tracing::debug;

use crate::types::{
    ClusterTx, CoinInfo, PoolDirectory, PoolOperation, SandwichCluster, TransferLogSource,
    VictimLoss,
};

/// Calcula a perda individual de cada vítima de um cluster
pub struct LossCalculator {
    caller: Arc<dyn ContractCaller>,
    directory: Arc<dyn PoolDirectory>,
    transfer_logs: Arc<dyn TransferLogSource>,
    oracle: Arc<dyn PriceOracle>,
    deposit_match_tolerance: f64,
}

impl LossCalculator {
    pub fn new(
        caller: Arc<dyn ContractCaller>,
        directory: Arc<dyn PoolDirectory>,
        transfer_logs: Arc<dyn TransferLogSource>,
        oracle: Arc<dyn PriceOracle>,
        deposit_match_tolerance: f64,
    ) -> Self {
        Self {
            caller,
            directory,
            transfer_logs,
            oracle,
            deposit_match_tolerance,
        }
    }

    /// Replay da operação da vítima contra o estado de `block_number - 1`.
    /// Retorna `None` quando a simulação não indica prejuízo.
    pub async fn victim_loss(
        &self,
        cluster: &SandwichCluster,
        victim: &ClusterTx,
    ) -> Result<Option<VictimLoss>> {
        let replay_block = cluster.block_number.saturating_sub(1);
        let (happy, actual, unit) = match &victim.op {
            PoolOperation::Swap {
                coin_in,
                coin_out,
                amount_in,
                amount_out,
                underlying,
            } => {
                let name = if *underlying { "get_dy_underlying" } else { "get_dy" };
                let happy = self
                    .quote(
                        cluster,
                        name,
                        &[ParamType::Int(128), ParamType::Int(128), ParamType::Uint(256)],
                        &[
                            int128(*coin_in),
                            int128(*coin_out),
                            Token::Uint(*amount_in),
                        ],
                        replay_block,
                    )
                    .await?;
                let coin = self.coin_at(cluster, *coin_out).await?;
                (happy, *amount_out, coin)
            }
            PoolOperation::Deposit { amounts, minted } => {
                let happy = self
                    .quote(
                        cluster,
                        "calc_token_amount",
                        &[
                            ParamType::FixedArray(Box::new(ParamType::Uint(256)), amounts.len()),
                            ParamType::Bool,
                        ],
                        &[
                            Token::FixedArray(amounts.iter().map(|a| Token::Uint(*a)).collect()),
                            Token::Bool(true),
                        ],
                        replay_block,
                    )
                    .await?;
                let lp = self.directory.lp_token(cluster.pool).await?;
                let actual = match minted {
                    Some(m) => *m,
                    None => {
                        self.reconcile_minted(cluster, victim, &lp, happy).await?
                    }
                };
                (happy, actual, lp)
            }
            PoolOperation::Withdraw {
                burned,
                coin_index,
                received,
            } => {
                let happy = self
                    .quote(
                        cluster,
                        "calc_withdraw_one_coin",
                        &[ParamType::Uint(256), ParamType::Int(128)],
                        &[Token::Uint(*burned), int128(*coin_index)],
                        replay_block,
                    )
                    .await?;
                let coin = self.coin_at(cluster, *coin_index).await?;
                (happy, *received, coin)
            }
        };

        if happy <= actual {
            debug!(tx = ?victim.tx_id, "replay não indica prejuízo");
            return Ok(None);
        }
        let loss_raw = happy - actual;
        let amount = utils::parsed_amount(&loss_raw, unit.decimals);
        let loss_in_percentage =
            utils::u256_to_f64_lossy(&loss_raw) / utils::u256_to_f64_lossy(&happy) * 100.0;
        let loss_in_usd = self
            .oracle
            .price_at(unit.address, cluster.block_timestamp)
            .await?
            .map(|price| amount * price);

        Ok(Some(VictimLoss {
            tx_id: victim.tx_id,
            amount,
            unit: unit.symbol,
            unit_address: unit.address,
            loss_in_percentage,
            loss_in_usd,
        }))
    }

    /// Chama a função de cotação do pool num bloco histórico
    async fn quote(
        &self,
        cluster: &SandwichCluster,
        name: &str,
        params: &[ParamType],
        args: &[Token],
        block: u64,
    ) -> Result<U256> {
        let mut data = short_signature(name, params).to_vec();
        data.extend(ethabi::encode(args));
        let output = self.caller.call_at(cluster.pool, data, Some(block)).await?;
        decode_uint(&output, name)
    }

    async fn coin_at(&self, cluster: &SandwichCluster, index: i32) -> Result<CoinInfo> {
        let coins = self.directory.pool_coins(cluster.pool).await?;
        coins
            .into_iter()
            .nth(index as usize)
            .ok_or_else(|| {
                Error::MissingData(format!(
                    "pool {:?} não tem coin no índice {}",
                    cluster.pool, index
                ))
            })
    }

    /// Quando o lookup direto do minted é ambíguo, procura nos logs de
    /// Transfer do bloco a quantia cunhada mais próxima da simulada
    async fn reconcile_minted(
        &self,
        cluster: &SandwichCluster,
        victim: &ClusterTx,
        lp: &CoinInfo,
        happy: U256,
    ) -> Result<U256> {
        let candidates = self
            .transfer_logs
            .minted_amounts(lp.address, victim.trader, cluster.block_number)
            .await?;
        let happy_f = utils::u256_to_f64_lossy(&happy);
        let best = candidates
            .into_iter()
            .map(|c| {
                let distance = (utils::u256_to_f64_lossy(&c) - happy_f).abs();
                (c, distance)
            })
            .filter(|(_, distance)| happy_f > 0.0 && distance / happy_f <= self.deposit_match_tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        match best {
            Some((amount, _)) => Ok(amount),
            None => Err(Error::MissingData(format!(
                "nenhum Transfer de {} para {:?} compatível com o depósito",
                lp.symbol, victim.trader
            ))),
        }
    }
}

fn int128(index: i32) -> Token {
    Token::Int(U256::from(index as u64))
}

fn decode_uint(output: &[u8], context: &str) -> Result<U256> {
    let tokens = ethabi::decode(&[ParamType::Uint(256)], output)
        .map_err(|e| Error::SimulationFailure(format!("{}: {}", context, e)))?;
    match tokens.first() {
        Some(Token::Uint(value)) => Ok(*value),
        _ => Err(Error::SimulationFailure(format!(
            "{}: retorno sem uint256",
            context
        ))),
    }
}
