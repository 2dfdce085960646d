use futures::future::join_all;
use mevscope_core::error::Result;
use std::collections::HashSet;
use tracing::{debug, warn};

use crate::loss::LossCalculator;
use crate::types::{
    ClusterTx, PoolOperation, SandwichCluster, SandwichConfig, SandwichRecord, SandwichSink,
    VictimLoss,
};

/// Detector de sandwich sobre clusters de mesmo bloco e mesmo pool
pub struct SandwichDetector {
    config: SandwichConfig,
    loss: LossCalculator,
}

impl SandwichDetector {
    pub fn new(loss: LossCalculator, config: Option<SandwichConfig>) -> Self {
        Self {
            config: config.unwrap_or_default(),
            loss,
        }
    }

    /// Avalia um cluster: identifica pares de bot, filtra vítimas entre o
    /// front-run e o back-run e calcula a perda de cada uma
    pub async fn screen_cluster(&self, cluster: &SandwichCluster) -> Result<Vec<SandwichRecord>> {
        if cluster.txs.len() < 2 {
            return Ok(Vec::new());
        }

        let mut txs = cluster.txs.clone();
        txs.sort_by_key(|t| t.trace_position);

        let pairs = find_bot_pairs(&txs);
        if pairs.is_empty() {
            return Ok(Vec::new());
        }

        let mut records = Vec::with_capacity(pairs.len());
        for (front, back) in pairs {
            let victims: Vec<&ClusterTx> = txs[front + 1..back].iter().collect();
            let mut losses: Vec<VictimLoss> = Vec::new();
            for victim in victims {
                match self.loss.victim_loss(cluster, victim).await {
                    Ok(Some(loss)) => losses.push(loss),
                    Ok(None) => {}
                    // a falha de uma vítima nunca derruba o cluster
                    Err(e) => {
                        warn!(tx = ?victim.tx_id, pool = ?cluster.pool, error = %e,
                              "perda da vítima não computável, ignorando");
                    }
                }
            }
            let extracted_from_curve = losses.iter().any(|l| l.amount > 0.0);
            records.push(SandwichRecord {
                pool_id: cluster.pool_id,
                frontrun_tx_id: txs[front].tx_id,
                backrun_tx_id: txs[back].tx_id,
                extracted_from_curve,
                loss_transactions: if losses.is_empty() { None } else { Some(losses) },
            });
        }
        debug!(pool = ?cluster.pool, block = cluster.block_number,
               pairs = records.len(), "cluster avaliado");
        Ok(records)
    }

    /// Avalia e persiste: grava cada registro, marca as transações dos
    /// pares e registra o veredito negativo das demais transações do cluster
    pub async fn screen_and_store(
        &self,
        cluster: &SandwichCluster,
        sink: &dyn SandwichSink,
    ) -> Result<Vec<SandwichRecord>> {
        let records = self.screen_cluster(cluster).await?;
        let mut attackers = HashSet::new();
        for record in &records {
            sink.upsert_record(record).await?;
            sink.mark_sandwich(record.frontrun_tx_id, true).await?;
            sink.mark_sandwich(record.backrun_tx_id, true).await?;
            attackers.insert(record.frontrun_tx_id);
            attackers.insert(record.backrun_tx_id);
        }
        for tx in &cluster.txs {
            if !attackers.contains(&tx.tx_id) {
                sink.mark_sandwich(tx.tx_id, false).await?;
            }
        }
        Ok(records)
    }

    /// Avalia um lote de clusters em fatias concorrentes de tamanho fixo.
    /// Clusters são independentes entre si; falhas individuais são logadas
    /// e não interrompem o lote.
    pub async fn screen_clusters(&self, clusters: &[SandwichCluster]) -> Vec<SandwichRecord> {
        let mut all = Vec::new();
        for chunk in clusters.chunks(self.config.chunk_size.max(1)) {
            let results = join_all(chunk.iter().map(|c| self.screen_cluster(c))).await;
            for (cluster, result) in chunk.iter().zip(results) {
                match result {
                    Ok(records) => all.extend(records),
                    Err(e) => {
                        warn!(pool = ?cluster.pool, block = cluster.block_number, error = %e,
                              "cluster descartado do lote");
                    }
                }
            }
        }
        all
    }
}

/// Pares de ida e volta do mesmo trader: o coin de entrada da primeira
/// transação é o de saída da segunda e vice-versa. Quando mais de um par
/// compartilha o mesmo front-run, vence o de menor posição de back-run.
pub(crate) fn find_bot_pairs(txs: &[ClusterTx]) -> Vec<(usize, usize)> {
    let mut pairs: Vec<(usize, usize)> = Vec::new();
    for i in 0..txs.len() {
        for j in i + 1..txs.len() {
            if txs[i].trader != txs[j].trader {
                continue;
            }
            if is_round_trip(&txs[i].op, &txs[j].op) {
                pairs.push((i, j));
            }
        }
    }

    // um único back-run por front-run
    pairs.sort_by_key(|&(front, back)| (front, txs[back].trace_position));
    pairs.dedup_by_key(|&mut (front, _)| front);
    pairs
}

fn is_round_trip(first: &PoolOperation, second: &PoolOperation) -> bool {
    match (first, second) {
        (
            PoolOperation::Swap {
                coin_in: a_in,
                coin_out: a_out,
                ..
            },
            PoolOperation::Swap {
                coin_in: b_in,
                coin_out: b_out,
                ..
            },
        ) => a_in == b_out && a_out == b_in,
        _ => false,
    }
}
