use ethereum_types::Address;
use mevscope_core::{
    error::Result,
    traits::ContractCaller,
    types::TokenAmount,
    utils,
};
use mevscope_transfers::{
    balance_changes, categorize, CategorizedTransfers, CategorizerConfig, ReadableTransfer,
    DUST_THRESHOLD,
};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::filters::{occurrence_counts, run_pre_filters};
use crate::types::{
    ArbCase, ArbClassification, ArbConfig, ArbSink, ArbTxContext, AtomicArbResult, BribeValue,
    GasInfo, NetWin, NotArbReason,
};

/// Detector de arbitragem atômica. Máquina de estados sobre uma transação:
/// pré-filtros, caso A (valor fica), caso B (valor sai para folha) e as
/// exclusões de backrun.
pub struct ArbDetector {
    config: ArbConfig,
    caller: Arc<dyn ContractCaller>,
}

impl ArbDetector {
    pub fn new(caller: Arc<dyn ContractCaller>, config: Option<ArbConfig>) -> Self {
        Self {
            config: config.unwrap_or_default(),
            caller,
        }
    }

    /// Classifica uma transação já normalizada e categorizada
    pub async fn classify(
        &self,
        ctx: &ArbTxContext,
        transfers: &[ReadableTransfer],
        categorized: &CategorizedTransfers,
    ) -> Result<ArbClassification> {
        if let Some(reason) = run_pre_filters(ctx, transfers, categorized, &self.config) {
            debug!(tx = ?ctx.tx_hash, reason = %reason, "rejeitada por pré-filtro");
            return Ok(ArbClassification::NotArb(reason));
        }

        let result = match self.decide_value_flow(ctx, transfers) {
            Ok(result) => result,
            Err(reason) => return Ok(ArbClassification::NotArb(reason)),
        };

        // Exclusões de backrun: o padrão casa, mas não é arbitragem autônoma
        if self.is_governance_proxy(ctx.to).await {
            return Ok(ArbClassification::NotArb(NotArbReason::GovernanceProxy));
        }
        if is_global_backrun(ctx) {
            return Ok(ArbClassification::NotArb(NotArbReason::GlobalBackrun));
        }

        Ok(ArbClassification::Arb(result))
    }

    /// Categoriza e classifica numa chamada só
    pub async fn classify_transfers(
        &self,
        ctx: &ArbTxContext,
        transfers: &[ReadableTransfer],
    ) -> Result<ArbClassification> {
        let cat_config = CategorizerConfig {
            native_token: self.config.native_token,
            wrapped_native: self.config.wrapped_native,
        };
        let categorized = categorize(transfers, &cat_config)?;
        self.classify(ctx, transfers, &categorized).await
    }

    /// Classifica e persiste o veredito da transação
    pub async fn classify_and_store(
        &self,
        ctx: &ArbTxContext,
        transfers: &[ReadableTransfer],
        sink: &dyn ArbSink,
    ) -> Result<ArbClassification> {
        let result = self.classify_transfers(ctx, transfers).await?;
        sink.store_classification(ctx.tx_hash, &result).await?;
        Ok(result)
    }

    /// Classifica um lote de transações em fatias concorrentes de tamanho
    /// fixo, preservando a ordem dos resultados
    pub async fn classify_batch(
        &self,
        jobs: &[(ArbTxContext, Vec<ReadableTransfer>)],
    ) -> Vec<Result<ArbClassification>> {
        let mut results = Vec::with_capacity(jobs.len());
        for chunk in jobs.chunks(self.config.chunk_size.max(1)) {
            let futures = chunk
                .iter()
                .map(|(ctx, transfers)| self.classify_transfers(ctx, transfers));
            results.extend(futures::future::join_all(futures).await);
        }
        results
    }

    /// Decide entre os dois casos de fluxo de valor. Os casos são
    /// mutuamente exclusivos: com variação de saldo não nula em from∪to,
    /// o caso B nunca é tentado.
    pub(crate) fn decide_value_flow(
        &self,
        ctx: &ArbTxContext,
        transfers: &[ReadableTransfer],
    ) -> std::result::Result<AtomicArbResult, NotArbReason> {
        let merged = self.merged_balances(ctx, transfers);
        if merged.is_empty() {
            self.match_value_exits(ctx, transfers)
        } else {
            self.match_value_stays(ctx, transfers, merged)
        }
    }

    /// Variação de saldo combinada de operador e bot, por token
    fn merged_balances(&self, ctx: &ArbTxContext, transfers: &[ReadableTransfer]) -> Vec<TokenAmount> {
        let mut merged: Vec<TokenAmount> = Vec::new();
        for change in balance_changes(ctx.from, transfers)
            .into_iter()
            .chain(balance_changes(ctx.to, transfers))
        {
            match merged.iter_mut().find(|c| c.token == change.token) {
                Some(entry) => entry.amount += change.change,
                None => merged.push(TokenAmount {
                    token: change.token,
                    symbol: change.symbol,
                    amount: change.change,
                }),
            }
        }
        merged.retain(|c| c.amount.abs() >= DUST_THRESHOLD);
        merged
    }

    /// Caso A: toda variação de saldo é não negativa, exceto uma única
    /// saída nativa compensada por ao menos uma entrada não nativa
    fn match_value_stays(
        &self,
        ctx: &ArbTxContext,
        transfers: &[ReadableTransfer],
        merged: Vec<TokenAmount>,
    ) -> std::result::Result<AtomicArbResult, NotArbReason> {
        let native = self.config.native_token;
        let negatives: Vec<&TokenAmount> = merged.iter().filter(|c| c.amount < 0.0).collect();
        let allowed = negatives.is_empty()
            || (negatives.len() == 1
                && negatives[0].token == native
                && merged.iter().any(|c| c.amount > 0.0 && c.token != native));
        if !allowed {
            return Err(NotArbReason::NoValueFlowPattern);
        }

        let bribe_amount = self.bribe_amount(ctx, transfers);
        let gas = gas_info(ctx);

        // a gorjeta volta ao valor extraído antes do reporte
        let mut extracted = merged;
        add_native(&mut extracted, native, bribe_amount);

        let mut net = extracted.clone();
        add_native(&mut net, native, -(bribe_amount + gas.cost_native));
        net.retain(|c| c.amount.abs() >= DUST_THRESHOLD);

        Ok(AtomicArbResult {
            case: ArbCase::ValueStays,
            extracted_value: extracted,
            bribe: BribeValue::Known(TokenAmount {
                token: native,
                symbol: "ETH".to_string(),
                amount: bribe_amount,
            }),
            net_win: NetWin::Known(net),
            gas,
        })
    }

    /// Caso B: from e to zeram, e o valor sai numa cauda contígua de
    /// transferências para fora do par
    fn match_value_exits(
        &self,
        ctx: &ArbTxContext,
        transfers: &[ReadableTransfer],
    ) -> std::result::Result<AtomicArbResult, NotArbReason> {
        let pair = [ctx.from, ctx.to];
        let exit_idx = transfers
            .iter()
            .rposition(|t| pair.contains(&t.from) && !pair.contains(&t.to))
            .ok_or(NotArbReason::NoValueFlowPattern)?;

        if exit_idx == transfers.len() - 1 {
            // quando a saída é a última transferência, a penúltima precisa
            // ser moeda nativa ou nativa encapsulada
            let penultimate = transfers
                .len()
                .checked_sub(2)
                .and_then(|i| transfers.get(i))
                .ok_or(NotArbReason::NoValueFlowPattern)?;
            if penultimate.token != self.config.native_token
                && penultimate.token != self.config.wrapped_native
            {
                return Err(NotArbReason::NoValueFlowPattern);
            }
        }

        let senders: HashSet<Address> = transfers.iter().map(|t| t.from).collect();
        let mut run = Vec::new();
        for t in transfers[..=exit_idx].iter().rev() {
            let qualifies =
                pair.contains(&t.from) && !pair.contains(&t.to) && !senders.contains(&t.to);
            if !qualifies {
                break;
            }
            run.push(TokenAmount {
                token: t.token,
                symbol: t.symbol.clone(),
                amount: t.parsed_amount,
            });
        }
        if run.is_empty() {
            return Err(NotArbReason::NoValueFlowPattern);
        }
        run.reverse();

        Ok(AtomicArbResult {
            case: ArbCase::ValueExitsToLeaf,
            extracted_value: run,
            bribe: BribeValue::Unknown,
            net_win: NetWin::Unknown,
            gas: gas_info(ctx),
        })
    }

    /// Soma das transferências nativas do par para folhas fora do grafo
    fn bribe_amount(&self, ctx: &ArbTxContext, transfers: &[ReadableTransfer]) -> f64 {
        let native = self.config.native_token;
        let occurrences = occurrence_counts(transfers);
        transfers
            .iter()
            .filter(|t| {
                t.token == native
                    && (t.from == ctx.from || t.from == ctx.to)
                    && t.to != ctx.from
                    && t.to != ctx.to
                    && occurrences.get(&t.to).copied().unwrap_or(0) == 1
            })
            .map(|t| t.parsed_amount)
            .sum()
    }

    /// O contrato se comporta como proxy de governança quando expõe
    /// funções de consulta cache/owner/authority
    async fn is_governance_proxy(&self, to: Address) -> bool {
        for signature in ["cache()", "owner()", "authority()"] {
            let data = utils::selector(signature).to_vec();
            match self.caller.call_at(to, data, None).await {
                Ok(output) if !output.is_empty() => return true,
                _ => {}
            }
        }
        false
    }
}

/// Backrun global difuso: a transação anterior-menos-um do bloco foi
/// enviada pelo mesmo remetente ao mesmo alvo
pub(crate) fn is_global_backrun(ctx: &ArbTxContext) -> bool {
    if ctx.block_position < 2 {
        return false;
    }
    ctx.preceding_txs
        .get(ctx.block_position - 2)
        .map_or(false, |&(from, to)| from == ctx.from && to == ctx.to)
}

fn gas_info(ctx: &ArbTxContext) -> GasInfo {
    let cost_native =
        utils::u256_to_f64_lossy(&(ctx.gas_used * ctx.gas_price)) / 1e18;
    GasInfo {
        used: ctx.gas_used,
        price: ctx.gas_price,
        cost_native,
    }
}

fn add_native(amounts: &mut Vec<TokenAmount>, native: Address, delta: f64) {
    if delta == 0.0 {
        return;
    }
    match amounts.iter_mut().find(|c| c.token == native) {
        Some(entry) => entry.amount += delta,
        None => amounts.push(TokenAmount {
            token: native,
            symbol: "ETH".to_string(),
            amount: delta,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ethereum_types::{H256, U256};
    use mevscope_core::types::native_token_address;
    use mevscope_core::Error;
    use mevscope_transfers::{categorize, CategorizerConfig};

    struct RevertingCaller;

    #[async_trait]
    impl ContractCaller for RevertingCaller {
        async fn call_at(&self, _to: Address, _data: Vec<u8>, _block: Option<u64>) -> Result<Vec<u8>> {
            Err(Error::SimulationFailure("execution reverted".into()))
        }
    }

    struct AnsweringCaller;

    #[async_trait]
    impl ContractCaller for AnsweringCaller {
        async fn call_at(&self, _to: Address, _data: Vec<u8>, _block: Option<u64>) -> Result<Vec<u8>> {
            Ok(vec![0u8; 32])
        }
    }

    fn addr(n: u64) -> Address {
        Address::from_low_u64_be(n)
    }

    fn rt(from: Address, to: Address, token: Address, amount: f64, symbol: &str, position: usize) -> ReadableTransfer {
        ReadableTransfer {
            from,
            to,
            token,
            symbol: symbol.into(),
            amount: U256::from((amount * 1e9) as u64),
            parsed_amount: amount,
            position,
        }
    }

    fn ctx(from: Address, to: Address) -> ArbTxContext {
        ArbTxContext {
            tx_hash: H256::repeat_byte(1),
            from,
            to,
            gas_used: U256::from(100_000u64),
            gas_price: U256::from(1_000_000_000u64), // 1 gwei => custo 1e-4
            block_position: 1,
            preceding_txs: vec![(addr(40), addr(41))],
        }
    }

    fn detector(caller: Arc<dyn ContractCaller>) -> ArbDetector {
        ArbDetector::new(caller, None)
    }

    /// Arbitragem de dois saltos que passa por todos os pré-filtros
    fn two_hop_arb() -> Vec<ReadableTransfer> {
        let native = native_token_address();
        let bot = addr(9);
        let p1 = addr(2);
        let p2 = addr(3);
        let tok = addr(10);
        vec![
            rt(bot, p1, native, 1.0, "ETH", 0),
            rt(p1, bot, tok, 100.0, "AAA", 1),
            rt(bot, p2, tok, 100.0, "AAA", 2),
            rt(p2, bot, native, 1.1, "ETH", 3),
        ]
    }

    #[tokio::test]
    async fn test_two_hop_arb_classified_as_case_a() {
        let transfers = two_hop_arb();
        let categorized = categorize(&transfers, &CategorizerConfig::default()).unwrap();
        let det = detector(Arc::new(RevertingCaller));
        let c = ctx(addr(1), addr(9));

        let result = det.classify(&c, &transfers, &categorized).await.unwrap();
        let ArbClassification::Arb(arb) = result else {
            panic!("esperava arbitragem, obtive {:?}", result);
        };
        assert_eq!(arb.case, ArbCase::ValueStays);
        assert_eq!(arb.extracted_value.len(), 1);
        let native_win = &arb.extracted_value[0];
        assert!((native_win.amount - 0.1).abs() < 1e-9);
        assert!((arb.gas.cost_native - 1e-4).abs() < 1e-12);
        let NetWin::Known(net) = &arb.net_win else { panic!() };
        assert!((net[0].amount - (0.1 - 1e-4)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_classify_and_store_forwards_result_to_sink() {
        struct RecordingSink {
            seen: std::sync::Mutex<Vec<(H256, bool)>>,
        }

        #[async_trait]
        impl ArbSink for RecordingSink {
            async fn store_classification(
                &self,
                tx_hash: H256,
                result: &ArbClassification,
            ) -> Result<()> {
                let is_arb = matches!(result, ArbClassification::Arb(_));
                self.seen.lock().unwrap().push((tx_hash, is_arb));
                Ok(())
            }
        }

        let transfers = two_hop_arb();
        let det = detector(Arc::new(RevertingCaller));
        let sink = RecordingSink { seen: std::sync::Mutex::new(Vec::new()) };
        let c = ctx(addr(1), addr(9));

        let result = det
            .classify_and_store(&c, &transfers, &sink)
            .await
            .unwrap();
        assert!(matches!(result, ArbClassification::Arb(_)));

        let seen = sink.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], (c.tx_hash, true));
    }

    #[tokio::test]
    async fn test_bribe_added_back_to_extracted_value() {
        let mut transfers = two_hop_arb();
        let bot = addr(9);
        let tip_leaf = addr(99);
        transfers.push(rt(bot, tip_leaf, native_token_address(), 0.05, "ETH", 4));

        let categorized = categorize(&transfers, &CategorizerConfig::default()).unwrap();
        let det = detector(Arc::new(RevertingCaller));
        let result = det
            .classify(&ctx(addr(1), bot), &transfers, &categorized)
            .await
            .unwrap();

        let ArbClassification::Arb(arb) = result else { panic!() };
        let BribeValue::Known(bribe) = &arb.bribe else { panic!() };
        assert!((bribe.amount - 0.05).abs() < 1e-9);
        // extraído = saldo (+0.05) + gorjeta devolvida (0.05)
        assert!((arb.extracted_value[0].amount - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_case_a_single_negative_native_allowed() {
        // from: {ETH: -1}; to: {ETH: -1, TOKEN: +50} => caso A
        let native = native_token_address();
        let op = addr(1);
        let bot = addr(9);
        let pool = addr(2);
        let transfers = vec![
            rt(op, pool, native, 1.0, "ETH", 0),
            rt(bot, pool, native, 1.0, "ETH", 1),
            rt(pool, bot, addr(10), 50.0, "TOK", 2),
        ];
        let det = detector(Arc::new(RevertingCaller));
        let result = det.decide_value_flow(&ctx(op, bot), &transfers).unwrap();
        assert_eq!(result.case, ArbCase::ValueStays);
        assert_eq!(result.extracted_value.len(), 2);
    }

    #[test]
    fn test_case_a_rejects_negative_non_native() {
        let op = addr(1);
        let bot = addr(9);
        let transfers = vec![rt(bot, addr(2), addr(10), 5.0, "TOK", 0)];
        let det = detector(Arc::new(RevertingCaller));
        assert_eq!(
            det.decide_value_flow(&ctx(op, bot), &transfers).unwrap_err(),
            NotArbReason::NoValueFlowPattern
        );
    }

    #[test]
    fn test_case_b_trailing_exit_run() {
        let native = native_token_address();
        let bot = addr(9);
        let op = addr(1);
        let (p1, p2, p3) = (addr(2), addr(3), addr(4));
        let (tok_a, tok_b) = (addr(10), addr(11));
        let leaf = addr(99);
        let transfers = vec![
            rt(tok_a, bot, tok_a, 100.0, "AAA", 0), // mint fantasma
            rt(bot, p1, tok_a, 100.0, "AAA", 1),
            rt(p1, bot, native, 1.0, "ETH", 2),
            rt(bot, p2, native, 1.0, "ETH", 3),
            rt(p2, bot, tok_b, 50.0, "BBB", 4),
            rt(bot, p3, tok_b, 50.0, "BBB", 5),
            rt(p3, bot, native, 1.2, "ETH", 6),
            rt(bot, leaf, native, 1.2, "ETH", 7),
        ];
        let det = detector(Arc::new(RevertingCaller));
        let result = det.decide_value_flow(&ctx(op, bot), &transfers).unwrap();
        assert_eq!(result.case, ArbCase::ValueExitsToLeaf);
        assert_eq!(result.extracted_value.len(), 1);
        assert!((result.extracted_value[0].amount - 1.2).abs() < 1e-9);
        assert_eq!(result.bribe, BribeValue::Unknown);
        assert_eq!(result.net_win, NetWin::Unknown);
    }

    #[test]
    fn test_case_b_requires_native_penultimate_when_exit_is_last() {
        let bot = addr(9);
        let op = addr(1);
        let leaf = addr(99);
        let (tok_a, tok_b) = (addr(10), addr(11));
        // penúltima transferência em token não nativo => rejeita
        let transfers = vec![
            rt(tok_a, bot, tok_a, 5.0, "AAA", 0),
            rt(bot, addr(2), tok_a, 5.0, "AAA", 1),
            rt(addr(2), bot, tok_b, 4.0, "BBB", 2),
            rt(bot, leaf, tok_b, 4.0, "BBB", 3),
        ];
        let det = detector(Arc::new(RevertingCaller));
        assert_eq!(
            det.decide_value_flow(&ctx(op, bot), &transfers).unwrap_err(),
            NotArbReason::NoValueFlowPattern
        );
    }

    #[test]
    fn test_cases_are_exclusive() {
        // saldo não nulo com padrão de cauda presente: caso B nunca roda
        let native = native_token_address();
        let bot = addr(9);
        let op = addr(1);
        let transfers = vec![
            rt(bot, addr(2), addr(10), 5.0, "TOK", 0),
            rt(addr(2), bot, native, 1.0, "ETH", 1),
            rt(bot, addr(99), native, 1.0, "ETH", 2),
        ];
        // saldo do bot: TOK -5 (negativo não nativo) => nem A nem B
        let det = detector(Arc::new(RevertingCaller));
        assert_eq!(
            det.decide_value_flow(&ctx(op, bot), &transfers).unwrap_err(),
            NotArbReason::NoValueFlowPattern
        );
    }

    #[tokio::test]
    async fn test_governance_proxy_excluded() {
        let transfers = two_hop_arb();
        let categorized = categorize(&transfers, &CategorizerConfig::default()).unwrap();
        let det = detector(Arc::new(AnsweringCaller));
        let result = det
            .classify(&ctx(addr(1), addr(9)), &transfers, &categorized)
            .await
            .unwrap();
        assert_eq!(result, ArbClassification::NotArb(NotArbReason::GovernanceProxy));
    }

    #[tokio::test]
    async fn test_global_backrun_excluded() {
        let transfers = two_hop_arb();
        let categorized = categorize(&transfers, &CategorizerConfig::default()).unwrap();
        let det = detector(Arc::new(RevertingCaller));
        let mut c = ctx(addr(1), addr(9));
        c.block_position = 2;
        c.preceding_txs = vec![(addr(1), addr(9)), (addr(55), addr(56))];
        let result = det.classify(&c, &transfers, &categorized).await.unwrap();
        assert_eq!(result, ArbClassification::NotArb(NotArbReason::GlobalBackrun));
    }

    #[tokio::test]
    async fn test_classify_batch_preserves_order() {
        let det = detector(Arc::new(RevertingCaller));
        let jobs = vec![
            (ctx(addr(1), addr(9)), two_hop_arb()),
            (
                ctx(addr(1), addr(9)),
                vec![rt(addr(1), addr(9), addr(10), 1.0, "TOK", 0)],
            ),
        ];
        let results = det.classify_batch(&jobs).await;
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0].as_ref().unwrap(), ArbClassification::Arb(_)));
        assert_eq!(
            *results[1].as_ref().unwrap(),
            ArbClassification::NotArb(NotArbReason::TooFewSwapPairs)
        );
    }

    #[tokio::test]
    async fn test_classify_batch_chunks_keep_order_with_small_chunk_size() {
        let config = ArbConfig { chunk_size: 1, ..ArbConfig::default() };
        let det = ArbDetector::new(Arc::new(RevertingCaller), Some(config));
        let lone = vec![rt(addr(1), addr(9), addr(10), 1.0, "TOK", 0)];
        let jobs = vec![
            (ctx(addr(1), addr(9)), lone.clone()),
            (ctx(addr(1), addr(9)), two_hop_arb()),
            (ctx(addr(1), addr(9)), lone),
        ];
        let results = det.classify_batch(&jobs).await;
        assert_eq!(results.len(), 3);
        assert_eq!(
            *results[0].as_ref().unwrap(),
            ArbClassification::NotArb(NotArbReason::TooFewSwapPairs)
        );
        assert!(matches!(results[1].as_ref().unwrap(), ArbClassification::Arb(_)));
        assert_eq!(
            *results[2].as_ref().unwrap(),
            ArbClassification::NotArb(NotArbReason::TooFewSwapPairs)
        );
    }

    #[tokio::test]
    async fn test_too_few_swaps_short_circuits() {
        let transfers = vec![rt(addr(1), addr(9), addr(10), 1.0, "TOK", 0)];
        let categorized = categorize(&transfers, &CategorizerConfig::default()).unwrap();
        let det = detector(Arc::new(RevertingCaller));
        let result = det
            .classify(&ctx(addr(1), addr(9)), &transfers, &categorized)
            .await
            .unwrap();
        assert_eq!(result, ArbClassification::NotArb(NotArbReason::TooFewSwapPairs));
    }
}
