use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;

use crate::{
    error::ExtractorError,
    extractor::{contracts::ContractSet, enrich::EnrichmentCache, filter::QueryPlan},
    resilient_client::ResilientClient,
    sink::Sink,
    types::{BlockRange, EventRecord, LogRecord, fields},
};

/// Outcome of one processed chunk.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChunkReport {
    pub range: BlockRange,
    pub events: usize,
    pub elapsed: Duration,
}

/// Runs fetch, decode, enrich and persist for single chunks.
#[derive(Debug)]
pub struct ChunkProcessor {
    client: ResilientClient,
    plan: QueryPlan,
    contracts: Arc<ContractSet>,
    enrichment: Arc<EnrichmentCache>,
    sink: Arc<dyn Sink>,
}

impl ChunkProcessor {
    #[must_use]
    pub fn new(client: ResilientClient, contracts: Arc<ContractSet>, sink: Arc<dyn Sink>) -> Self {
        let plan = QueryPlan::new(&contracts);
        let enrichment = Arc::new(EnrichmentCache::new(client.clone()));
        Self { client, plan, contracts, enrichment, sink }
    }

    #[must_use]
    pub fn plan(&self) -> &QueryPlan {
        &self.plan
    }

    #[must_use]
    pub fn enrichment(&self) -> &EnrichmentCache {
        &self.enrichment
    }

    /// Processes every log of `range`. Returns only once all its records were written.
    ///
    /// # Errors
    ///
    /// Node or sink failures that outlived their retries, or [`ExtractorError::Cancelled`].
    pub async fn process(
        &self,
        range: BlockRange,
        token: &CancellationToken,
    ) -> Result<ChunkReport, ExtractorError> {
        let started = Instant::now();

        let mut logs = Vec::new();
        for query in self.plan.queries(range) {
            logs.extend(self.client.logs(&query, token).await?);
        }

        let mut events = 0;
        for log in logs.iter().filter(|log| self.plan.accepts(log)) {
            if token.is_cancelled() {
                return Err(ExtractorError::Cancelled);
            }
            let Some(mut record) = self.record_for(log) else {
                continue;
            };
            self.enrichment.enrich(&mut record, log, token).await?;
            self.sink.write(&record, token).await?;
            events += 1;
        }

        Ok(ChunkReport { range, events, elapsed: started.elapsed() })
    }

    /// Decoded record for `log`, a minimal record when the event is unknown, `None` when the
    /// payload does not decode.
    fn record_for(&self, log: &LogRecord) -> Option<EventRecord> {
        let Some(contract) = self.contracts.get(&log.address) else {
            return Some(EventRecord::from_log(log, fields::UNKNOWN, fields::UNKNOWN));
        };
        let Some(event) = log.topic0().and_then(|topic| contract.decoder.resolve_event(topic))
        else {
            trace!(
                contract = contract.name.as_str(),
                block = log.block_number,
                "event not in ABI, writing minimal record"
            );
            return Some(EventRecord::from_log(log, &contract.name, fields::UNKNOWN));
        };

        match contract.decoder.decode(event, &log.topics, &log.data) {
            Ok(decoded) => {
                let mut record = EventRecord::from_log(log, &contract.name, &event.name);
                record.extend_decoded(decoded);
                Some(record)
            }
            Err(err) => {
                debug!(
                    block = log.block_number,
                    tx = %log.transaction_hash,
                    error = %err,
                    "failed to decode log"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        extractor::contracts::TrackedContract,
        retry::RetryPolicy,
        test_utils::{APPROVAL_TOPIC, MemorySink, MockNode, TRANSFER_TOPIC, erc20_decoder, transfer_log},
    };
    use alloy::primitives::{Address, B256, Bytes, address};

    const C1: Address = address!("0x00000000000000000000000000000000000000c1");
    const C2: Address = address!("0x00000000000000000000000000000000000000c2");

    fn processor(node: &Arc<MockNode>, sink: &Arc<MemorySink>, contracts: Vec<TrackedContract>) -> ChunkProcessor {
        let client = ResilientClient::new(node.clone(), RetryPolicy::new(2, Duration::from_millis(1)));
        ChunkProcessor::new(client, Arc::new(ContractSet::new(contracts)), sink.clone())
    }

    #[tokio::test]
    async fn filtered_contract_only_yields_allowed_events() -> anyhow::Result<()> {
        let node = Arc::new(MockNode::new(2_000));
        node.push_log(transfer_log(C1, 150, 1));
        let mut approval = transfer_log(C1, 160, 2);
        approval.topics[0] = APPROVAL_TOPIC;
        node.push_log(approval);
        let sink = Arc::new(MemorySink::default());
        let processor = processor(
            &node,
            &sink,
            vec![TrackedContract::new("C1", C1, erc20_decoder()).with_events(["Transfer"])],
        );

        let report = processor.process(BlockRange::new(100, 1099), &CancellationToken::new()).await?;

        assert_eq!(report.events, 1);
        let records = sink.records();
        assert_eq!(records[0].event_name(), "Transfer");
        assert_eq!(records[0].contract_name(), "C1");
        assert!(records[0].contains(fields::TIMESTAMP));
        assert!(records[0].contains("value"));
        Ok(())
    }

    #[tokio::test]
    async fn unfiltered_contract_yields_every_event() -> anyhow::Result<()> {
        let node = Arc::new(MockNode::new(2_000));
        node.push_log(transfer_log(C2, 150, 1));
        let mut other = transfer_log(C2, 151, 2);
        other.topics[0] = B256::repeat_byte(0xee);
        node.push_log(other);
        let sink = Arc::new(MemorySink::default());
        let processor =
            processor(&node, &sink, vec![TrackedContract::new("C2", C2, erc20_decoder())]);

        let report = processor.process(BlockRange::new(100, 199), &CancellationToken::new()).await?;

        assert_eq!(report.events, 2);
        let names: Vec<_> = sink.records().iter().map(|r| r.event_name().to_owned()).collect();
        assert_eq!(names, vec!["Transfer", "unknown"]);
        Ok(())
    }

    #[tokio::test]
    async fn undecodable_logs_are_skipped() -> anyhow::Result<()> {
        let node = Arc::new(MockNode::new(2_000));
        let mut broken = transfer_log(C1, 150, 1);
        broken.data = Bytes::new();
        node.push_log(broken);
        node.push_log(transfer_log(C1, 151, 2));
        let sink = Arc::new(MemorySink::default());
        let processor =
            processor(&node, &sink, vec![TrackedContract::new("C1", C1, erc20_decoder())]);

        let report = processor.process(BlockRange::new(100, 199), &CancellationToken::new()).await?;

        assert_eq!(report.events, 1);
        Ok(())
    }

    #[tokio::test]
    async fn events_in_one_block_share_a_header_fetch() -> anyhow::Result<()> {
        let node = Arc::new(MockNode::new(2_000));
        for index in 0..5 {
            node.push_log(transfer_log(C1, 150, index));
        }
        node.push_log(transfer_log(C1, 170, 9));
        let sink = Arc::new(MemorySink::default());
        let processor =
            processor(&node, &sink, vec![TrackedContract::new("C1", C1, erc20_decoder())]);

        processor.process(BlockRange::new(100, 199), &CancellationToken::new()).await?;

        assert_eq!(node.header_fetches(150), 1);
        assert_eq!(node.header_fetches(170), 1);
        assert_eq!(node.calls("eth_getBlockByNumber"), 2);
        Ok(())
    }

    #[tokio::test]
    async fn sink_failure_fails_the_chunk() {
        let node = Arc::new(MockNode::new(2_000));
        node.push_log(transfer_log(C1, 150, 1));
        let sink = Arc::new(MemorySink::default());
        sink.fail_next(1);
        let processor =
            processor(&node, &sink, vec![TrackedContract::new("C1", C1, erc20_decoder())]);

        let err = processor
            .process(BlockRange::new(100, 199), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ExtractorError::Sink(_)));
    }

    #[tokio::test]
    async fn uses_at_most_two_queries() -> anyhow::Result<()> {
        let node = Arc::new(MockNode::new(2_000));
        let sink = Arc::new(MemorySink::default());
        let processor = processor(
            &node,
            &sink,
            vec![
                TrackedContract::new("C1", C1, erc20_decoder()).with_events(["Transfer"]),
                TrackedContract::new("C2", C2, erc20_decoder()),
            ],
        );

        processor.process(BlockRange::new(100, 199), &CancellationToken::new()).await?;

        assert_eq!(node.calls("eth_getLogs"), 2);
        assert_eq!(TRANSFER_TOPIC, processor.plan().filtered_topics()[0]);
        Ok(())
    }
}
