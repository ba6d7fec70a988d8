//! In-memory [`TradeStore`] for dry runs and tests.

use parking_lot::RwLock;

use crate::domain::{AgentId, ConfidenceScore, PnlSnapshot, TradeRecord, TradeSignal};
use crate::error::Result;
use crate::port::TradeStore;

/// Volatile store that keeps every record in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    trades: RwLock<Vec<TradeRecord>>,
    snapshots: RwLock<Vec<PnlSnapshot>>,
    scores: RwLock<Vec<(TradeSignal, ConfidenceScore)>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every trade record, in append order.
    #[must_use]
    pub fn all_trades(&self) -> Vec<TradeRecord> {
        self.trades.read().clone()
    }

    #[must_use]
    pub fn snapshots(&self) -> Vec<PnlSnapshot> {
        self.snapshots.read().clone()
    }

    #[must_use]
    pub fn scores(&self) -> Vec<(TradeSignal, ConfidenceScore)> {
        self.scores.read().clone()
    }
}

impl TradeStore for MemoryStore {
    fn append_trade(&self, record: &TradeRecord) -> Result<()> {
        self.trades.write().push(record.clone());
        Ok(())
    }

    fn append_pnl_snapshot(&self, snapshot: &PnlSnapshot) -> Result<()> {
        self.snapshots.write().push(snapshot.clone());
        Ok(())
    }

    fn record_score(&self, signal: &TradeSignal, score: &ConfidenceScore) -> Result<()> {
        self.scores.write().push((signal.clone(), score.clone()));
        Ok(())
    }

    fn trades(&self, agent: &AgentId) -> Result<Vec<TradeRecord>> {
        Ok(self
            .trades
            .read()
            .iter()
            .filter(|t| &t.agent == agent)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContractRef;
    use chrono::Utc;

    #[test]
    fn scores_are_kept_in_order() {
        let store = MemoryStore::new();
        let signal = TradeSignal::new("alpha", "tweet-1", ContractRef::new("X", "0x1", "base"));
        for score in [0.2, 0.9] {
            let score = ConfidenceScore::try_new(score, "", Utc::now()).unwrap();
            store.record_score(&signal, &score).unwrap();
        }
        let scores: Vec<f64> = store.scores().iter().map(|(_, s)| s.score()).collect();
        assert_eq!(scores, vec![0.2, 0.9]);
    }
}
