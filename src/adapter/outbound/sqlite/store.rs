//! SQLite [`TradeStore`].

use diesel::prelude::*;
use tracing::debug;

use super::connection::DbPool;
use super::model::{NewPnlRow, NewScoreRow, NewSnapshotRow, NewTradeRow, TradeRow};
use super::schema::{confidence_scores, pnl_rows, pnl_snapshots, trades};
use crate::domain::{AgentId, ConfidenceScore, PnlSnapshot, TradeRecord, TradeSignal};
use crate::error::{Error, Result};
use crate::port::TradeStore;

#[derive(QueryableByName)]
struct LastInsertRowId {
    #[diesel(sql_type = diesel::sql_types::Integer)]
    id: i32,
}

/// Append-only trade store backed by SQLite.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    #[must_use]
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn conn(
        &self,
    ) -> Result<diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<SqliteConnection>>> {
        self.pool.get().map_err(|e| Error::Connection(e.to_string()))
    }

    /// Number of persisted PnL snapshots.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn snapshot_count(&self) -> Result<i64> {
        let mut conn = self.conn()?;
        pnl_snapshots::table
            .count()
            .get_result(&mut conn)
            .map_err(db_error)
    }

    /// Number of persisted confidence scores.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn score_count(&self) -> Result<i64> {
        let mut conn = self.conn()?;
        confidence_scores::table
            .count()
            .get_result(&mut conn)
            .map_err(db_error)
    }
}

fn db_error(e: diesel::result::Error) -> Error {
    Error::Database(e.to_string())
}

impl TradeStore for SqliteStore {
    fn append_trade(&self, record: &TradeRecord) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::insert_into(trades::table)
            .values(NewTradeRow::from(record))
            .execute(&mut conn)
            .map_err(db_error)?;
        debug!(trade_id = %record.trade_id, action = record.action.as_str(), "Trade record stored");
        Ok(())
    }

    fn append_pnl_snapshot(&self, snapshot: &PnlSnapshot) -> Result<()> {
        let mut conn = self.conn()?;
        conn.transaction(|conn| {
            diesel::insert_into(pnl_snapshots::table)
                .values(NewSnapshotRow::from(snapshot))
                .execute(conn)?;
            let snapshot_id = diesel::sql_query("SELECT last_insert_rowid() AS id")
                .get_result::<LastInsertRowId>(conn)?
                .id;
            let rows: Vec<NewPnlRow> = snapshot
                .rows
                .iter()
                .map(|row| NewPnlRow::new(snapshot_id, row))
                .collect();
            diesel::insert_into(pnl_rows::table)
                .values(&rows)
                .execute(conn)?;
            Ok::<_, diesel::result::Error>(())
        })
        .map_err(db_error)
    }

    fn record_score(&self, signal: &TradeSignal, score: &ConfidenceScore) -> Result<()> {
        let mut conn = self.conn()?;
        diesel::insert_into(confidence_scores::table)
            .values(NewScoreRow::new(signal, score))
            .execute(&mut conn)
            .map_err(db_error)?;
        Ok(())
    }

    fn trades(&self, agent: &AgentId) -> Result<Vec<TradeRecord>> {
        let mut conn = self.conn()?;
        let rows: Vec<TradeRow> = trades::table
            .filter(trades::agent.eq(agent.as_str()))
            .order(trades::id.asc())
            .select(TradeRow::as_select())
            .load(&mut conn)
            .map_err(db_error)?;
        rows.into_iter().map(TradeRecord::try_from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::outbound::sqlite::connection::open;
    use crate::domain::{
        ContractRef, ExitLevels, ExitReason, PnlRow, Position, PositionId, PositionStatus,
        TradeAction,
    };
    use crate::port::PerformanceSource;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn levels() -> ExitLevels {
        ExitLevels {
            take_profit_pct: dec!(1),
            stop_loss_pct: dec!(-0.5),
        }
    }

    fn position(agent: &str, n: u64) -> Position {
        let signal = TradeSignal::new(
            agent,
            format!("tweet-{n}"),
            ContractRef::new("TOKENX", format!("0x{n:040x}"), "base"),
        );
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        Position::open(PositionId::new(n), format!("T{n}"), &signal, dec!(1), dec!(100), at).unwrap()
    }

    #[test]
    fn trade_records_survive_storage() {
        let store = SqliteStore::new(open(":memory:").unwrap());
        let mut pos = position("alpha", 1);
        let opened = TradeRecord::from_position(&pos, TradeAction::Open, levels(), None, Some("0xabc".into()), Utc::now());
        store.append_trade(&opened).unwrap();

        pos.apply_close(dec!(0.4), Utc::now());
        let closed = TradeRecord::from_position(
            &pos,
            TradeAction::Close,
            levels(),
            Some(ExitReason::StopLoss),
            None,
            Utc::now(),
        );
        store.append_trade(&closed).unwrap();

        let loaded = store.trades(&"alpha".into()).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].action, TradeAction::Open);
        assert_eq!(loaded[0].entry_price, dec!(1));
        assert_eq!(loaded[0].tx_hash.as_deref(), Some("0xabc"));
        assert_eq!(loaded[1].status, PositionStatus::Closed);
        assert_eq!(loaded[1].exit_reason, Some(ExitReason::StopLoss));
        assert_eq!(loaded[1].exit_price, Some(dec!(0.4)));
        assert!(store.trades(&"beta".into()).unwrap().is_empty());
    }

    #[test]
    fn summary_derives_from_stored_trades() {
        let store = SqliteStore::new(open(":memory:").unwrap());
        let mut pos = position("alpha", 1);
        store
            .append_trade(&TradeRecord::from_position(&pos, TradeAction::Open, levels(), None, None, Utc::now()))
            .unwrap();
        pos.apply_close(dec!(2), Utc::now());
        store
            .append_trade(&TradeRecord::from_position(
                &pos,
                TradeAction::Close,
                levels(),
                Some(ExitReason::ScheduledEviction),
                None,
                Utc::now(),
            ))
            .unwrap();

        let summary = store.agent_summary(&"alpha".into()).unwrap();
        assert_eq!(summary.closed_positions, 1);
        assert_eq!(summary.wins, 1);
        assert_eq!(summary.open_positions, 0);
    }

    #[test]
    fn snapshots_store_rows_atomically() {
        let store = SqliteStore::new(open(":memory:").unwrap());
        let pos = position("alpha", 7);
        let row = PnlRow {
            position_id: pos.id(),
            agent: pos.agent().clone(),
            ticker: pos.ticker().to_string(),
            contract: pos.contract().clone(),
            status: pos.status(),
            entry_time: pos.entry_timestamp(),
            entry_price: dec!(1),
            current_price: dec!(1.5),
            price_change_pct: dec!(0.5),
            invested_usd: dec!(100),
            current_value_usd: dec!(150),
            pnl_usd: dec!(50),
        };
        store
            .append_pnl_snapshot(&PnlSnapshot::from_rows(Utc::now(), vec![row]))
            .unwrap();
        assert_eq!(store.snapshot_count().unwrap(), 1);
    }
}
