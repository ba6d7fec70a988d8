//! Position ledger: the authoritative portfolio state.
//!
//! Every mutation runs as a single check-and-mutate under one mutex, so
//! capacity and duplicate checks observe a consistent view and concurrent
//! callers are linearized. After each mutation the ledger re-verifies its
//! invariants; a violation rolls the mutation back, halts the ledger and
//! refuses every later mutation until an operator intervenes.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, error, info, warn};

use crate::domain::trade::trade_id_at;
use crate::domain::{
    AgentId, CapacityScope, ContractAddress, PortfolioState, Position, PositionId, PositionStatus,
    Price, Quantity, TradeSignal, UsdAmount,
};
use crate::error::LedgerError;

/// Capacity and capital limits enforced by the ledger.
#[derive(Debug, Clone)]
pub struct LedgerLimits {
    /// Maximum non-graduated active positions across all agents.
    pub global_cap: usize,
    /// Cap for agents without an explicit entry.
    pub default_agent_cap: usize,
    /// Per-agent caps.
    pub agent_caps: BTreeMap<AgentId, usize>,
    /// Starting quote-currency balance.
    pub initial_balance_usd: UsdAmount,
}

impl LedgerLimits {
    #[must_use]
    pub fn agent_cap(&self, agent: &AgentId) -> usize {
        self.agent_caps
            .get(agent)
            .copied()
            .unwrap_or(self.default_agent_cap)
    }

    /// Set the cap for one agent.
    #[must_use]
    pub fn with_agent(mut self, agent: impl Into<AgentId>, cap: usize) -> Self {
        self.agent_caps.insert(agent.into(), cap);
        self
    }
}

impl Default for LedgerLimits {
    fn default() -> Self {
        Self {
            global_cap: 25,
            default_agent_cap: 5,
            agent_caps: BTreeMap::new(),
            initial_balance_usd: Decimal::from(2500),
        }
    }
}

/// A confirmed buy as the ledger records it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuyFill {
    pub price: Price,
    pub spent_usd: UsdAmount,
    /// Tokens that reached the wallet.
    pub quantity: Quantity,
}

/// A capacity slot held for an in-flight buy.
///
/// Obtained from [`PositionLedger::reserve`] and consumed by either
/// [`PositionLedger::commit`] or [`PositionLedger::release`].
#[derive(Debug)]
pub struct Reservation {
    id: u64,
    agent: AgentId,
    contract: ContractAddress,
    size_usd: UsdAmount,
}

impl Reservation {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn agent(&self) -> &AgentId {
        &self.agent
    }

    #[must_use]
    pub fn contract(&self) -> &ContractAddress {
        &self.contract
    }

    #[must_use]
    pub fn size_usd(&self) -> UsdAmount {
        self.size_usd
    }
}

#[derive(Debug, Clone)]
struct PendingSlot {
    agent: AgentId,
    contract: ContractAddress,
    size_usd: UsdAmount,
}

#[derive(Debug, Clone)]
struct LedgerInner {
    positions: BTreeMap<PositionId, Position>,
    reservations: BTreeMap<u64, PendingSlot>,
    next_position_id: u64,
    next_reservation_id: u64,
    balance_usd: UsdAmount,
    last_trade_stamp: Option<DateTime<Utc>>,
    halted: Option<String>,
}

impl LedgerInner {
    fn new(balance_usd: UsdAmount) -> Self {
        Self {
            positions: BTreeMap::new(),
            reservations: BTreeMap::new(),
            next_position_id: 1,
            next_reservation_id: 1,
            balance_usd,
            last_trade_stamp: None,
            halted: None,
        }
    }

    fn holds(&self, agent: &AgentId, contract: &ContractAddress) -> bool {
        self.positions
            .values()
            .any(|p| p.status().is_active() && p.agent() == agent && p.contract() == contract)
    }

    fn pending_for(&self, agent: &AgentId, contract: &ContractAddress) -> bool {
        self.reservations
            .values()
            .any(|r| &r.agent == agent && &r.contract == contract)
    }

    fn open_count(&self, agent: &AgentId) -> usize {
        self.positions
            .values()
            .filter(|p| p.agent() == agent && p.status().counts_toward_cap())
            .count()
    }

    fn global_count(&self) -> usize {
        self.positions
            .values()
            .filter(|p| p.status().counts_toward_cap())
            .count()
    }

    fn reserved_count(&self, agent: Option<&AgentId>) -> usize {
        self.reservations
            .values()
            .filter(|r| agent.map_or(true, |a| &r.agent == a))
            .count()
    }

    fn reserved_usd(&self) -> UsdAmount {
        self.reservations.values().map(|r| r.size_usd).sum()
    }

    /// Duplicate, agent cap, global cap, then balance.
    fn check_admission(
        &self,
        limits: &LedgerLimits,
        agent: &AgentId,
        contract: &ContractAddress,
        size_usd: UsdAmount,
    ) -> Result<(), LedgerError> {
        if self.holds(agent, contract) || self.pending_for(agent, contract) {
            return Err(LedgerError::DuplicatePosition {
                agent: agent.to_string(),
                contract: contract.to_string(),
            });
        }
        if self.open_count(agent) + self.reserved_count(Some(agent)) >= limits.agent_cap(agent) {
            return Err(LedgerError::CapacityExceeded {
                scope: CapacityScope::Agent,
            });
        }
        if self.global_count() + self.reserved_count(None) >= limits.global_cap {
            return Err(LedgerError::CapacityExceeded {
                scope: CapacityScope::Global,
            });
        }
        if self.balance_usd - self.reserved_usd() < size_usd {
            return Err(LedgerError::CapacityExceeded {
                scope: CapacityScope::Balance,
            });
        }
        Ok(())
    }

    fn next_trade_id(&mut self, at: DateTime<Utc>) -> String {
        let stamp = match self.last_trade_stamp {
            Some(last) if at <= last => last + Duration::microseconds(1),
            _ => at,
        };
        self.last_trade_stamp = Some(stamp);
        trade_id_at(stamp)
    }

    fn insert_position(
        &mut self,
        signal: &TradeSignal,
        entry_price: Price,
        spent_usd: UsdAmount,
        filled: Option<Quantity>,
        confidence: Option<f64>,
        at: DateTime<Utc>,
    ) -> Result<Position, LedgerError> {
        let id = PositionId::new(self.next_position_id);
        let trade_id = self.next_trade_id(at);
        let mut position = Position::open(id, trade_id, signal, entry_price, spent_usd, at)?;
        if let Some(quantity) = filled {
            position = position.with_filled_quantity(quantity)?;
        }
        if let Some(score) = confidence {
            position = position.with_confidence(score);
        }
        self.next_position_id += 1;
        self.balance_usd -= spent_usd;
        self.positions.insert(id, position.clone());
        Ok(position)
    }

    fn position_mut(&mut self, id: PositionId) -> Result<&mut Position, LedgerError> {
        self.positions
            .get_mut(&id)
            .ok_or(LedgerError::PositionNotFound(id))
    }

    fn verify(&self, limits: &LedgerLimits) -> Result<(), String> {
        let mut held: HashSet<(&AgentId, &ContractAddress)> = HashSet::new();
        let mut per_agent: BTreeMap<&AgentId, usize> = BTreeMap::new();
        let mut total = 0usize;

        for position in self.positions.values().filter(|p| p.status().is_active()) {
            if !held.insert((position.agent(), position.contract())) {
                return Err(format!(
                    "duplicate active position for agent {} and contract {}",
                    position.agent(),
                    position.contract()
                ));
            }
            if position.status().counts_toward_cap() {
                *per_agent.entry(position.agent()).or_default() += 1;
                total += 1;
            }
        }
        for slot in self.reservations.values() {
            *per_agent.entry(&slot.agent).or_default() += 1;
            total += 1;
        }

        for (agent, count) in per_agent {
            let cap = limits.agent_cap(agent);
            if count > cap {
                return Err(format!("agent {agent} holds {count} positions, cap {cap}"));
            }
        }
        if total > limits.global_cap {
            return Err(format!(
                "portfolio holds {total} positions, global cap {}",
                limits.global_cap
            ));
        }
        if self.balance_usd < Decimal::ZERO {
            return Err(format!("negative balance {}", self.balance_usd));
        }
        Ok(())
    }
}

/// Authoritative store of positions and capacity counters.
pub struct PositionLedger {
    limits: LedgerLimits,
    inner: Mutex<LedgerInner>,
}

impl PositionLedger {
    /// Create an empty ledger with the given limits.
    #[must_use]
    pub fn new(limits: LedgerLimits) -> Self {
        let inner = LedgerInner::new(limits.initial_balance_usd);
        Self {
            limits,
            inner: Mutex::new(inner),
        }
    }

    #[must_use]
    pub fn limits(&self) -> &LedgerLimits {
        &self.limits
    }

    /// Run `f` as one atomic transition.
    ///
    /// Errors from `f` and invariant violations both restore the previous
    /// state; a violation additionally halts the ledger.
    fn transact<T>(
        &self,
        f: impl FnOnce(&mut LedgerInner) -> Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        let mut inner = self.inner.lock();
        if inner.halted.is_some() {
            return Err(LedgerError::Halted);
        }
        let backup = inner.clone();
        let value = match f(&mut inner) {
            Ok(value) => value,
            Err(e) => {
                *inner = backup;
                return Err(e);
            }
        };
        if let Err(reason) = inner.verify(&self.limits) {
            *inner = backup;
            inner.halted = Some(reason.clone());
            error!(reason = %reason, "Ledger invariant violated, halting");
            return Err(LedgerError::InvariantViolation(reason));
        }
        Ok(value)
    }

    /// Hold a capacity slot and `size_usd` of balance for an in-flight buy.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicatePosition`] if the agent already holds
    /// or is buying the contract, or [`LedgerError::CapacityExceeded`].
    pub fn reserve(
        &self,
        agent: &AgentId,
        contract: &ContractAddress,
        size_usd: UsdAmount,
    ) -> Result<Reservation, LedgerError> {
        let reservation = self.transact(|inner| {
            inner.check_admission(&self.limits, agent, contract, size_usd)?;
            let id = inner.next_reservation_id;
            inner.next_reservation_id += 1;
            inner.reservations.insert(
                id,
                PendingSlot {
                    agent: agent.clone(),
                    contract: contract.clone(),
                    size_usd,
                },
            );
            Ok(Reservation {
                id,
                agent: agent.clone(),
                contract: contract.clone(),
                size_usd,
            })
        });
        match &reservation {
            Ok(r) => debug!(agent = %agent, contract = %contract, reservation = r.id, "Capacity reserved"),
            Err(e) => debug!(agent = %agent, contract = %contract, error = %e, "Reservation refused"),
        }
        reservation
    }

    /// Give back a reservation whose buy did not happen.
    pub fn release(&self, reservation: Reservation) {
        let mut inner = self.inner.lock();
        if inner.reservations.remove(&reservation.id).is_none() {
            warn!(reservation = reservation.id, "Released unknown reservation");
        }
    }

    /// Turn a reservation into an open position after a confirmed buy.
    ///
    /// # Errors
    ///
    /// Returns an error if the reservation is unknown, the fill is invalid,
    /// or the ledger is halted.
    pub fn commit(
        &self,
        reservation: Reservation,
        signal: &TradeSignal,
        fill: BuyFill,
        confidence: Option<f64>,
        at: DateTime<Utc>,
    ) -> Result<Position, LedgerError> {
        let result = self.transact(|inner| {
            if inner.reservations.remove(&reservation.id).is_none() {
                return Err(LedgerError::ReservationNotFound(reservation.id));
            }
            inner.insert_position(signal, fill.price, fill.spent_usd, Some(fill.quantity), confidence, at)
        });
        let position = match result {
            Ok(position) => position,
            Err(e) => {
                // The rollback put the slot back; drop it so capacity frees up.
                self.inner.lock().reservations.remove(&reservation.id);
                return Err(e);
            }
        };
        info!(
            position = %position.id(),
            agent = %position.agent(),
            ticker = %position.ticker(),
            entry_price = %fill.price,
            size_usd = %fill.spent_usd,
            quantity = %fill.quantity,
            "Position opened"
        );
        Ok(position)
    }

    /// Check capacity and create a position in one step.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicatePosition`] or
    /// [`LedgerError::CapacityExceeded`] when the signal cannot be admitted.
    pub fn open_position(
        &self,
        signal: &TradeSignal,
        size_usd: UsdAmount,
        entry_price: Price,
        at: DateTime<Utc>,
    ) -> Result<Position, LedgerError> {
        let position = self.transact(|inner| {
            inner.check_admission(&self.limits, &signal.agent, &signal.contract, size_usd)?;
            inner.insert_position(signal, entry_price, size_usd, None, None, at)
        })?;
        info!(
            position = %position.id(),
            agent = %position.agent(),
            ticker = %position.ticker(),
            "Position opened"
        );
        Ok(position)
    }

    /// Record the take-profit sale of `sold_usd` worth at `price`.
    ///
    /// `sold_usd` drives the position's recovered capital; the balance is
    /// credited with `proceeds_usd`, the quote amount the swap delivered.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidTransition`] unless the position is `Open`.
    pub fn record_partial_sell(
        &self,
        id: PositionId,
        sold_usd: UsdAmount,
        price: Price,
        proceeds_usd: UsdAmount,
    ) -> Result<Position, LedgerError> {
        self.transact(|inner| {
            let position = inner.position_mut(id)?;
            if position.status() != PositionStatus::Open {
                return Err(LedgerError::InvalidTransition {
                    position: id,
                    from: position.status(),
                    action: "partially sell",
                });
            }
            if price <= Decimal::ZERO {
                return Err(crate::domain::DomainError::NonPositivePrice { price }.into());
            }
            position.apply_partial_sell(sold_usd, price);
            let updated = position.clone();
            inner.balance_usd += proceeds_usd;
            Ok(updated)
        })
    }

    /// Sell the remainder at `exit_price` and mark the position closed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidTransition`] if the position is already
    /// closed or graduated.
    pub fn close_position(
        &self,
        id: PositionId,
        exit_price: Price,
        at: DateTime<Utc>,
    ) -> Result<Position, LedgerError> {
        self.transact(|inner| {
            let position = inner.position_mut(id)?;
            if !position.status().counts_toward_cap() {
                return Err(LedgerError::InvalidTransition {
                    position: id,
                    from: position.status(),
                    action: "close",
                });
            }
            let proceeds = position.apply_close(exit_price, at);
            let updated = position.clone();
            inner.balance_usd += proceeds;
            Ok(updated)
        })
    }

    /// Graduate a partially taken position whose capital was recovered.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidTransition`] unless the position is
    /// `PartialTaken` with its cost basis recovered.
    pub fn mark_graduated(&self, id: PositionId) -> Result<Position, LedgerError> {
        self.transact(|inner| {
            let position = inner.position_mut(id)?;
            if position.status() != PositionStatus::PartialTaken || !position.capital_recovered() {
                return Err(LedgerError::InvalidTransition {
                    position: id,
                    from: position.status(),
                    action: "graduate",
                });
            }
            position.apply_graduation();
            Ok(position.clone())
        })
    }

    /// Record that the engine evaluated `id` at `at`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::PositionNotFound`] or [`LedgerError::Halted`].
    pub fn touch(&self, id: PositionId, at: DateTime<Utc>) -> Result<(), LedgerError> {
        self.transact(|inner| {
            inner.position_mut(id)?.touch(at);
            Ok(())
        })
    }

    /// Consistent point-in-time copy of the portfolio.
    #[must_use]
    pub fn snapshot(&self) -> PortfolioState {
        let inner = self.inner.lock();
        let mut open_counts: BTreeMap<AgentId, usize> = BTreeMap::new();
        for position in inner.positions.values() {
            if position.status().counts_toward_cap() {
                *open_counts.entry(position.agent().clone()).or_default() += 1;
            }
        }
        let mut reserved: BTreeMap<AgentId, usize> = BTreeMap::new();
        for slot in inner.reservations.values() {
            *reserved.entry(slot.agent.clone()).or_default() += 1;
        }

        PortfolioState {
            taken_at: Utc::now(),
            positions: inner.positions.values().cloned().collect(),
            open_counts,
            agent_caps: self.limits.agent_caps.clone(),
            default_agent_cap: self.limits.default_agent_cap,
            global_cap: self.limits.global_cap,
            reserved,
            balance_usd: inner.balance_usd,
            halted: inner.halted.is_some(),
        }
    }

    #[must_use]
    pub fn position(&self, id: PositionId) -> Option<Position> {
        self.inner.lock().positions.get(&id).cloned()
    }

    /// Returns true if a non-closed position exists for `(agent, contract)`.
    #[must_use]
    pub fn holds(&self, agent: &AgentId, contract: &ContractAddress) -> bool {
        self.inner.lock().holds(agent, contract)
    }

    #[must_use]
    pub fn balance(&self) -> UsdAmount {
        self.inner.lock().balance_usd
    }

    /// Reason the ledger halted, if it did.
    #[must_use]
    pub fn halted(&self) -> Option<String> {
        self.inner.lock().halted.clone()
    }

    #[cfg(test)]
    fn insert_unchecked(&self, position: Position) {
        let mut inner = self.inner.lock();
        inner.positions.insert(position.id(), position);
    }
}

impl Default for PositionLedger {
    fn default() -> Self {
        Self::new(LedgerLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContractRef;
    use rust_decimal_macros::dec;

    fn signal(agent: &str, contract: &str) -> TradeSignal {
        TradeSignal::new(agent, "post", ContractRef::new("TKN", contract, "base"))
    }

    fn ledger(agent_cap: usize, global_cap: usize) -> PositionLedger {
        PositionLedger::new(LedgerLimits {
            global_cap,
            default_agent_cap: agent_cap,
            agent_caps: BTreeMap::new(),
            initial_balance_usd: dec!(10000),
        })
    }

    fn fill(price: Decimal, spent_usd: Decimal, quantity: Decimal) -> BuyFill {
        BuyFill {
            price,
            spent_usd,
            quantity,
        }
    }

    #[test]
    fn open_position_rejects_duplicate() {
        let ledger = ledger(5, 25);
        let now = Utc::now();
        ledger.open_position(&signal("a", "0x1"), dec!(100), dec!(1), now).unwrap();

        let result = ledger.open_position(&signal("a", "0x1"), dec!(100), dec!(1), now);
        assert!(matches!(result, Err(LedgerError::DuplicatePosition { .. })));

        // Another agent may hold the same contract.
        assert!(ledger.open_position(&signal("b", "0x1"), dec!(100), dec!(1), now).is_ok());
    }

    #[test]
    fn agent_cap_is_enforced() {
        let ledger = ledger(2, 25);
        let now = Utc::now();
        ledger.open_position(&signal("a", "0x1"), dec!(100), dec!(1), now).unwrap();
        ledger.open_position(&signal("a", "0x2"), dec!(100), dec!(1), now).unwrap();

        let result = ledger.open_position(&signal("a", "0x3"), dec!(100), dec!(1), now);
        assert_eq!(
            result.unwrap_err(),
            LedgerError::CapacityExceeded {
                scope: CapacityScope::Agent
            }
        );
    }

    #[test]
    fn global_cap_is_enforced() {
        let ledger = ledger(5, 2);
        let now = Utc::now();
        ledger.open_position(&signal("a", "0x1"), dec!(100), dec!(1), now).unwrap();
        ledger.open_position(&signal("b", "0x2"), dec!(100), dec!(1), now).unwrap();

        let result = ledger.open_position(&signal("c", "0x3"), dec!(100), dec!(1), now);
        assert_eq!(
            result.unwrap_err(),
            LedgerError::CapacityExceeded {
                scope: CapacityScope::Global
            }
        );
    }

    #[test]
    fn balance_is_enforced() {
        let ledger = PositionLedger::new(LedgerLimits {
            initial_balance_usd: dec!(150),
            ..LedgerLimits::default()
        });
        let now = Utc::now();
        ledger.open_position(&signal("a", "0x1"), dec!(100), dec!(1), now).unwrap();

        let result = ledger.open_position(&signal("a", "0x2"), dec!(100), dec!(1), now);
        assert_eq!(
            result.unwrap_err(),
            LedgerError::CapacityExceeded {
                scope: CapacityScope::Balance
            }
        );
        assert_eq!(ledger.balance(), dec!(50));
    }

    #[test]
    fn graduated_positions_free_capacity() {
        let ledger = ledger(1, 25);
        let now = Utc::now();
        let position = ledger.open_position(&signal("a", "0x1"), dec!(100), dec!(1), now).unwrap();

        ledger.record_partial_sell(position.id(), dec!(100), dec!(2), dec!(100)).unwrap();
        assert!(ledger.open_position(&signal("a", "0x2"), dec!(100), dec!(1), now).is_err());

        let graduated = ledger.mark_graduated(position.id()).unwrap();
        assert_eq!(graduated.status(), PositionStatus::Graduated);
        assert!(ledger.open_position(&signal("a", "0x2"), dec!(100), dec!(1), now).is_ok());

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot.open_count(&AgentId::new("a")), 1);
        assert_eq!(snapshot.graduated_count(), 1);
        // Graduated positions still block a duplicate buy.
        assert!(ledger.holds(&AgentId::new("a"), &ContractAddress::new("0x1")));
    }

    #[test]
    fn invalid_transitions_are_rejected() {
        let ledger = ledger(5, 25);
        let now = Utc::now();
        let position = ledger.open_position(&signal("a", "0x1"), dec!(100), dec!(1), now).unwrap();

        assert!(matches!(
            ledger.mark_graduated(position.id()),
            Err(LedgerError::InvalidTransition { .. })
        ));

        ledger.record_partial_sell(position.id(), dec!(100), dec!(2), dec!(100)).unwrap();
        assert!(matches!(
            ledger.record_partial_sell(position.id(), dec!(100), dec!(2), dec!(100)),
            Err(LedgerError::InvalidTransition { .. })
        ));

        ledger.mark_graduated(position.id()).unwrap();
        assert!(matches!(
            ledger.close_position(position.id(), dec!(1), now),
            Err(LedgerError::InvalidTransition { .. })
        ));
        assert!(matches!(
            ledger.close_position(PositionId::new(99), dec!(1), now),
            Err(LedgerError::PositionNotFound(_))
        ));
    }

    #[test]
    fn closed_position_can_be_reopened() {
        let ledger = ledger(5, 25);
        let now = Utc::now();
        let first = ledger.open_position(&signal("a", "0x1"), dec!(100), dec!(1), now).unwrap();
        let closed = ledger.close_position(first.id(), dec!(0.49), now).unwrap();

        assert_eq!(closed.status(), PositionStatus::Closed);
        assert_eq!(closed.realized_pnl(), dec!(-51));
        assert_eq!(ledger.balance(), dec!(9949));

        let second = ledger.open_position(&signal("a", "0x1"), dec!(100), dec!(1), now).unwrap();
        assert_ne!(first.id(), second.id());
        assert_ne!(first.trade_id(), second.trade_id());
    }

    #[test]
    fn reservations_hold_capacity_until_released() {
        let ledger = ledger(1, 25);
        let agent = AgentId::new("a");
        let reservation = ledger
            .reserve(&agent, &ContractAddress::new("0x1"), dec!(100))
            .unwrap();

        assert!(ledger
            .reserve(&agent, &ContractAddress::new("0x2"), dec!(100))
            .is_err());
        assert!(ledger.snapshot().agent_at_cap(&agent));

        ledger.release(reservation);
        assert!(ledger
            .reserve(&agent, &ContractAddress::new("0x2"), dec!(100))
            .is_ok());
    }

    #[test]
    fn commit_turns_reservation_into_position() {
        let ledger = ledger(5, 25);
        let sig = signal("a", "0x1");
        let reservation = ledger.reserve(&sig.agent, &sig.contract, dec!(100)).unwrap();

        assert!(matches!(
            ledger.reserve(&sig.agent, &sig.contract, dec!(100)),
            Err(LedgerError::DuplicatePosition { .. })
        ));

        let position = ledger
            .commit(reservation, &sig, fill(dec!(0.5), dec!(99), dec!(198)), Some(0.8), Utc::now())
            .unwrap();
        assert_eq!(position.quantity(), dec!(198));
        assert_eq!(position.confidence(), Some(0.8));
        assert_eq!(ledger.balance(), dec!(9901));
        assert!(ledger.snapshot().reserved.is_empty());
    }

    #[test]
    fn commit_keeps_the_delivered_quantity() {
        let ledger = ledger(5, 25);
        let sig = signal("a", "0x1");
        let reservation = ledger.reserve(&sig.agent, &sig.contract, dec!(100)).unwrap();

        // A transfer fee delivered 97 tokens for 100 quoted.
        let position = ledger
            .commit(reservation, &sig, fill(dec!(1), dec!(100), dec!(97)), None, Utc::now())
            .unwrap();
        assert_eq!(position.quantity(), dec!(97));
        assert_eq!(ledger.balance(), dec!(9900));
    }

    #[test]
    fn empty_fill_is_refused_and_frees_the_slot() {
        let ledger = ledger(1, 25);
        let sig = signal("a", "0x1");
        let reservation = ledger.reserve(&sig.agent, &sig.contract, dec!(100)).unwrap();

        assert!(ledger
            .commit(reservation, &sig, fill(dec!(1), dec!(100), dec!(0)), None, Utc::now())
            .is_err());
        assert!(ledger.snapshot().reserved.is_empty());
        assert!(ledger.open_position(&sig, dec!(100), dec!(1), Utc::now()).is_ok());
    }

    #[test]
    fn partial_sell_credits_confirmed_proceeds() {
        let ledger = ledger(5, 25);
        let position = ledger
            .open_position(&signal("a", "0x1"), dec!(100), dec!(1), Utc::now())
            .unwrap();

        let updated = ledger
            .record_partial_sell(position.id(), dec!(100), dec!(2), dec!(96.5))
            .unwrap();

        assert_eq!(ledger.balance(), dec!(9996.5));
        assert_eq!(updated.quantity(), dec!(50));
        assert!(updated.capital_recovered());
    }

    #[test]
    fn trade_ids_are_unique_within_the_same_instant() {
        let ledger = ledger(5, 25);
        let now = Utc::now();
        let a = ledger.open_position(&signal("a", "0x1"), dec!(100), dec!(1), now).unwrap();
        let b = ledger.open_position(&signal("a", "0x2"), dec!(100), dec!(1), now).unwrap();
        assert!(a.trade_id().starts_with('T'));
        assert_eq!(a.trade_id().len(), 21);
        assert!(b.trade_id() > a.trade_id());
    }

    #[test]
    fn invariant_violation_halts_ledger() {
        let ledger = ledger(5, 25);
        let now = Utc::now();
        let existing = ledger.open_position(&signal("a", "0x1"), dec!(100), dec!(1), now).unwrap();

        // Simulate a logic defect that slipped a duplicate past the checks.
        let duplicate = Position::open(
            PositionId::new(42),
            "T-dup",
            &signal("a", "0x1"),
            dec!(1),
            dec!(100),
            now,
        )
        .unwrap();
        ledger.insert_unchecked(duplicate);

        let result = ledger.touch(existing.id(), now);
        assert!(matches!(result, Err(LedgerError::InvariantViolation(_))));
        assert!(ledger.halted().is_some());
        assert_eq!(
            ledger.open_position(&signal("b", "0x2"), dec!(100), dec!(1), now),
            Err(LedgerError::Halted)
        );
        assert!(ledger.snapshot().halted);
    }
}
