// =============================================================================
// Position Book — owns every open/closed simulated position
// =============================================================================
//
// Grounded directly on `position_engine.rs::PositionManager`: a
// `RwLock<Vec<Position>>` for open positions, plain linear scans (position
// counts stay small enough that this beats a concurrent map's overhead),
// and the same open/update_price/close shape. The teacher's TP1/TP2/
// trailing-stop exit ladder is replaced by the fixed five-reason order
// implemented in `exit.rs`; this module only owns state transitions.
// =============================================================================

use crate::types::{Position, PositionId, PositionStatus};
use parking_lot::RwLock;

pub struct PositionBook {
    open: RwLock<Vec<Position>>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self { open: RwLock::new(Vec::new()) }
    }

    /// v1 does not average into an existing position: at most one open
    /// position per token.
    pub fn has_open_for(&self, token_id: &crate::types::TokenId) -> bool {
        self.open.read().iter().any(|p| &p.token_id == token_id)
    }

    pub fn insert(&self, position: Position) {
        self.open.write().push(position);
    }

    pub fn get(&self, id: PositionId) -> Option<Position> {
        self.open.read().iter().find(|p| p.id == id).cloned()
    }

    /// Applies `f` to the single open position for `token_id`, if any.
    pub fn mutate_for_token<R>(&self, token_id: &crate::types::TokenId, f: impl FnOnce(&mut Position) -> R) -> Option<R> {
        let mut open = self.open.write();
        open.iter_mut().find(|p| &p.token_id == token_id).map(f)
    }

    pub fn mutate<R>(&self, id: PositionId, f: impl FnOnce(&mut Position) -> R) -> Option<R> {
        let mut open = self.open.write();
        open.iter_mut().find(|p| p.id == id).map(f)
    }

    pub fn mark_closing(&self, id: PositionId) -> bool {
        self.mutate(id, |p| p.status = PositionStatus::Closing).is_some()
    }

    pub fn remove(&self, id: PositionId) -> Option<Position> {
        let mut open = self.open.write();
        let idx = open.iter().position(|p| p.id == id)?;
        Some(open.remove(idx))
    }

    pub fn snapshot(&self) -> Vec<Position> {
        self.open.read().clone()
    }

    pub fn open_count(&self) -> usize {
        self.open.read().len()
    }
}

impl Default for PositionBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TokenId;
    use chrono::Utc;
    use uuid::Uuid;

    fn sample_position(token: &str) -> Position {
        Position {
            id: Uuid::new_v4(),
            token_id: TokenId::new(token).unwrap(),
            symbol: None,
            entry_price: 1.0,
            entry_quote: 5.0,
            opened_at: Utc::now(),
            status: PositionStatus::Open,
            current_price: Some(1.0),
            unrealized_pnl_quote: Some(0.0),
            return_pct: Some(0.0),
            stop_price: 0.85,
            take_profit_price: 1.5,
            max_hold_deadline: Utc::now() + chrono::Duration::hours(8),
            last_tick_wall_ms: None,
            price_spike: false,
        }
    }

    #[test]
    fn at_most_one_open_position_per_token() {
        let book = PositionBook::new();
        assert!(!book.has_open_for(&TokenId::new("T1").unwrap()));
        book.insert(sample_position("T1"));
        assert!(book.has_open_for(&TokenId::new("T1").unwrap()));
    }

    #[test]
    fn remove_returns_the_position_and_clears_it_from_the_book() {
        let book = PositionBook::new();
        let pos = sample_position("T2");
        let id = pos.id;
        book.insert(pos);
        let removed = book.remove(id).unwrap();
        assert_eq!(removed.id, id);
        assert_eq!(book.open_count(), 0);
    }

    #[test]
    fn mutate_for_token_updates_in_place() {
        let book = PositionBook::new();
        let token = TokenId::new("T3").unwrap();
        book.insert(sample_position("T3"));
        book.mutate_for_token(&token, |p| p.current_price = Some(1.25));
        assert_eq!(book.get(book.snapshot()[0].id).unwrap().current_price, Some(1.25));
    }
}
