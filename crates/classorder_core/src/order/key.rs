//! Order key allocation.
//!
//! # Responsibility
//! - Define the comparable key that orders one scope.
//! - Allocate a key between two neighbors or past an open end.
//! - Produce evenly respaced keys for scope rebalance.
//!
//! # Invariants
//! - `allocate` returns a key strictly inside the requested bounds, or
//!   `KeySpaceExhausted`; it never returns a bound itself.
//! - Rebalanced keys are strictly ascending and `KEY_STEP` apart.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Gap between freshly spaced keys.
pub const KEY_STEP: i64 = 1 << 16;

/// Key handed out when a scope is empty.
pub const INITIAL_KEY: OrderKey = OrderKey(0);

/// Position of one entity inside its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderKey(i64);

impl OrderKey {
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    pub const fn value(self) -> i64 {
        self.0
    }
}

impl Display for OrderKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// No representable key lies inside the requested bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpaceExhausted {
    pub before: Option<OrderKey>,
    pub after: Option<OrderKey>,
}

impl Display for KeySpaceExhausted {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let bound = |key: Option<OrderKey>| key.map_or_else(|| "open".to_string(), |k| k.to_string());
        write!(
            f,
            "order key space exhausted between {} and {}",
            bound(self.before),
            bound(self.after)
        )
    }
}

impl Error for KeySpaceExhausted {}

/// Allocates a key strictly between `before` and `after`.
///
/// `None` on either side means that end of the scope is open.
///
/// # Errors
/// - `KeySpaceExhausted` when the neighbors are adjacent integers, when they
///   are out of order, or when an open end has reached the integer bound.
pub fn allocate(
    before: Option<OrderKey>,
    after: Option<OrderKey>,
) -> Result<OrderKey, KeySpaceExhausted> {
    let exhausted = KeySpaceExhausted { before, after };
    match (before, after) {
        (None, None) => Ok(INITIAL_KEY),
        (None, Some(after)) => match after.0.checked_sub(KEY_STEP) {
            Some(value) => Ok(OrderKey(value)),
            None => midpoint(i64::MIN, after.0).ok_or(exhausted),
        },
        (Some(before), None) => match before.0.checked_add(KEY_STEP) {
            Some(value) => Ok(OrderKey(value)),
            None => midpoint(before.0, i64::MAX).ok_or(exhausted),
        },
        (Some(before), Some(after)) => midpoint(before.0, after.0).ok_or(exhausted),
    }
}

/// Returns `count` ascending keys spaced `KEY_STEP` apart, starting at
/// `INITIAL_KEY`.
///
/// Scopes too large for `KEY_STEP` spacing are spread evenly over the
/// non-negative range instead.
pub fn rebalance_keys(count: usize) -> Vec<OrderKey> {
    let step = rebalance_step(count);
    (0..count)
        .map_while(|index| i64::try_from(index).ok()?.checked_mul(step))
        .map(|offset| OrderKey(INITIAL_KEY.0 + offset))
        .collect()
}

fn rebalance_step(count: usize) -> i64 {
    let last_index = i64::try_from(count.saturating_sub(1)).unwrap_or(i64::MAX);
    if last_index == 0 {
        return KEY_STEP;
    }
    KEY_STEP.min((i64::MAX - INITIAL_KEY.0) / last_index).max(1)
}

fn midpoint(low: i64, high: i64) -> Option<OrderKey> {
    let (low, high) = (i128::from(low), i128::from(high));
    if high - low < 2 {
        return None;
    }
    let mid = low + (high - low) / 2;
    i64::try_from(mid).ok().map(OrderKey)
}

#[cfg(test)]
mod tests {
    use super::{allocate, rebalance_keys, rebalance_step, OrderKey, INITIAL_KEY, KEY_STEP};

    #[test]
    fn empty_scope_gets_initial_key() {
        assert_eq!(allocate(None, None).unwrap(), INITIAL_KEY);
    }

    #[test]
    fn open_ends_step_away_from_the_neighbor() {
        let key = OrderKey::new(10);
        assert_eq!(allocate(None, Some(key)).unwrap().value(), 10 - KEY_STEP);
        assert_eq!(allocate(Some(key), None).unwrap().value(), 10 + KEY_STEP);
    }

    #[test]
    fn open_end_near_the_bound_falls_back_to_midpoint() {
        let near_max = OrderKey::new(i64::MAX - 10);
        let key = allocate(Some(near_max), None).unwrap();
        assert!(key > near_max);

        let at_max = OrderKey::new(i64::MAX);
        assert!(allocate(Some(at_max), None).is_err());
        let at_min = OrderKey::new(i64::MIN);
        assert!(allocate(None, Some(at_min)).is_err());
    }

    #[test]
    fn between_returns_strict_midpoint() {
        let key = allocate(Some(OrderKey::new(0)), Some(OrderKey::new(10))).unwrap();
        assert_eq!(key.value(), 5);

        let wide = allocate(Some(OrderKey::new(i64::MIN)), Some(OrderKey::new(i64::MAX))).unwrap();
        assert!(wide > OrderKey::new(i64::MIN) && wide < OrderKey::new(i64::MAX));
    }

    #[test]
    fn adjacent_or_inverted_keys_are_exhausted() {
        let err = allocate(Some(OrderKey::new(4)), Some(OrderKey::new(5))).unwrap_err();
        assert_eq!(err.before, Some(OrderKey::new(4)));
        assert!(allocate(Some(OrderKey::new(5)), Some(OrderKey::new(5))).is_err());
        assert!(allocate(Some(OrderKey::new(9)), Some(OrderKey::new(5))).is_err());
    }

    #[test]
    fn repeated_insertion_between_same_pair_eventually_exhausts() {
        let low = OrderKey::new(0);
        let mut high = OrderKey::new(KEY_STEP);
        let mut rounds = 0;
        while let Ok(key) = allocate(Some(low), Some(high)) {
            assert!(low < key && key < high);
            high = key;
            rounds += 1;
        }
        assert_eq!(rounds, 16);
    }

    #[test]
    fn rebalance_keys_are_evenly_spaced() {
        let keys = rebalance_keys(4);
        assert_eq!(
            keys.iter().map(|key| key.value()).collect::<Vec<_>>(),
            vec![0, KEY_STEP, 2 * KEY_STEP, 3 * KEY_STEP]
        );
        assert!(rebalance_keys(0).is_empty());
    }

    #[test]
    fn rebalance_step_narrows_instead_of_overflowing() {
        assert_eq!(rebalance_step(1), KEY_STEP);
        assert_eq!(rebalance_step(1_000), KEY_STEP);

        for count in [usize::MAX, usize::MAX / 2] {
            let step = rebalance_step(count);
            let last_index = i64::try_from(count - 1).unwrap_or(i64::MAX);
            assert!(step >= 1 && step <= KEY_STEP);
            assert!(last_index.checked_mul(step).is_some());
        }
    }
}
