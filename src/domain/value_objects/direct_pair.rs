//! Unordered participant pair identifying a direct room.

use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// The two participants of a direct room, stored in canonical order so that
/// `(a, b)` and `(b, a)` produce the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectPair {
    low: i64,
    high: i64,
}

impl DirectPair {
    /// Build the canonical pair. A user cannot open a direct room with
    /// themselves.
    pub fn new(a: i64, b: i64) -> Result<Self, AppError> {
        if a == b {
            return Err(AppError::Validation(
                "Cannot open a direct room with yourself".into(),
            ));
        }
        Ok(Self {
            low: a.min(b),
            high: a.max(b),
        })
    }

    pub fn low(&self) -> i64 {
        self.low
    }

    pub fn high(&self) -> i64 {
        self.high
    }

    pub fn contains(&self, user_id: i64) -> bool {
        self.low == user_id || self.high == user_id
    }

    /// The participant that is not `user_id`, if `user_id` is in the pair.
    pub fn other(&self, user_id: i64) -> Option<i64> {
        if user_id == self.low {
            Some(self.high)
        } else if user_id == self.high {
            Some(self.low)
        } else {
            None
        }
    }

    pub fn members(&self) -> [i64; 2] {
        [self.low, self.high]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(1, 2 ; "ascending")]
    #[test_case(2, 1 ; "descending")]
    fn test_pair_is_unordered(a: i64, b: i64) {
        let pair = DirectPair::new(a, b).unwrap();
        assert_eq!(pair, DirectPair::new(1, 2).unwrap());
        assert_eq!(pair.low(), 1);
        assert_eq!(pair.high(), 2);
    }

    #[test]
    fn test_self_pair_rejected() {
        assert!(matches!(DirectPair::new(5, 5), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_other() {
        let pair = DirectPair::new(10, 20).unwrap();
        assert_eq!(pair.other(10), Some(20));
        assert_eq!(pair.other(20), Some(10));
        assert_eq!(pair.other(30), None);
    }
}
