use super::{Position, Status};

/// What a client may see about its own session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionView {
    pub status: Status,
    pub position: Position,
}

/// Head and tail positions of the waiting set.
///
/// Both are `0` when nobody is waiting. Rank and queue length are derived from
/// these on the caller side; they are never stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueBounds {
    pub first_waiting_position: Position,
    pub last_waiting_position: Position,
}

impl QueueBounds {
    /// Bounds of a waiting set spanning `first..=last`.
    pub fn new(first: Position, last: Position) -> Self {
        Self {
            first_waiting_position: first,
            last_waiting_position: last,
        }
    }

    /// 1-based rank of a waiting client: `position - first + 1`.
    ///
    /// Positions ahead of the head (already promoted) saturate to `1`.
    ///
    /// ## Example
    /// ```rust
    /// use waitvisor::{Position, QueueBounds};
    ///
    /// let bounds = QueueBounds::new(Position::new(5), Position::new(9));
    /// assert_eq!(bounds.rank(Position::new(7)), 3);
    /// assert_eq!(bounds.span(), 5);
    /// ```
    pub fn rank(&self, position: Position) -> u64 {
        position
            .get()
            .saturating_sub(self.first_waiting_position.get())
            .saturating_add(1)
    }

    /// Queue length as seen by a waiting client: `last - first + 1`.
    ///
    /// Gaps left by evicted clients are counted, so this is an upper bound on
    /// the number of waiting rows. Only meaningful while the queue is non-empty.
    pub fn span(&self) -> u64 {
        self.last_waiting_position
            .get()
            .saturating_sub(self.first_waiting_position.get())
            .saturating_add(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_waiter_is_rank_one_of_one() {
        let b = QueueBounds::new(Position::new(5), Position::new(5));
        assert_eq!(b.rank(Position::new(5)), 1);
        assert_eq!(b.span(), 1);
    }

    #[test]
    fn test_default_is_zero_zero() {
        let b = QueueBounds::default();
        assert_eq!(b.first_waiting_position, Position::new(0));
        assert_eq!(b.last_waiting_position, Position::new(0));
    }

    #[test]
    fn test_rank_saturates_before_head() {
        let b = QueueBounds::new(Position::new(10), Position::new(12));
        assert_eq!(b.rank(Position::new(3)), 1);
    }
}
