//! Primary/degraded mode state machine.

use crate::types::Task;
use std::fmt;

/// Subscription mode within one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Ordered query active; the store's order is used as-is.
    Primary,
    /// Unordered query active; records are sorted locally.
    Degraded,
    /// Both queries failed. Terminal until the next session.
    Failed,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Primary => write!(f, "primary"),
            Mode::Degraded => write!(f, "degraded"),
            Mode::Failed => write!(f, "failed"),
        }
    }
}

/// Tracks the mode of one subscription session.
///
/// A session starts in `Primary`. The ordered query failing moves it to
/// `Degraded`; the unordered query failing moves it to `Failed`. There is no
/// way back within a session.
#[derive(Debug)]
pub struct FallbackController {
    mode: Mode,
}

impl FallbackController {
    pub fn new() -> Self {
        Self {
            mode: Mode::Primary,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The ordered query failed. Returns true if the session should now open
    /// the unordered query.
    pub fn on_primary_error(&mut self) -> bool {
        if self.mode != Mode::Primary {
            return false;
        }
        self.mode = Mode::Degraded;
        true
    }

    /// The unordered query failed. Returns true if this ended the session.
    pub fn on_fallback_error(&mut self) -> bool {
        if self.mode != Mode::Degraded {
            return false;
        }
        self.mode = Mode::Failed;
        true
    }

    /// Put snapshot records in display order for the current mode.
    pub fn order(&self, mut tasks: Vec<Task>) -> Vec<Task> {
        if self.mode == Mode::Degraded {
            sort_newest_first(&mut tasks);
        }
        tasks
    }
}

impl Default for FallbackController {
    fn default() -> Self {
        Self::new()
    }
}

/// Descending by creation time at millisecond precision. Tasks decoded
/// without a creation time carry zero and so sort last. Ties, including
/// times within the same millisecond, keep delivery order.
pub fn sort_newest_first(tasks: &mut [Task]) {
    tasks.sort_by_key(|t| std::cmp::Reverse(t.created_at.as_millis()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;

    fn task(id: &str, created_millis: i64) -> Task {
        task_at(id, Timestamp::from_millis(created_millis))
    }

    fn task_at(id: &str, created_at: Timestamp) -> Task {
        Task {
            id: id.to_string(),
            title: id.to_string(),
            description: String::new(),
            created_at,
            updated_at: created_at,
            owner_id: "u1".to_string(),
        }
    }

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|t| t.id.as_str()).collect()
    }

    #[test]
    fn test_transitions() {
        let mut controller = FallbackController::new();
        assert_eq!(controller.mode(), Mode::Primary);

        assert!(!controller.on_fallback_error());
        assert!(controller.on_primary_error());
        assert!(!controller.on_primary_error());
        assert_eq!(controller.mode(), Mode::Degraded);

        assert!(controller.on_fallback_error());
        assert_eq!(controller.mode(), Mode::Failed);
        assert!(!controller.on_primary_error());
    }

    #[test]
    fn test_primary_keeps_store_order() {
        let controller = FallbackController::new();
        let ordered = controller.order(vec![task("a", 1), task("b", 5)]);
        assert_eq!(ids(&ordered), vec!["a", "b"]);
    }

    #[test]
    fn test_degraded_sorts_missing_last() {
        let mut controller = FallbackController::new();
        controller.on_primary_error();

        // 10, missing (zero), 5
        let ordered = controller.order(vec![task("ten", 10), task("missing", 0), task("five", 5)]);
        assert_eq!(ids(&ordered), vec!["ten", "five", "missing"]);
    }

    #[test]
    fn test_sort_is_stable_on_ties() {
        let mut tasks = vec![task("x", 3), task("y", 3), task("z", 0), task("w", 0)];
        sort_newest_first(&mut tasks);
        assert_eq!(ids(&tasks), vec!["x", "y", "z", "w"]);
    }

    #[test]
    fn test_sort_ignores_sub_millisecond_differences() {
        let mut tasks = vec![
            task_at("early", Timestamp(1_000_100)),
            task_at("late", Timestamp(1_000_900)),
            task_at("newer", Timestamp(1_001_000)),
        ];
        sort_newest_first(&mut tasks);
        assert_eq!(ids(&tasks), vec!["newer", "early", "late"]);
    }
}
