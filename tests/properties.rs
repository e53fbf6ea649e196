//! Property tests for ordering and snapshot replacement.

use proptest::prelude::*;
use task_sync::{sort_newest_first, Generation, LocalStateCache, Task, Timestamp};

fn task(id: usize, created_millis: i64) -> Task {
    Task {
        id: format!("t{}", id),
        title: format!("Task {}", id),
        description: String::new(),
        created_at: Timestamp::from_millis(created_millis),
        updated_at: Timestamp::from_millis(created_millis),
        owner_id: "u1".to_string(),
    }
}

fn tasks_from(created: &[i64]) -> Vec<Task> {
    created
        .iter()
        .enumerate()
        .map(|(i, c)| task(i, *c))
        .collect()
}

proptest! {
    #[test]
    fn prop_degraded_sort_is_descending_permutation(created in prop::collection::vec(0i64..1_000, 0..50)) {
        let input = tasks_from(&created);
        let mut sorted = input.clone();
        sort_newest_first(&mut sorted);

        prop_assert_eq!(sorted.len(), input.len());
        for pair in sorted.windows(2) {
            prop_assert!(pair[0].created_at.as_millis() >= pair[1].created_at.as_millis());
        }

        let mut a: Vec<&str> = input.iter().map(|t| t.id.as_str()).collect();
        let mut b: Vec<&str> = sorted.iter().map(|t| t.id.as_str()).collect();
        a.sort_unstable();
        b.sort_unstable();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn prop_last_snapshot_wins(snapshots in prop::collection::vec(prop::collection::vec(0i64..100, 0..20), 1..10)) {
        let cache = LocalStateCache::new(4);
        cache.activate(Generation(1));

        for created in &snapshots {
            prop_assert!(cache.apply_snapshot(Generation(1), tasks_from(created)));
        }

        let last = tasks_from(snapshots.last().unwrap());
        prop_assert_eq!(cache.tasks(), last);
        prop_assert!(!cache.loading());
    }

    #[test]
    fn prop_stale_generations_never_apply(current in 2u64..50, stale_offset in 1u64..50, created in prop::collection::vec(0i64..100, 1..10)) {
        let cache = LocalStateCache::new(4);
        cache.activate(Generation(current));
        let before = cache.state();

        let stale = Generation(current.saturating_sub(stale_offset));
        prop_assume!(stale != Generation(current));
        prop_assert!(!cache.apply_snapshot(stale, tasks_from(&created)));
        prop_assert!(!cache.apply_error(stale, "stale", true));
        prop_assert_eq!(cache.state(), before);
    }
}

#[test]
fn test_degraded_sort_reference_case() {
    // createdAt [10, missing, 5] with missing decoded as zero.
    let mut tasks = vec![task(0, 10), task(1, 0), task(2, 5)];
    sort_newest_first(&mut tasks);

    let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["t0", "t2", "t1"]);
}
