//! Tests for the chunk planner.

use rstest::rstest;
use slurm_array::{chunk_bounds, plan_chunks};

#[rstest]
#[case(10, 2, 1, 5, 2)] // even split across two nodes
#[case(10, 3, 1, 4, 3)] // rounding up leaves a short last chunk
#[case(3, 4, 8, 8, 1)] // small input pinned to one node's capacity
#[case(16, 4, 2, 4, 4)] // exactly at the threshold: even split
#[case(7, 4, 2, 2, 4)] // below threshold: chunk = capacity
#[case(100, 10, 5, 10, 10)]
#[case(0, 4, 8, 8, 1)] // degenerate: zero items still one task
#[case(1, 4, 8, 8, 1)] // degenerate: one item still one task
fn test_plan_cases(
    #[case] item_count: usize,
    #[case] nodes: usize,
    #[case] capacity: usize,
    #[case] expected_chunk: usize,
    #[case] expected_tasks: usize,
) {
    let plan = plan_chunks(item_count, nodes, capacity);
    assert_eq!(plan.chunk_size, expected_chunk);
    assert_eq!(plan.task_count, expected_tasks);
}

#[rstest]
fn test_task_count_is_minimal_cover() {
    for item_count in 0..200usize {
        for nodes in 1..6 {
            for capacity in 1..5 {
                let plan = plan_chunks(item_count, nodes, capacity);
                assert!(plan.task_count >= 1);
                // task_count chunks of chunk_size cover the items...
                assert!(plan.task_count * plan.chunk_size >= item_count);
                // ...and no smaller number of chunks would.
                if item_count > 0 {
                    assert!((plan.task_count - 1) * plan.chunk_size < item_count);
                }
                // Never more tasks than requested once the input fills the
                // requested spread.
                if item_count >= capacity * nodes {
                    assert!(plan.task_count <= nodes);
                }
            }
        }
    }
}

#[rstest]
fn test_chunks_partition_exactly() {
    for item_count in [0usize, 1, 9, 10, 11, 57] {
        let plan = plan_chunks(item_count, 3, 2);
        let mut reassembled = Vec::new();
        for index in 0..plan.task_count {
            let (start, end) = chunk_bounds(index, plan.chunk_size, item_count);
            reassembled.extend(start..end);
        }
        assert_eq!(reassembled, (0..item_count).collect::<Vec<_>>());
    }
}

#[rstest]
fn test_bounds_past_data_are_empty() {
    let (start, end) = chunk_bounds(5, 4, 10);
    assert_eq!(start, end);
}
