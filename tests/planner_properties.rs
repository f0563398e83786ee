use pairwise_farm::block::{Block, BlockPlan};
use pairwise_farm::farm_error::FarmError;
use pairwise_farm::tasks::TaskQueue;
use proptest::prelude::*;

/// Arbitrary (possibly degenerate) block inside an `n × n` table.
fn block_in(n: usize) -> impl Strategy<Value = Block> {
    (0..=n, 0..=n, 0..=n, 0..=n, any::<bool>()).prop_map(move |(r0, r1, c0, c1, tri)| {
        let (rb, re) = (r0.min(r1), r0.max(r1));
        let (cb, ce) = (c0.min(c1), c0.max(c1));
        // a zero end means "to the last sequence"; keep explicit ends non-zero
        let (re, ce) = (re.max(1), ce.max(1));
        if tri {
            Block::triangular(rb..re, cb..ce)
        } else {
            Block::rectangular(rb..re, cb..ce)
        }
    })
}

fn table_and_block() -> impl Strategy<Value = (usize, Block)> {
    (1usize..24).prop_flat_map(|n| (Just(n), block_in(n)))
}

proptest! {
    #[test]
    fn index_is_a_bijection((n, block) in table_and_block()) {
        let plan = BlockPlan::new(n, n, block).unwrap();
        let mut seen = vec![false; plan.len()];
        for (i, (r, c)) in plan.pairs().enumerate() {
            let idx = plan.flat_index(r, c).unwrap();
            prop_assert_eq!(idx, i, "pairs() must be in condensed order");
            prop_assert!(!seen[idx]);
            seen[idx] = true;
            prop_assert_eq!(plan.pair_at(idx), Some((r, c)));
            if plan.is_triangular() {
                prop_assert!(c > r);
            }
        }
        prop_assert!(seen.iter().all(|&s| s));
        prop_assert_eq!(plan.pair_at(plan.len()), None);
    }

    #[test]
    fn every_contained_pair_is_planned((n, block) in table_and_block()) {
        let plan = BlockPlan::new(n, n, block).unwrap();
        let b = *plan.block();
        let mut expected = 0usize;
        for r in 0..n {
            for c in 0..n {
                let inside = (b.row_begin..b.row_end).contains(&r)
                    && (b.col_begin..b.col_end).contains(&c)
                    && (!b.triangular || c > r);
                prop_assert_eq!(plan.flat_index(r, c).is_some(), inside);
                expected += inside as usize;
            }
        }
        prop_assert_eq!(plan.len(), expected);
    }

    #[test]
    fn planning_is_deterministic((n, block) in table_and_block()) {
        let a = BlockPlan::new(n, n, block).unwrap();
        let b = BlockPlan::new(n, n, block).unwrap();
        prop_assert_eq!(&a, &b);
        let qa = TaskQueue::from_plan(&a).unwrap();
        let qb = TaskQueue::from_plan(&b).unwrap();
        prop_assert!(qa.iter().eq(qb.iter()));
    }

    #[test]
    fn units_cover_the_queue_once(n in 1usize..30, batch in 1usize..9) {
        let plan = BlockPlan::new(n, n, Block::full()).unwrap();
        let mut q = TaskQueue::from_plan(&plan).unwrap();
        let mut next = 0;
        while let Some(unit) = q.next_unit(batch) {
            prop_assert_eq!(unit.start, next);
            prop_assert!(!unit.is_empty() && unit.len() <= batch);
            next = unit.end;
        }
        prop_assert_eq!(next, n * (n - 1) / 2);
    }
}

#[test]
fn full_triangle_of_six() {
    let plan = BlockPlan::new(6, 6, Block::full()).unwrap();
    assert_eq!(plan.len(), 15);
    assert_eq!(plan.flat_index(4, 5), Some(14));
    assert_eq!(plan.pair_at(5), Some((1, 2)));
}

#[test]
fn block_past_the_table_is_rejected() {
    let err = BlockPlan::new(4, 4, Block::triangular(0..5, 0..4)).unwrap_err();
    assert!(matches!(err, FarmError::InvalidBlock(_)));
}
