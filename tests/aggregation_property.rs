//! Property: a parent's aggregated result depends only on the multiset of
//! child outcomes, never on the order the children completed in.

use proptest::prelude::*;

use slipway::application::{aggregate, ChildOutcome};
use slipway::domain::models::{ActionResult, ResultDetail};

fn child_strategy() -> impl Strategy<Value = ChildOutcome> {
    (
        0..5u8,
        proptest::collection::vec("[a-z][a-z0-9]{0,5}", 0..3),
        proptest::collection::vec("[a-z ]{1,12}", 0..2),
    )
        .prop_map(|(kind, nodes, messages)| {
            let (finished, result) = match kind {
                0 => (true, ActionResult::Success),
                1 => (true, ActionResult::PartialSuccess),
                2 => (true, ActionResult::Failure),
                3 => (true, ActionResult::DependentFailure),
                _ => (false, ActionResult::Incomplete),
            };
            let mut detail = ResultDetail::default();
            for msg in messages {
                detail.message(msg);
            }
            if result == ActionResult::PartialSuccess {
                // Partial children publish a split breakdown
                let half = nodes.len() / 2;
                for node in &nodes[..half] {
                    detail.node_succeeded(node);
                }
                for node in &nodes[half..] {
                    detail.node_failed(node);
                }
            }
            ChildOutcome {
                finished,
                result,
                detail,
                node_list: nodes,
            }
        })
}

fn sorted(mut nodes: Vec<String>) -> Vec<String> {
    nodes.sort();
    nodes
}

proptest! {
    #[test]
    fn parent_result_is_order_insensitive(
        (original, shuffled) in proptest::collection::vec(child_strategy(), 0..8)
            .prop_flat_map(|children| {
                let original = children.clone();
                (Just(original), Just(children).prop_shuffle())
            })
    ) {
        let (result_a, detail_a) = aggregate(&original);
        let (result_b, detail_b) = aggregate(&shuffled);

        prop_assert_eq!(result_a, result_b);
        prop_assert_eq!(
            sorted(detail_a.successful_nodes),
            sorted(detail_b.successful_nodes)
        );
        prop_assert_eq!(sorted(detail_a.failed_nodes), sorted(detail_b.failed_nodes));
        prop_assert_eq!(detail_a.detail, detail_b.detail);
    }

    #[test]
    fn result_classification_matches_flags(
        children in proptest::collection::vec(child_strategy(), 0..8)
    ) {
        let (result, _) = aggregate(&children);

        let unfinished = children.iter().any(|c| !c.finished);
        let worked = children.iter().filter(|c| c.finished).any(|c| c.result.worked());
        let failed = children.iter().filter(|c| c.finished).any(|c| c.result.failed());

        let expected = if unfinished {
            ActionResult::DependentFailure
        } else if worked && failed {
            ActionResult::PartialSuccess
        } else if worked {
            ActionResult::Success
        } else {
            ActionResult::Failure
        };
        prop_assert_eq!(result, expected);
    }
}
