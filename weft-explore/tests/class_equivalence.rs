use std::collections::BTreeSet;

use weft_core::{EventId, ExecutionGraph};
use weft_explore::canonical::ClassTree;
use weft_explore::enumerate::DfsEnumerator;

/// Two chains a0 -> a1 and b0 -> b1 with conflicts a0 ~ b0 and a1 ~ b1.
fn crossed_chains() -> ExecutionGraph {
    let mut g = ExecutionGraph::new();
    let e: Vec<_> = (0..4).map(|_| g.new_event()).collect();
    g.add_program_order(e[0], e[1]);
    g.add_program_order(e[2], e[3]);
    g.add_conflict(e[0], e[2]);
    g.add_conflict(e[1], e[3]);
    g
}

fn classes_of_all_orders(g: &ExecutionGraph) -> (ClassTree, BTreeSet<Vec<EventId>>) {
    let mut tree = ClassTree::new();
    let mut representatives = BTreeSet::new();
    for order in DfsEnumerator::unpruned(g).schedules() {
        let class = tree.add_path(g, &order);
        if tree.min_hit(class) == 1 {
            representatives.insert(order);
        }
    }
    (tree, representatives)
}

#[test]
fn unpruned_classification_agrees_with_pruned_enumeration() {
    let g = crossed_chains();

    let pruned: Vec<_> = DfsEnumerator::new(&g).schedules().collect();
    let (tree, _) = classes_of_all_orders(&g);

    assert_eq!(tree.size(tree.root()), pruned.len() as u64);

    // Each pruned schedule must land in a distinct class.
    let mut check = ClassTree::new();
    let mut seen = BTreeSet::new();
    for order in &pruned {
        assert!(seen.insert(check.add_path(&g, order)));
    }
}

#[test]
fn every_order_of_a_class_reduces_to_the_same_representative() {
    let g = crossed_chains();
    let (mut tree, representatives) = classes_of_all_orders(&g);

    // Feeding each representative back in hits its own class and creates
    // nothing new.
    let nodes = tree.len();
    for rep in &representatives {
        tree.add_path(&g, rep);
    }
    assert_eq!(tree.len(), nodes);
}

#[test]
fn crossed_chains_split_into_four_classes() {
    // By hand: of the six interleavings, two pairs commute on an (a, b)
    // swap away from each conflict and two orders stand alone.
    let g = crossed_chains();
    let (tree, representatives) = classes_of_all_orders(&g);
    assert_eq!(tree.size(tree.root()), 4);
    assert_eq!(representatives.len(), 4);
    // The singleton classes keep the root's minimum hit count at one.
    assert_eq!(tree.min_hit(tree.root()), 1);
}

#[test]
fn conflict_free_orders_form_a_single_class() {
    let mut g = ExecutionGraph::new();
    let e: Vec<_> = (0..4).map(|_| g.new_event()).collect();
    g.add_program_order(e[0], e[1]);
    g.add_program_order(e[2], e[3]);

    let (tree, representatives) = classes_of_all_orders(&g);
    assert_eq!(tree.size(tree.root()), 1);
    assert_eq!(representatives.len(), 1);
    assert_eq!(tree.min_hit(tree.root()), 6);
}

#[test]
fn pairwise_conflicts_keep_every_order_apart() {
    let mut g = ExecutionGraph::new();
    let e: Vec<_> = (0..3).map(|_| g.new_event()).collect();
    g.add_conflict(e[0], e[1]);
    g.add_conflict(e[0], e[2]);
    g.add_conflict(e[1], e[2]);

    let (tree, representatives) = classes_of_all_orders(&g);
    assert_eq!(tree.size(tree.root()), 6);
    assert_eq!(representatives.len(), 6);
    assert_eq!(tree.min_hit(tree.root()), 1);
}

#[test]
fn partially_conflicting_chains_split_along_the_conflict() {
    let mut g = ExecutionGraph::new();
    let e: Vec<_> = (0..4).map(|_| g.new_event()).collect();
    g.add_program_order(e[0], e[1]);
    g.add_program_order(e[2], e[3]);
    g.add_conflict(e[0], e[2]);

    // One conflict, two resolutions, everything else commutes.
    let (tree, _) = classes_of_all_orders(&g);
    assert_eq!(tree.size(tree.root()), 2);
}
