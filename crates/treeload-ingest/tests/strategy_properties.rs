use proptest::prelude::*;
use std::collections::BTreeSet;

use treeload_ingest::render::merge;
use treeload_ingest::{BatchAssembler, BatchBound, Strategy as Ingest};
use treeload_model::synthetic::XorShift64;
use treeload_model::{synthesize, Batch, Case, Command, Entity, EntityKind, EntityTree};
use treeload_store::{GraphStore, MemoryGraph, StoreSession};

fn tree_strategy() -> impl Strategy<Value = EntityTree> {
    (1usize..40, 0usize..120, any::<u64>()).prop_map(|(dirs, files, seed)| {
        let case = Case {
            name: "case_prop",
            node_count: dirs + files,
            dir_count: dirs,
            file_count: files,
        };
        synthesize(&case, seed).unwrap()
    })
}

fn ingest<'a>(
    store: &mut MemoryGraph,
    batches: impl Iterator<Item = treeload_ingest::Result<Batch<'a>>>,
) {
    let mut session = store.open_session().unwrap();
    for batch in batches {
        session.execute(&batch.unwrap()).unwrap();
    }
}

fn fresh(strategy: Ingest) -> MemoryGraph {
    let mut store = MemoryGraph::new();
    if strategy.requires_constraints() {
        store.ensure_constraints(&EntityKind::ALL).unwrap();
    }
    store
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_every_strategy_loads_a_tree(tree in tree_strategy(), target in 1usize..64) {
        let n = tree.len();
        for strategy in Ingest::ALL {
            let mut store = fresh(strategy);
            ingest(&mut store, strategy.render(&tree, BatchBound::soft(target)));
            let census = store.census();
            prop_assert_eq!(census.directories + census.files, n, "{}", strategy);
            prop_assert_eq!(census.edges, n - 1, "{}", strategy);
            prop_assert_eq!(census.roots, 1, "{}", strategy);
            prop_assert_eq!(census.stubs, 0, "{}", strategy);
            prop_assert_eq!(store.count_by_kind().unwrap(), tree.count());
        }
    }

    #[test]
    fn prop_batch_size_does_not_change_the_graph(
        tree in tree_strategy(),
        small in 1usize..8,
        large in 8usize..500,
    ) {
        for strategy in [Ingest::Bounded, Ingest::Merge, Ingest::Bulk] {
            let mut a = fresh(strategy);
            let mut b = fresh(strategy);
            ingest(&mut a, strategy.render(&tree, BatchBound::soft(small)));
            ingest(&mut b, strategy.render(&tree, BatchBound::soft(large)));
            prop_assert_eq!(a.census(), b.census());
            prop_assert_eq!(a.edge_endpoints(), b.edge_endpoints());
        }
    }

    #[test]
    fn prop_assembler_never_splits_a_group(
        sizes in prop::collection::vec(1usize..12, 0..60),
        target in 1usize..40,
        slack in 0usize..20,
    ) {
        let entities: Vec<Entity> = sizes
            .iter()
            .enumerate()
            .map(|(i, _)| leaf(i as u64 + 2))
            .collect();
        let groups: Vec<Vec<Command<'_>>> = entities
            .iter()
            .zip(&sizes)
            .map(|(e, &size)| {
                let mut group = vec![Command::UpsertEntity(e)];
                let stub = Command::MergeParentStub(treeload_model::EntityKey::directory(1));
                group.resize(size, stub);
                group
            })
            .collect();
        let ceiling = sizes.iter().copied().max().unwrap_or(1) + slack;
        let bound = BatchBound::soft(target).with_ceiling(ceiling);

        let batches: Vec<Batch<'_>> = BatchAssembler::new(groups.clone().into_iter(), bound)
            .collect::<Result<_, _>>()
            .unwrap();

        let original: Vec<Command<'_>> = groups.iter().flatten().cloned().collect();
        let joined: Vec<Command<'_>> = batches.iter().flat_map(|b| b.commands.clone()).collect();
        prop_assert_eq!(joined, original);

        let mut boundaries = BTreeSet::new();
        let mut offset = 0;
        for size in &sizes {
            boundaries.insert(offset);
            offset += size;
        }
        let mut start = 0;
        for batch in &batches {
            prop_assert!(!batch.is_empty());
            prop_assert!(boundaries.contains(&start));
            prop_assert!(batch.lines() <= ceiling);
            prop_assert!(batch.lines() < target + ceiling);
            start += batch.lines();
        }
    }

    #[test]
    fn prop_merge_is_idempotent(tree in tree_strategy(), target in 1usize..64) {
        let mut store = fresh(Ingest::Merge);
        ingest(&mut store, merge::render(&tree, BatchBound::soft(target)));
        let once = (store.census(), store.edge_endpoints());
        ingest(&mut store, merge::render(&tree, BatchBound::soft(target)));
        prop_assert_eq!((store.census(), store.edge_endpoints()), once);
    }

    #[test]
    fn prop_merge_is_order_independent(
        tree in tree_strategy(),
        seed in any::<u64>(),
        target in 1usize..64,
    ) {
        // A partial record of every directory arrives first. Full records
        // follow, children before parents, then shuffled.
        let mut deliveries: Vec<&Entity> = tree.iter().collect();
        deliveries.reverse();
        let mut rng = XorShift64::new(seed);
        for i in (1..deliveries.len()).rev() {
            let j = rng.gen_range_usize(i + 1);
            deliveries.swap(i, j);
        }
        let partial: Vec<Entity> = tree
            .subtrees()
            .map(|d| Entity { size: 0, path: String::new(), ..d.me.clone() })
            .collect();
        let ordered: Vec<&Entity> = partial.iter().chain(deliveries).collect();

        let mut store = fresh(Ingest::Merge);
        ingest(&mut store, merge::render_deliveries(ordered, BatchBound::soft(target)));

        let n = tree.len();
        let census = store.census();
        prop_assert_eq!(census.edges, n - 1);
        prop_assert_eq!(census.stubs, 0);
        prop_assert_eq!(census.roots, 1);
        prop_assert_eq!(store.count_by_kind().unwrap(), tree.count());
        for dir in tree.subtrees() {
            let view = store.node(dir.me.key()).unwrap();
            prop_assert_eq!(
                view.properties.get("path"),
                Some(&treeload_store::PropertyValue::Str(dir.me.path.clone()))
            );
        }
    }
}

fn leaf(id: u64) -> Entity {
    Entity {
        id,
        parent_id: Some(1),
        kind: EntityKind::File,
        name: format!("f{id}"),
        stem: format!("f{id}"),
        extension: String::new(),
        path: format!("/f{id}"),
        size: 0,
        owner: 0,
        group: 0,
        created: 0,
        accessed: 0,
        modified: 0,
    }
}
