//! End-to-end closure computation through the public API.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::json;
use tether_core::{
    CalcError, ContentNode, DependencyCalculator, DependencyClosure, DependencyCollector,
    DependencyEvent, DependencyStack, EntityStorage, EntityUuid, MemoryStorage, SqliteCache,
    StaticModuleRegistry, merge_dependencies,
};

/// Follows `refs: [[entity_type, id], …]` in raw node values.
struct RefCollector {
    invocations: Rc<Cell<usize>>,
}

impl DependencyCollector for RefCollector {
    fn on_calculate_dependencies(
        &self,
        calculator: &DependencyCalculator,
        stack: &mut DependencyStack,
        event: &mut DependencyEvent,
    ) -> Result<(), CalcError> {
        self.invocations.set(self.invocations.get() + 1);
        let tether_core::NodeValues::Raw(values) = &event.node().values else {
            return Ok(());
        };
        let Some(refs) = values.get("refs").and_then(|v| v.as_array()) else {
            return Ok(());
        };
        let refs: Vec<(String, String)> = refs
            .iter()
            .filter_map(|pair| {
                Some((
                    pair.get(0)?.as_str()?.to_string(),
                    pair.get(1)?.as_str()?.to_string(),
                ))
            })
            .collect();

        for (entity_type, id) in refs {
            let Some(target) = calculator.storage().load(&entity_type, &id) else {
                continue;
            };
            let target_uuid = target.uuid.clone().expect("fixture nodes carry uuids");
            let handle = match stack.get_dependency(&target_uuid) {
                Some(existing) => existing,
                None => calculator.wrap(&target)?,
            };
            let mut sub = DependencyClosure::default();
            calculator.calculate_into(&handle, stack, &mut sub)?;
            merge_dependencies(event.wrapper(), stack, &sub)?;
            event.add_dependency(&handle, stack)?;
        }
        Ok(())
    }
}

fn node(entity_type: &str, id: &str, uuid: &str, refs: &[(&str, &str)]) -> ContentNode {
    let refs: Vec<_> = refs.iter().map(|(t, i)| json!([t, i])).collect();
    ContentNode::raw(
        entity_type,
        id,
        Some(EntityUuid::new_unchecked(uuid)),
        json!({"id": id, "refs": refs}),
    )
}

fn calculator(
    nodes: Vec<ContentNode>,
) -> (Rc<MemoryStorage>, DependencyCalculator, Rc<Cell<usize>>) {
    let mut storage = MemoryStorage::new();
    for n in nodes {
        storage.insert(n);
    }
    let storage = Rc::new(storage);

    let mut registry = StaticModuleRegistry::default();
    registry.register("node", "node");
    registry.register("taxonomy_term", "taxonomy");
    registry.register("file", "file");

    let invocations = Rc::new(Cell::new(0));
    let calculator = DependencyCalculator::new(storage.clone(), Rc::new(registry))
        .with_collectors([Box::new(RefCollector {
            invocations: invocations.clone(),
        }) as Box<dyn DependencyCollector>]);
    (storage, calculator, invocations)
}

#[test]
fn chain_closure_has_expected_edges_children_and_modules() {
    // X (node) -> Y (taxonomy_term) -> Z (file)
    let (storage, calc, _) = calculator(vec![
        node("node", "1", "u1", &[("taxonomy_term", "7")]),
        node("taxonomy_term", "7", "u7", &[("file", "9")]),
        node("file", "9", "u9", &[]),
    ]);
    let mut stack = DependencyStack::in_memory();
    let root = calc
        .wrap(&storage.load("node", "1").expect("fixture"))
        .expect("wrap");

    let closure = calc
        .calculate_dependencies(&root, &mut stack)
        .expect("calculate");

    let u7 = EntityUuid::new_unchecked("u7");
    let u9 = EntityUuid::new_unchecked("u9");
    assert_eq!(closure.len(), 3);

    // The root's dependency map carries each member under its hash.
    let y = closure.entities.get(&u7).expect("y present");
    let z = closure.entities.get(&u9).expect("z present");
    let root_deps = root.dependencies();
    assert_eq!(root_deps.get(&u7), Some(&y.hash()));
    assert_eq!(root_deps.get(&u9), Some(&z.hash()));

    // Only the directly referenced entity is a child of the root.
    let children: BTreeMap<_, _> = root.get().child_dependencies().clone();
    assert!(children.contains_key(&u7));
    assert!(!children.contains_key(&u9));

    assert!(closure.modules.is_superset(
        &["node".to_string(), "taxonomy".to_string(), "file".to_string()].into()
    ));
}

#[test]
fn closure_never_contains_a_self_edge() {
    let (storage, calc, _) = calculator(vec![node("node", "1", "u1", &[("node", "1")])]);
    let mut stack = DependencyStack::in_memory();
    let root = calc
        .wrap(&storage.load("node", "1").expect("fixture"))
        .expect("wrap");

    let closure = calc
        .calculate_dependencies(&root, &mut stack)
        .expect("calculate");
    assert_eq!(closure.len(), 1);
    assert!(root.dependencies().is_empty());
}

#[test]
fn sqlite_cache_carries_closures_across_runs() {
    let dir = tempfile::tempdir().expect("temp dir");
    let cache_path = dir.path().join("cache.sqlite3");

    let (storage, calc, invocations) = calculator(vec![
        node("node", "1", "u1", &[("taxonomy_term", "7")]),
        node("taxonomy_term", "7", "u7", &[]),
    ]);

    let cold = {
        let cache = SqliteCache::open(&cache_path).expect("open cache");
        let mut stack = DependencyStack::new(Box::new(cache));
        let root = calc
            .wrap(&storage.load("node", "1").expect("fixture"))
            .expect("wrap");
        calc.calculate_dependencies(&root, &mut stack)
            .expect("cold run")
    };
    let cold_invocations = invocations.get();
    assert_eq!(cold_invocations, 2);

    // Separate stack over a reopened database simulates a second process.
    let warm = {
        let cache = SqliteCache::open(&cache_path).expect("reopen cache");
        let mut stack = DependencyStack::new(Box::new(cache));
        let root = calc
            .wrap(&storage.load("node", "1").expect("fixture"))
            .expect("wrap");
        calc.calculate_dependencies(&root, &mut stack)
            .expect("warm run")
    };

    assert_eq!(invocations.get(), cold_invocations, "no collection on warm run");
    assert_eq!(
        warm.entities.keys().collect::<Vec<_>>(),
        cold.entities.keys().collect::<Vec<_>>()
    );
    assert_eq!(warm.modules, cold.modules);
}

#[test]
fn diamond_graph_shares_one_wrapper_per_uuid() {
    // X -> Y1, X -> Y2, Y1 -> Z, Y2 -> Z
    let (storage, calc, invocations) = calculator(vec![
        node("node", "1", "u1", &[("node", "2"), ("node", "3")]),
        node("node", "2", "u2", &[("node", "4")]),
        node("node", "3", "u3", &[("node", "4")]),
        node("node", "4", "u4", &[]),
    ]);
    let mut stack = DependencyStack::in_memory();
    let root = calc
        .wrap(&storage.load("node", "1").expect("fixture"))
        .expect("wrap");

    let closure = calc
        .calculate_dependencies(&root, &mut stack)
        .expect("calculate");

    assert_eq!(closure.len(), 4);
    assert_eq!(invocations.get(), 4, "the shared sink is collected once");

    let u4 = EntityUuid::new_unchecked("u4");
    let via_y1 = closure
        .entities
        .get(&EntityUuid::new_unchecked("u2"))
        .expect("y1");
    let via_y2 = closure
        .entities
        .get(&EntityUuid::new_unchecked("u3"))
        .expect("y2");
    assert_eq!(
        via_y1.dependencies().get(&u4),
        via_y2.dependencies().get(&u4),
        "both paths record the same hash for the shared sink"
    );
}
