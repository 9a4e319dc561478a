use std::sync::Arc;

use sombra_ogm::{
    store::{GraphStore, IndexKind, MemoryGraph},
    typerep::{
        Instantiators, ProbeReport, Strategy, StrategySelector, REL_TYPES_INDEX_NAME,
        TYPES_INDEX_NAME,
    },
    ElementRef, OgmError, Result, TypeDescriptor,
};
use tempfile::TempDir;

fn select(graph: &Arc<MemoryGraph>) -> Result<StrategySelector> {
    let store: Arc<dyn GraphStore> = graph.clone();
    StrategySelector::new(store, Instantiators::default())
}

#[test]
fn virgin_store_is_indexed() -> Result<()> {
    let graph = Arc::new(MemoryGraph::new());
    let selector = select(&graph)?;
    assert_eq!(selector.strategy(), Strategy::Indexed);
    assert!(selector.object_type().ends_with("IndexedTypeRepresentation"));
    // The probe alone must not materialize either encoding.
    assert!(!graph.index_exists(IndexKind::Nodes, TYPES_INDEX_NAME)?);
    assert_eq!(graph.node_count(), 1);
    Ok(())
}

#[test]
fn selection_is_deterministic() -> Result<()> {
    let graph = Arc::new(MemoryGraph::new());
    let first = select(&graph)?;
    for _ in 0..5 {
        let again = select(&graph)?;
        assert_eq!(again.strategy(), first.strategy());
        assert_eq!(again.report(), first.report());
    }
    Ok(())
}

#[test]
fn indexed_scenario_tag_42_as_person() -> Result<()> {
    let graph = Arc::new(MemoryGraph::new());
    let types = select(&graph)?.create();
    let mut node = graph.create_node()?;
    while node.0 < 42 {
        node = graph.create_node()?;
    }
    let element = ElementRef::Node(node);
    let person = TypeDescriptor::new("Person");
    types.tag(element, &person)?;
    assert_eq!(types.iterate_by_type(&person)?.to_vec()?, vec![element]);
    assert_eq!(types.resolve_type(element)?, person);
    Ok(())
}

#[test]
fn subref_label_without_index_selects_subreference() -> Result<()> {
    let graph = Arc::new(MemoryGraph::new());
    let root = graph.reference_node()?;
    let marker = graph.create_node()?;
    graph.create_relationship(root, marker, "SUBREF_Person")?;
    assert!(!graph.index_exists(IndexKind::Nodes, TYPES_INDEX_NAME)?);

    let selector = select(&graph)?;
    assert_eq!(selector.strategy(), Strategy::SubReference);
    assert!(selector
        .object_type()
        .ends_with("SubReferenceTypeRepresentation"));
    Ok(())
}

#[test]
fn relationship_type_index_does_not_count_as_a_signature() -> Result<()> {
    let graph = Arc::new(MemoryGraph::new());
    graph.create_index_if_absent(IndexKind::Relationships, REL_TYPES_INDEX_NAME)?;
    let root = graph.reference_node()?;
    let marker = graph.create_node()?;
    graph.create_relationship(root, marker, "SUBREF_Person")?;
    assert_eq!(select(&graph)?.strategy(), Strategy::SubReference);
    Ok(())
}

#[test]
fn encodings_stay_exclusive_across_restarts() -> Result<()> {
    let dir = TempDir::new()?;
    for (forced, expected) in [
        (Strategy::Indexed, Strategy::Indexed),
        (Strategy::SubReference, Strategy::SubReference),
    ] {
        let path = dir.path().join(format!("{forced}.json"));
        {
            let graph = Arc::new(MemoryGraph::new());
            let store: Arc<dyn GraphStore> = graph.clone();
            let types =
                StrategySelector::with_override(store, Instantiators::default(), Some(forced))?
                    .create();
            for _ in 0..3 {
                let node = graph.create_node()?;
                types.tag(node.into(), &TypeDescriptor::new("Person"))?;
            }
            graph.save(&path)?;
        }

        for _ in 0..3 {
            let graph = Arc::new(MemoryGraph::open(&path)?);
            let selector = select(&graph)?;
            assert_eq!(selector.strategy(), expected);
            let report = ProbeReport::probe(graph.as_ref())?;
            assert!(!report.is_dual_signature());

            let types = selector.create();
            let node = graph.create_node()?;
            types.tag(node.into(), &TypeDescriptor::new("Robot"))?;
            assert_eq!(
                types.count_by_type(&TypeDescriptor::new("Person"))?,
                3,
                "{forced} store lost instances after reopening"
            );
            assert!(!ProbeReport::probe(graph.as_ref())?.is_dual_signature());
        }
    }
    Ok(())
}

#[test]
fn contradicting_override_is_rejected() -> Result<()> {
    let graph = Arc::new(MemoryGraph::new());
    let root = graph.reference_node()?;
    let marker = graph.create_node()?;
    graph.create_relationship(root, marker, "SUBREF_Person")?;
    let store: Arc<dyn GraphStore> = graph.clone();
    let err = StrategySelector::with_override(store, Instantiators::default(), Some(Strategy::Indexed))
        .unwrap_err();
    assert!(matches!(err, OgmError::Initialization { .. }));
    assert!(!err.is_recoverable());
    Ok(())
}

#[test]
fn unavailable_store_fails_initialization() {
    let graph = Arc::new(MemoryGraph::new());
    graph.set_online(false);
    let err = select(&graph).unwrap_err();
    match err {
        OgmError::Initialization { source } => {
            assert!(matches!(*source, OgmError::StoreUnavailable(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}
