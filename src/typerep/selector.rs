use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::{
    IndexedTypeRepresentation, Instantiators, NoopTypeRepresentation,
    SubReferenceTypeRepresentation, TypeRepresentationStrategy, SUBREF_PREFIX, TYPES_INDEX_NAME,
};
use crate::error::{OgmError, Result};
use crate::model::Direction;
use crate::store::{GraphStore, IndexKind};

/// The closed set of type encodings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Indexed,
    #[serde(rename = "subreference")]
    SubReference,
    Noop,
}

impl Strategy {
    /// Builds a fresh registry for this encoding.
    pub fn build(
        self,
        store: Arc<dyn GraphStore>,
        instantiators: Instantiators,
    ) -> Arc<dyn TypeRepresentationStrategy> {
        match self {
            Strategy::Indexed => Arc::new(IndexedTypeRepresentation::new(store, instantiators)),
            Strategy::SubReference => {
                Arc::new(SubReferenceTypeRepresentation::new(store, instantiators))
            }
            Strategy::Noop => Arc::new(NoopTypeRepresentation::new(instantiators)),
        }
    }

    /// Name of the concrete registry type [`Strategy::build`] produces.
    pub fn object_type(self) -> &'static str {
        match self {
            Strategy::Indexed => std::any::type_name::<IndexedTypeRepresentation>(),
            Strategy::SubReference => std::any::type_name::<SubReferenceTypeRepresentation>(),
            Strategy::Noop => std::any::type_name::<NoopTypeRepresentation>(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Indexed => "indexed",
            Strategy::SubReference => "subreference",
            Strategy::Noop => "noop",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the read-only probe found in the store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    /// The `__types__` node index exists.
    pub indexed: bool,
    /// Labels of reference-node relationships carrying the `SUBREF_` prefix.
    pub subreference_labels: Vec<String>,
}

impl ProbeReport {
    /// Inspects the store without modifying it.
    pub fn probe(store: &dyn GraphStore) -> Result<Self> {
        let indexed = store.index_exists(IndexKind::Nodes, TYPES_INDEX_NAME)?;
        let root = store.reference_node()?;
        let mut subreference_labels: Vec<String> = store
            .relationships(root, Direction::Both, None)?
            .into_iter()
            .map(|rel| rel.rel_type)
            .filter(|label| label.starts_with(SUBREF_PREFIX))
            .collect();
        subreference_labels.sort();
        subreference_labels.dedup();
        Ok(Self {
            indexed,
            subreference_labels,
        })
    }

    pub fn has_subreference_signature(&self) -> bool {
        !self.subreference_labels.is_empty()
    }

    /// Both encodings left traces, e.g. after an interrupted migration.
    pub fn is_dual_signature(&self) -> bool {
        self.indexed && self.has_subreference_signature()
    }

    pub fn is_virgin(&self) -> bool {
        !self.indexed && !self.has_subreference_signature()
    }

    /// Indexed wins whenever its index exists, then subreference, then the
    /// default for new databases.
    pub fn choose(&self) -> Strategy {
        if self.indexed {
            Strategy::Indexed
        } else if self.has_subreference_signature() {
            Strategy::SubReference
        } else {
            Strategy::Indexed
        }
    }
}

/// Decides once which encoding a database uses and hands out registries for
/// it.
///
/// The decision is made in the constructor and never revisited; build one
/// selector per store when the mapping layer is assembled.
pub struct StrategySelector {
    store: Arc<dyn GraphStore>,
    instantiators: Instantiators,
    strategy: Strategy,
    report: ProbeReport,
}

impl fmt::Debug for StrategySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategySelector")
            .field("strategy", &self.strategy)
            .field("report", &self.report)
            .finish()
    }
}

impl StrategySelector {
    /// Probes `store` and picks its encoding. Any store failure is fatal.
    pub fn new(store: Arc<dyn GraphStore>, instantiators: Instantiators) -> Result<Self> {
        Self::with_override(store, instantiators, None)
    }

    /// Like [`StrategySelector::new`], but honours a configured strategy.
    ///
    /// `Noop` is always accepted. Forcing an encoding onto a database that
    /// already carries the other one is rejected.
    pub fn with_override(
        store: Arc<dyn GraphStore>,
        instantiators: Instantiators,
        forced: Option<Strategy>,
    ) -> Result<Self> {
        let report = ProbeReport::probe(store.as_ref()).map_err(|err| {
            error!(error = %err, "type representation probe failed");
            OgmError::initialization(err)
        })?;
        if report.is_dual_signature() {
            warn!(
                subreference_labels = ?report.subreference_labels,
                "store carries both the type index and subreference markers; keeping the indexed encoding"
            );
        }
        let detected = report.choose();
        let strategy = match forced {
            None | Some(Strategy::Noop) => forced.unwrap_or(detected),
            Some(wanted) if report.is_virgin() || wanted == detected => wanted,
            Some(wanted) => {
                error!(%wanted, %detected, "configured strategy contradicts the store");
                return Err(OgmError::initialization(OgmError::Config(format!(
                    "store uses the {detected} type encoding, refusing to switch to {wanted}"
                ))));
            }
        };
        info!(%strategy, forced = forced.is_some(), "type representation strategy selected");
        Ok(Self {
            store,
            instantiators,
            strategy,
            report,
        })
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn report(&self) -> &ProbeReport {
        &self.report
    }

    /// A new, fully wired registry for the selected encoding.
    pub fn create(&self) -> Arc<dyn TypeRepresentationStrategy> {
        self.strategy
            .build(Arc::clone(&self.store), self.instantiators.clone())
    }

    pub fn object_type(&self) -> &'static str {
        self.strategy.object_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TypeDescriptor;
    use crate::store::MemoryGraph;

    fn store() -> (Arc<MemoryGraph>, Arc<dyn GraphStore>) {
        let graph = Arc::new(MemoryGraph::new());
        let store: Arc<dyn GraphStore> = graph.clone();
        (graph, store)
    }

    #[test]
    fn virgin_store_defaults_to_indexed_without_side_effects() -> Result<()> {
        let (graph, store) = store();
        let before = graph.snapshot();
        let selector = StrategySelector::new(store, Instantiators::default())?;
        assert_eq!(selector.strategy(), Strategy::Indexed);
        assert!(selector.report().is_virgin());
        assert_eq!(graph.snapshot(), before);
        Ok(())
    }

    #[test]
    fn object_type_names_the_registry() -> Result<()> {
        let (_graph, store) = store();
        let selector = StrategySelector::new(store, Instantiators::default())?;
        assert!(selector.object_type().ends_with("IndexedTypeRepresentation"));
        assert!(Strategy::SubReference
            .object_type()
            .ends_with("SubReferenceTypeRepresentation"));
        assert_eq!(selector.create().strategy(), Strategy::Indexed);
        Ok(())
    }

    #[test]
    fn subref_signature_only_counts_prefixed_labels() -> Result<()> {
        let (graph, store) = store();
        let root = graph.reference_node()?;
        let other = graph.create_node()?;
        graph.create_relationship(root, other, "OWNS")?;
        assert!(ProbeReport::probe(store.as_ref())?.is_virgin());
        graph.create_relationship(root, other, "SUBREF_Person")?;
        let report = ProbeReport::probe(store.as_ref())?;
        assert_eq!(report.subreference_labels, vec!["SUBREF_Person".to_string()]);
        assert_eq!(report.choose(), Strategy::SubReference);
        Ok(())
    }

    #[test]
    fn dual_signature_keeps_indexed() -> Result<()> {
        let (graph, store) = store();
        let root = graph.reference_node()?;
        let marker = graph.create_node()?;
        graph.create_relationship(root, marker, "SUBREF_Person")?;
        graph.create_index_if_absent(IndexKind::Nodes, TYPES_INDEX_NAME)?;
        let selector = StrategySelector::new(store, Instantiators::default())?;
        assert!(selector.report().is_dual_signature());
        assert_eq!(selector.strategy(), Strategy::Indexed);
        Ok(())
    }

    #[test]
    fn forced_strategy_must_match_existing_encoding() -> Result<()> {
        let (graph, store) = store();
        graph.create_index_if_absent(IndexKind::Nodes, TYPES_INDEX_NAME)?;
        let err = StrategySelector::with_override(
            Arc::clone(&store),
            Instantiators::default(),
            Some(Strategy::SubReference),
        )
        .unwrap_err();
        assert!(matches!(err, OgmError::Initialization { .. }));

        let noop = StrategySelector::with_override(
            Arc::clone(&store),
            Instantiators::default(),
            Some(Strategy::Noop),
        )?;
        assert_eq!(noop.strategy(), Strategy::Noop);
        Ok(())
    }

    #[test]
    fn forced_strategy_applies_to_virgin_store() -> Result<()> {
        let (graph, store) = store();
        let selector = StrategySelector::with_override(
            store,
            Instantiators::default(),
            Some(Strategy::SubReference),
        )?;
        assert_eq!(selector.strategy(), Strategy::SubReference);
        let types = selector.create();
        let node = graph.create_node()?;
        types.tag(node.into(), &TypeDescriptor::new("Person"))?;
        assert_eq!(
            ProbeReport::probe(graph.as_ref())?.choose(),
            Strategy::SubReference
        );
        Ok(())
    }

    #[test]
    fn probe_failure_is_an_initialization_error() {
        let (graph, store) = store();
        graph.set_online(false);
        let err = StrategySelector::new(store, Instantiators::default()).unwrap_err();
        assert!(matches!(err, OgmError::Initialization { .. }));
    }
}
