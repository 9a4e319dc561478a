use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::config::OgmConfig;
use crate::error::Result;
use crate::store::GraphStore;
use crate::typerep::{
    Instantiators, ProbeReport, Strategy, StrategySelector, TypeRepresentationStrategy,
};

/// The store-access object handed to entity states.
///
/// Bundles one store with the type registry chosen for it. Cloning is cheap and
/// every clone shares the same store and registry.
#[derive(Clone)]
pub struct GraphTemplate {
    store: Arc<dyn GraphStore>,
    types: Arc<dyn TypeRepresentationStrategy>,
    report: Option<ProbeReport>,
    detachable_by_default: bool,
}

impl fmt::Debug for GraphTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphTemplate")
            .field("strategy", &self.types.strategy())
            .field("report", &self.report)
            .field("detachable_by_default", &self.detachable_by_default)
            .finish()
    }
}

impl GraphTemplate {
    pub fn new(store: Arc<dyn GraphStore>, types: Arc<dyn TypeRepresentationStrategy>) -> Self {
        Self {
            store,
            types,
            report: None,
            detachable_by_default: true,
        }
    }

    /// Probes `store` (honouring any forced strategy in `config`) and wires the
    /// selected registry.
    pub fn open(
        store: Arc<dyn GraphStore>,
        instantiators: Instantiators,
        config: &OgmConfig,
    ) -> Result<Self> {
        let selector = StrategySelector::with_override(
            Arc::clone(&store),
            instantiators,
            config.strategy.forced(),
        )?;
        debug!(registry = selector.object_type(), "graph template opened");
        Ok(Self {
            types: selector.create(),
            report: Some(selector.report().clone()),
            store,
            detachable_by_default: config.detachable_by_default,
        })
    }

    pub fn with_detachable_by_default(mut self, detachable: bool) -> Self {
        self.detachable_by_default = detachable;
        self
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    pub fn type_representation(&self) -> &Arc<dyn TypeRepresentationStrategy> {
        &self.types
    }

    pub fn strategy(&self) -> Strategy {
        self.types.strategy()
    }

    /// The probe that chose the registry, when the template was opened
    /// through [`GraphTemplate::open`].
    pub fn probe_report(&self) -> Option<&ProbeReport> {
        self.report.as_ref()
    }

    pub fn detachable_by_default(&self) -> bool {
        self.detachable_by_default
    }

    pub fn has_active_context(&self) -> bool {
        self.store.has_active_context()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyOverride;
    use crate::store::MemoryGraph;

    #[test]
    fn open_applies_the_configuration() -> Result<()> {
        let graph = Arc::new(MemoryGraph::new());
        let config = OgmConfig::default()
            .strategy(StrategyOverride::Noop)
            .detachable_by_default(false);
        let template = GraphTemplate::open(graph.clone(), Instantiators::default(), &config)?;
        assert_eq!(template.strategy(), Strategy::Noop);
        assert!(!template.detachable_by_default());
        assert!(template.probe_report().is_some_and(|r| r.is_virgin()));
        Ok(())
    }

    #[test]
    fn context_follows_the_store() -> Result<()> {
        let graph = Arc::new(MemoryGraph::new());
        let template = GraphTemplate::open(
            graph.clone(),
            Instantiators::default(),
            &OgmConfig::default(),
        )?;
        assert!(!template.has_active_context());
        let guard = graph.begin_context();
        assert!(template.has_active_context());
        drop(guard);
        assert!(!template.has_active_context());
        Ok(())
    }
}
