use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::memory::{GraphData, MemoryGraph, Properties, RelRecord};
use super::IndexKind;
use crate::error::{OgmError, Result};
use crate::model::{ElementRef, NodeId, Relationship};

/// Serializable image of a [`MemoryGraph`], used to carry a database across
/// process restarts.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub next_node: u64,
    pub next_rel: u64,
    pub reference: NodeId,
    pub nodes: Vec<NodeSnapshot>,
    pub relationships: Vec<RelationshipSnapshot>,
    pub indexes: Vec<IndexSnapshot>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub id: NodeId,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSnapshot {
    #[serde(flatten)]
    pub relationship: Relationship,
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub kind: IndexKind,
    pub name: String,
    pub entries: Vec<IndexEntrySnapshot>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexEntrySnapshot {
    pub key: String,
    pub value: String,
    pub elements: Vec<ElementRef>,
}

impl MemoryGraph {
    pub fn snapshot(&self) -> GraphSnapshot {
        let data = self.data.read();
        GraphSnapshot {
            next_node: data.next_node,
            next_rel: data.next_rel,
            reference: data.reference,
            nodes: data
                .nodes
                .iter()
                .map(|(id, props)| NodeSnapshot {
                    id: *id,
                    properties: props.clone(),
                })
                .collect(),
            relationships: data
                .relationships
                .values()
                .map(|record| RelationshipSnapshot {
                    relationship: record.rel.clone(),
                    properties: record.props.clone(),
                })
                .collect(),
            indexes: data
                .indexes
                .iter()
                .map(|((kind, name), entries)| IndexSnapshot {
                    kind: *kind,
                    name: name.clone(),
                    entries: entries
                        .iter()
                        .map(|((key, value), elements)| IndexEntrySnapshot {
                            key: key.clone(),
                            value: value.clone(),
                            elements: elements.iter().copied().collect(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// Rebuilds a graph from a snapshot, validating that relationships only
    /// reference nodes that exist.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self> {
        let mut data = GraphData {
            next_node: snapshot.next_node,
            next_rel: snapshot.next_rel,
            reference: snapshot.reference,
            ..GraphData::default()
        };
        for node in snapshot.nodes {
            data.nodes.insert(node.id, node.properties);
        }
        if !data.nodes.contains_key(&data.reference) {
            return Err(OgmError::Serialization(format!(
                "snapshot is missing reference node {}",
                data.reference.0
            )));
        }
        for rel in snapshot.relationships {
            let r = rel.relationship;
            if !data.nodes.contains_key(&r.start) || !data.nodes.contains_key(&r.end) {
                return Err(OgmError::Serialization(format!(
                    "relationship {} references a missing node",
                    r.id.0
                )));
            }
            data.link(&r);
            data.relationships.insert(
                r.id,
                RelRecord {
                    rel: r,
                    props: rel.properties,
                },
            );
        }
        for index in snapshot.indexes {
            let entries = data.indexes.entry((index.kind, index.name)).or_default();
            for entry in index.entries {
                entries
                    .entry((entry.key, entry.value))
                    .or_default()
                    .extend(entry.elements);
            }
        }
        Ok(MemoryGraph::from_data(data))
    }

    /// Writes the graph as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.snapshot())?;
        fs::write(path, json)?;
        debug!(path = %path.display(), "graph snapshot written");
        Ok(())
    }

    /// Opens a graph previously written with [`MemoryGraph::save`].
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let snapshot: GraphSnapshot = serde_json::from_slice(&bytes)?;
        let graph = MemoryGraph::from_snapshot(snapshot)?;
        info!(
            path = %path.display(),
            nodes = graph.node_count(),
            relationships = graph.relationship_count(),
            "graph snapshot loaded"
        );
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Direction;
    use crate::store::GraphStore;
    use tempfile::tempdir;

    #[test]
    fn snapshot_survives_a_file_round_trip() -> Result<()> {
        let graph = MemoryGraph::new();
        let root = graph.reference_node()?;
        let a = graph.create_node()?;
        graph.set_property(a.into(), "name", "alice".into())?;
        graph.create_relationship(root, a, "SUBREF_Person")?;
        graph.create_index_if_absent(IndexKind::Nodes, "__types__")?;
        graph.index_add(IndexKind::Nodes, "__types__", "className", "Person", a.into())?;

        let dir = tempdir()?;
        let path = dir.path().join("graph.json");
        graph.save(&path)?;
        let reopened = MemoryGraph::open(&path)?;

        assert_eq!(reopened.snapshot(), graph.snapshot());
        assert_eq!(
            reopened.relationships(root, Direction::Outgoing, None)?[0].rel_type,
            "SUBREF_Person"
        );
        assert_eq!(
            reopened.property(a.into(), "name")?,
            Some("alice".into())
        );
        let fresh = reopened.create_node()?;
        assert!(fresh.0 > a.0);
        Ok(())
    }

    #[test]
    fn dangling_relationship_is_rejected() {
        let mut snapshot = MemoryGraph::new().snapshot();
        snapshot.relationships.push(RelationshipSnapshot {
            relationship: Relationship {
                id: crate::model::RelId(0),
                start: NodeId(0),
                end: NodeId(99),
                rel_type: "KNOWS".into(),
            },
            properties: Properties::new(),
        });
        assert!(matches!(
            MemoryGraph::from_snapshot(snapshot),
            Err(OgmError::Serialization(_))
        ));
    }
}
