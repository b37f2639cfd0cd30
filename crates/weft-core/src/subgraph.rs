//! Subgraphs: structural grouping of nodes with named exposed outputs.
//!
//! A subgraph has no effect on evaluation. It exists so that a modular piece
//! of a graph can annotate the nodes it exposes, which visualization and
//! debugging surfaces then use to cluster related nodes.

use std::sync::Arc;

use crate::error::BuildError;
use crate::kind::short_type_name;
use crate::node::NodeRef;

/// A named grouping that owns a set of exposed node references.
///
/// Implementors hold their exposed nodes as public fields, return them from
/// [`exposed_nodes`](Subgraph::exposed_nodes), and call
/// [`mark_exposed`](Subgraph::mark_exposed) at the end of construction.
pub trait Subgraph {
    /// Display name; defaults to the implementing type's name.
    fn name(&self) -> &str
    where
        Self: Sized,
    {
        short_type_name::<Self>()
    }

    /// The exposed output nodes of this subgraph.
    fn exposed_nodes(&self) -> Vec<NodeRef>;

    /// Tag every exposed node with this subgraph's name. Metadata only.
    /// Errors when the subgraph exposes nothing, which is always a
    /// construction mistake.
    fn mark_exposed(&self) -> Result<(), BuildError>
    where
        Self: Sized,
    {
        let exposed = self.exposed_nodes();
        if exposed.is_empty() {
            return Err(BuildError::NoExposedNodes {
                subgraph: self.name().to_string(),
            });
        }
        let tag: Arc<str> = Arc::from(self.name());
        for node in &exposed {
            node.set_subgraph(tag.clone());
        }
        Ok(())
    }
}
