use serde::{Deserialize, Serialize};

use super::node::{NodeKind, RegisteredNode};

/// Read-only projection of a node set, split by kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topology {
    pub mix_nodes: Vec<RegisteredNode>,
    pub gateways: Vec<RegisteredNode>,
}

impl Topology {
    pub fn from_nodes(nodes: impl IntoIterator<Item = RegisteredNode>) -> Self {
        let (mix_nodes, gateways) = nodes
            .into_iter()
            .partition(|node| node.kind == NodeKind::Mix);
        Self { mix_nodes, gateways }
    }

    pub fn len(&self) -> usize {
        self.mix_nodes.len() + self.gateways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.mix_nodes
            .iter()
            .chain(self.gateways.iter())
            .any(|node| node.identity == identity)
    }
}
