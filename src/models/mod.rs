//! Directory data model
//!
//! Wire shapes use camelCase JSON to stay compatible with existing network
//! monitors and clients.

pub mod node;
pub mod observation;
pub mod report;
pub mod topology;

pub use node::{
    GatewayRegistrationInfo, MixRegistrationInfo, NodeInfo, NodeKind, NodeState, RegisteredNode,
};
pub use observation::{BatchNodeStatus, IpVersion, NodeStatus, Observation};
pub use report::{BatchStatusReport, StatusReport};
pub use topology::Topology;
