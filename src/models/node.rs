use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::address::normalize_host;
use crate::error::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Mix,
    Gateway,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Mix => "mix",
            NodeKind::Gateway => "gateway",
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mix" => Ok(NodeKind::Mix),
            "gateway" => Ok(NodeKind::Gateway),
            other => Err(StoreError::Corrupt(format!("unknown node kind `{}`", other))),
        }
    }
}

/// Which set an identity currently belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Active,
    Removed,
}

/// Fields shared by mix and gateway registrations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub mix_host: String,
    pub identity_key: String,
    pub sphinx_key: String,
    pub version: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub incentives_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MixRegistrationInfo {
    #[serde(flatten)]
    pub node: NodeInfo,
    pub layer: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRegistrationInfo {
    #[serde(flatten)]
    pub node: NodeInfo,
    pub clients_host: String,
}

/// A node in the registered or removed set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredNode {
    #[serde(rename = "identityKey")]
    pub identity: String,
    pub kind: NodeKind,
    #[serde(rename = "mixHost")]
    pub network_address: String,
    pub sphinx_key: String,
    #[serde(rename = "version")]
    pub software_version: String,
    pub location: String,
    pub incentives_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layer: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clients_host: Option<String>,
    pub reputation: i64,
    #[serde(rename = "registrationTime")]
    pub registered_at: i64,
}

impl RegisteredNode {
    fn from_info(info: NodeInfo, kind: NodeKind, registered_at: i64) -> Self {
        Self {
            identity: info.identity_key,
            kind,
            network_address: info.mix_host,
            sphinx_key: info.sphinx_key,
            software_version: info.version,
            location: info.location,
            incentives_address: info.incentives_address,
            layer: None,
            clients_host: None,
            reputation: 0,
            registered_at,
        }
    }

    pub fn from_mix(info: MixRegistrationInfo, registered_at: i64) -> Self {
        let mut node = Self::from_info(info.node, NodeKind::Mix, registered_at);
        node.layer = Some(info.layer);
        node
    }

    pub fn from_gateway(info: GatewayRegistrationInfo, registered_at: i64) -> Self {
        let mut node = Self::from_info(info.node, NodeKind::Gateway, registered_at);
        node.clients_host = Some(info.clients_host);
        node
    }

    /// Normalized host of the mix address, empty when unparseable
    pub fn host(&self) -> String {
        normalize_host(&self.network_address).unwrap_or_default()
    }
}
