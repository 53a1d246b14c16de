use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DirectoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpVersion {
    #[serde(rename = "4")]
    V4,
    #[serde(rename = "6")]
    V6,
}

impl IpVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            IpVersion::V4 => "4",
            IpVersion::V6 => "6",
        }
    }
}

impl fmt::Display for IpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IpVersion {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "4" => Ok(IpVersion::V4),
            "6" => Ok(IpVersion::V6),
            other => Err(DirectoryError::InvalidInput(format!(
                "unknown ip version `{}`",
                other
            ))),
        }
    }
}

/// Status as submitted by a network monitor.
///
/// `up` is optional on the wire so a missing field is rejected rather than
/// silently read as "down".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatus {
    pub pub_key: String,
    #[serde(default)]
    pub owner: Option<String>,
    pub ip_version: String,
    pub up: Option<bool>,
}

impl NodeStatus {
    pub fn new(pub_key: &str, ip_version: IpVersion, up: bool) -> Self {
        Self {
            pub_key: pub_key.to_string(),
            owner: None,
            ip_version: ip_version.as_str().to_string(),
            up: Some(up),
        }
    }

    /// Validate and stamp with the time of receipt
    pub fn into_observation(self, timestamp: i64) -> Result<Observation, DirectoryError> {
        if self.pub_key.trim().is_empty() {
            return Err(DirectoryError::InvalidInput("pubKey must not be empty".to_string()));
        }
        let up = self
            .up
            .ok_or_else(|| DirectoryError::InvalidInput("missing `up` field".to_string()))?;
        let ip_version = self.ip_version.parse::<IpVersion>()?;

        Ok(Observation {
            identity: self.pub_key,
            ip_version,
            up,
            owner: self.owner.filter(|o| !o.is_empty()),
            timestamp,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchNodeStatus {
    pub status: Vec<NodeStatus>,
}

/// A stored up/down observation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(rename = "pubKey")]
    pub identity: String,
    pub ip_version: IpVersion,
    pub up: bool,
    pub owner: Option<String>,
    pub timestamp: i64,
}

impl Observation {
    pub fn new(identity: &str, ip_version: IpVersion, up: bool, timestamp: i64) -> Self {
        Self {
            identity: identity.to_string(),
            ip_version,
            up,
            owner: None,
            timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_up_is_rejected() {
        let status: NodeStatus =
            serde_json::from_str(r#"{"pubKey":"key1","ipVersion":"4"}"#).unwrap();
        let err = status.into_observation(1).unwrap_err();
        assert!(matches!(err, DirectoryError::InvalidInput(_)));
    }

    #[test]
    fn test_explicit_down_is_kept() {
        let status: NodeStatus =
            serde_json::from_str(r#"{"pubKey":"key1","ipVersion":"6","up":false}"#).unwrap();
        let obs = status.into_observation(7).unwrap();
        assert_eq!(obs.ip_version, IpVersion::V6);
        assert!(!obs.up);
        assert_eq!(obs.timestamp, 7);
    }

    #[test]
    fn test_bad_ip_version() {
        let status = NodeStatus {
            pub_key: "key1".to_string(),
            owner: None,
            ip_version: "5".to_string(),
            up: Some(true),
        };
        assert!(status.into_observation(1).is_err());
    }

    #[test]
    fn test_observation_wire_names() {
        let obs = Observation::new("key1", IpVersion::V4, true, 10);
        let json = serde_json::to_value(&obs).unwrap();
        assert_eq!(json["pubKey"], "key1");
        assert_eq!(json["ipVersion"], "4");
    }
}
