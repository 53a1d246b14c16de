use serde::{Deserialize, Serialize};

use super::observation::IpVersion;

/// Rolling uptime summary for one node
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    #[serde(rename = "pubKey")]
    pub identity: String,
    pub owner: Option<String>,

    #[serde(rename = "mostRecentIPV4")]
    pub most_recent_ipv4: bool,
    #[serde(rename = "last5MinutesIPV4")]
    pub last_5_minutes_ipv4: u8,
    #[serde(rename = "lastHourIPV4")]
    pub last_hour_ipv4: u8,
    #[serde(rename = "lastDayIPV4")]
    pub last_day_ipv4: u8,

    #[serde(rename = "mostRecentIPV6")]
    pub most_recent_ipv6: bool,
    #[serde(rename = "last5MinutesIPV6")]
    pub last_5_minutes_ipv6: u8,
    #[serde(rename = "lastHourIPV6")]
    pub last_hour_ipv6: u8,
    #[serde(rename = "lastDayIPV6")]
    pub last_day_ipv6: u8,

    /// Set once the daily window has been computed. Until then the
    /// `last_day_*` zeros mean "no data", not "down".
    #[serde(skip)]
    pub last_day_computed: bool,
}

impl StatusReport {
    pub fn new(identity: &str) -> Self {
        Self {
            identity: identity.to_string(),
            ..Default::default()
        }
    }

    /// A report that was never written has no identity
    pub fn is_empty(&self) -> bool {
        self.identity.is_empty()
    }

    /// Seen up at least once over the last day on either IP version
    pub fn is_stale(&self) -> bool {
        self.last_day_ipv4 == 0 && self.last_day_ipv6 == 0
    }

    pub fn set_most_recent(&mut self, ip_version: IpVersion, up: bool) {
        match ip_version {
            IpVersion::V4 => self.most_recent_ipv4 = up,
            IpVersion::V6 => self.most_recent_ipv6 = up,
        }
    }

    pub fn set_last_5_minutes(&mut self, ip_version: IpVersion, percent: u8) {
        match ip_version {
            IpVersion::V4 => self.last_5_minutes_ipv4 = percent,
            IpVersion::V6 => self.last_5_minutes_ipv6 = percent,
        }
    }

    pub fn set_last_hour(&mut self, ip_version: IpVersion, percent: u8) {
        match ip_version {
            IpVersion::V4 => self.last_hour_ipv4 = percent,
            IpVersion::V6 => self.last_hour_ipv6 = percent,
        }
    }

    pub fn set_last_day(&mut self, ip_version: IpVersion, percent: u8) {
        match ip_version {
            IpVersion::V4 => self.last_day_ipv4 = percent,
            IpVersion::V6 => self.last_day_ipv6 = percent,
        }
        self.last_day_computed = true;
    }

    pub fn last_day(&self, ip_version: IpVersion) -> u8 {
        match ip_version {
            IpVersion::V4 => self.last_day_ipv4,
            IpVersion::V6 => self.last_day_ipv6,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatusReport {
    pub report: Vec<StatusReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let mut report = StatusReport::new("key1");
        report.set_most_recent(IpVersion::V4, true);
        report.set_last_5_minutes(IpVersion::V4, 66);
        report.set_last_day(IpVersion::V6, 12);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["pubKey"], "key1");
        assert_eq!(json["mostRecentIPV4"], true);
        assert_eq!(json["last5MinutesIPV4"], 66);
        assert_eq!(json["lastDayIPV6"], 12);
        assert_eq!(json["lastHourIPV6"], 0);
        assert!(json.get("lastDayComputed").is_none());
    }

    #[test]
    fn test_staleness() {
        let mut report = StatusReport::new("key1");
        assert!(report.is_stale());
        assert!(!report.last_day_computed);
        report.set_last_day(IpVersion::V6, 1);
        assert!(report.last_day_computed);
        assert!(!report.is_stale());
        assert!(StatusReport::default().is_empty());
    }
}
