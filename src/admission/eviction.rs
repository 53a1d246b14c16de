use crate::models::StatusReport;

/// Daily-uptime rule for moving a node to the removed set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    pub threshold: u8,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self { threshold: 50 }
    }
}

impl EvictionPolicy {
    pub fn new(threshold: u8) -> Self {
        Self { threshold }
    }

    /// IPv4 below threshold, or IPv6 reported (non-zero) and below threshold.
    /// A zero IPv6 value means "never reported" and does not count. Nothing
    /// is evicted before its daily window has been computed once.
    pub fn should_evict(&self, report: &StatusReport) -> bool {
        if !report.last_day_computed {
            return false;
        }
        report.last_day_ipv4 < self.threshold
            || (report.last_day_ipv6 > 0 && report.last_day_ipv6 < self.threshold)
    }
}
