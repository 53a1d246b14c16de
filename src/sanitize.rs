//! Input sanitization
//!
//! Strips markup tags from every free-text field before it reaches the core.

use regex::Regex;
use std::sync::OnceLock;

use crate::models::{BatchNodeStatus, GatewayRegistrationInfo, MixRegistrationInfo, NodeInfo, NodeStatus};

fn tag_pattern() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"(?s)<[^>]*>?").expect("tag pattern is valid"))
}

/// Remove markup tags and surrounding whitespace
pub fn sanitize_str(input: &str) -> String {
    tag_pattern().replace_all(input, "").trim().to_string()
}

pub trait Sanitizable {
    fn sanitize(&mut self);
}

impl Sanitizable for String {
    fn sanitize(&mut self) {
        let clean = sanitize_str(self);
        if clean != *self {
            *self = clean;
        }
    }
}

impl<T: Sanitizable> Sanitizable for Option<T> {
    fn sanitize(&mut self) {
        if let Some(value) = self {
            value.sanitize();
        }
    }
}

impl<T: Sanitizable> Sanitizable for Vec<T> {
    fn sanitize(&mut self) {
        for value in self.iter_mut() {
            value.sanitize();
        }
    }
}

impl Sanitizable for NodeStatus {
    fn sanitize(&mut self) {
        self.pub_key.sanitize();
        self.owner.sanitize();
        self.ip_version.sanitize();
    }
}

impl Sanitizable for BatchNodeStatus {
    fn sanitize(&mut self) {
        self.status.sanitize();
    }
}

impl Sanitizable for NodeInfo {
    fn sanitize(&mut self) {
        self.mix_host.sanitize();
        self.identity_key.sanitize();
        self.sphinx_key.sanitize();
        self.version.sanitize();
        self.location.sanitize();
        self.incentives_address.sanitize();
    }
}

impl Sanitizable for MixRegistrationInfo {
    fn sanitize(&mut self) {
        self.node.sanitize();
    }
}

impl Sanitizable for GatewayRegistrationInfo {
    fn sanitize(&mut self) {
        self.node.sanitize();
        self.clients_host.sanitize();
    }
}
