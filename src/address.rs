//! Network address normalization
//!
//! Registration and self-service unregistration compare the *host* part of
//! addresses exactly. Hosts are normalized first:
//!
//! - `[::1]:1789`, `[::1]` and `0:0:0:0:0:0:0:1` all become `::1`
//! - IPv4-mapped IPv6 (`::ffff:1.2.3.4`) becomes `1.2.3.4`
//! - ports are dropped, hostnames are lower-cased without a trailing dot

use std::net::{IpAddr, SocketAddr};

/// Normalized host of an address, or `None` when nothing host-like is present
pub fn normalize_host(address: &str) -> Option<String> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(socket) = trimmed.parse::<SocketAddr>() {
        return Some(canonical_ip(socket.ip()));
    }

    let unbracketed = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);

    if let Ok(ip) = unbracketed.parse::<IpAddr>() {
        return Some(canonical_ip(ip));
    }

    let name = match unbracketed.rsplit_once(':') {
        None => unbracketed,
        Some((name, port))
            if !name.contains(':')
                && !port.is_empty()
                && port.chars().all(|c| c.is_ascii_digit()) =>
        {
            name
        }
        Some(_) => return None,
    };

    let name = name.trim_end_matches('.').to_ascii_lowercase();
    if name.is_empty() || name.contains(['[', ']', '/', ' ']) {
        None
    } else {
        Some(name)
    }
}

/// True when both addresses resolve to the same normalized host
pub fn same_host(a: &str, b: &str) -> bool {
    match (normalize_host(a), normalize_host(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn canonical_ip(ip: IpAddr) -> String {
    ip.to_canonical().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ipv4_with_and_without_port() {
        assert_eq!(normalize_host("1.2.3.4:1789").as_deref(), Some("1.2.3.4"));
        assert_eq!(normalize_host(" 1.2.3.4 ").as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn test_ipv6_forms_collapse() {
        let expected = Some("2001:db8::1".to_string());
        assert_eq!(normalize_host("[2001:db8::1]:1789"), expected);
        assert_eq!(normalize_host("[2001:db8::1]"), expected);
        assert_eq!(normalize_host("2001:db8::1"), expected);
        assert_eq!(normalize_host("2001:0db8:0000:0000:0000:0000:0000:0001"), expected);
    }

    #[test]
    fn test_ipv4_mapped_ipv6() {
        assert_eq!(normalize_host("[::ffff:1.2.3.4]:80").as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn test_hostnames() {
        assert_eq!(normalize_host("Mix.Example.ORG.:1789").as_deref(), Some("mix.example.org"));
        assert_eq!(normalize_host("localhost").as_deref(), Some("localhost"));
        assert_eq!(normalize_host(""), None);
        assert_eq!(normalize_host("a:b:c"), None);
    }

    #[test]
    fn test_no_substring_matches() {
        assert!(!same_host("1.2.3.4:1789", "21.2.3.45:1789"));
        assert!(same_host("1.2.3.4:1789", "1.2.3.4:9000"));
        assert!(same_host("[::1]:1789", "::1"));
    }
}
