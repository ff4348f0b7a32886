//! Failover Member Set
//!
//! The static group of hosts exchanging keep-alives. Built once from
//! configuration and never modified afterwards.

use std::collections::BTreeSet;
use std::net::IpAddr;

/// Immutable set of member hosts sharing one keep-alive port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberSet {
    hosts: BTreeSet<String>,
    port: u16,
}

impl MemberSet {
    /// Build a member set; duplicate hosts collapse into one member
    pub fn new<I, S>(hosts: I, port: u16) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(|h| canonical_host(h.into())).collect(),
            port,
        }
    }

    /// Check whether a host belongs to the group
    pub fn contains(&self, host: &str) -> bool {
        match host.parse::<IpAddr>() {
            Ok(ip) => self.hosts.contains(&ip.to_canonical().to_string()),
            Err(_) => self.hosts.contains(host),
        }
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// Shared keep-alive port
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.hosts.iter().map(String::as_str)
    }

    /// Keep-alive address of a member ("host:port")
    pub fn address_of(&self, host: &str) -> String {
        if host.contains(':') {
            format!("[{}]:{}", host, self.port)
        } else {
            format!("{}:{}", host, self.port)
        }
    }

    /// Keep-alive addresses of every member
    pub fn addresses(&self) -> Vec<String> {
        self.iter().map(|host| self.address_of(host)).collect()
    }
}

/// One spelling per address, so "fd00:0::2" and "fd00::2" are the same member
fn canonical_host(host: String) -> String {
    match host.parse::<IpAddr>() {
        Ok(ip) => ip.to_canonical().to_string(),
        Err(_) => host,
    }
}

impl std::fmt::Display for MemberSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hosts: Vec<&str> = self.iter().collect();
        write!(f, "[{}]", hosts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicates_collapse() {
        let members = MemberSet::new(["10.0.0.2", "10.0.0.3", "10.0.0.2"], 10001);
        assert_eq!(members.len(), 2);
        assert!(members.contains("10.0.0.3"));
        assert!(!members.contains("10.0.0.4"));
    }

    #[test]
    fn test_addresses() {
        let members = MemberSet::new(["10.0.0.2", "fd00::2"], 10001);
        assert_eq!(
            members.addresses(),
            vec!["10.0.0.2:10001".to_string(), "[fd00::2]:10001".to_string()]
        );
    }

    #[test]
    fn test_equivalent_spellings_match() {
        let members = MemberSet::new(["fd00:0:0::2", "::ffff:10.0.0.2"], 10001);
        assert_eq!(members.len(), 2);
        assert!(members.contains("fd00::2"));
        assert!(members.contains("10.0.0.2"));
        assert!(members.contains("::ffff:10.0.0.2"));
        assert!(!members.contains("fd00::3"));
    }

    #[test]
    fn test_empty() {
        let members = MemberSet::new(Vec::<String>::new(), 10001);
        assert!(members.is_empty());
        assert_eq!(members.to_string(), "[]");
    }
}
