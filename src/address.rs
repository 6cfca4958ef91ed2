//! Choosing the address callers should use to reach a machine.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;

/// Network label providers use for internet-facing addresses.
pub const PUBLIC_NETWORK: &str = "public";

/// Network label for addresses on the provider's internal network.
pub const PRIVATE_NETWORK: &str = "private";

/// Literal form of an address.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum AddressKind {
    /// Dotted-quad IPv4 literal.
    Ipv4,
    /// IPv6 literal.
    Ipv6,
    /// DNS name.
    Hostname,
}

/// Reachability of an address.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum AddressScope {
    /// Reachable from the internet.
    Public,
    /// Reachable inside the provider's network.
    CloudLocal,
    /// Reachable only from the machine itself.
    MachineLocal,
    /// Reachable only on the attached link.
    LinkLocal,
    /// Reachability not known.
    Unknown,
}

impl fmt::Display for AddressScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Public => "public",
            Self::CloudLocal => "local-cloud",
            Self::MachineLocal => "local-machine",
            Self::LinkLocal => "link-local",
            Self::Unknown => "unknown",
        };
        f.write_str(label)
    }
}

/// Candidate address of a machine.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct Address {
    /// Literal address or hostname.
    pub value: String,
    /// Literal form.
    pub kind: AddressKind,
    /// Reachability.
    pub scope: AddressScope,
}

impl Address {
    /// Builds an address, deriving kind and scope from the literal.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        let literal = value.into().trim().to_owned();
        let (kind, scope) = match literal.parse::<IpAddr>() {
            Ok(IpAddr::V4(ip)) => (AddressKind::Ipv4, ipv4_scope(ip)),
            Ok(IpAddr::V6(ip)) => (AddressKind::Ipv6, ipv6_scope(ip)),
            Err(_) if literal.eq_ignore_ascii_case("localhost") => {
                (AddressKind::Hostname, AddressScope::MachineLocal)
            }
            Err(_) => (AddressKind::Hostname, AddressScope::Unknown),
        };
        Self {
            value: literal,
            kind,
            scope,
        }
    }

    /// Overrides the derived scope.
    #[must_use]
    pub const fn with_scope(mut self, scope: AddressScope) -> Self {
        self.scope = scope;
        self
    }

    fn rank(&self) -> Option<(u8, u8)> {
        let tier = match self.scope {
            AddressScope::Public => 0,
            AddressScope::CloudLocal | AddressScope::Unknown => 1,
            AddressScope::MachineLocal | AddressScope::LinkLocal => return None,
        };
        let family = match self.kind {
            AddressKind::Ipv4 => 0,
            AddressKind::Ipv6 => 1,
            AddressKind::Hostname => 2,
        };
        Some((tier, family))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.value, self.scope)
    }
}

fn ipv4_scope(ip: Ipv4Addr) -> AddressScope {
    if ip.is_loopback() {
        AddressScope::MachineLocal
    } else if ip.is_link_local() {
        AddressScope::LinkLocal
    } else if ip.is_private() || is_shared_v4(ip) {
        AddressScope::CloudLocal
    } else if ip.is_unspecified() || ip.is_broadcast() {
        AddressScope::Unknown
    } else {
        AddressScope::Public
    }
}

// 100.64.0.0/10, carrier-grade NAT.
const fn is_shared_v4(ip: Ipv4Addr) -> bool {
    let [first, second, ..] = ip.octets();
    first == 100 && (second & 0b1100_0000) == 0b0100_0000
}

fn ipv6_scope(ip: Ipv6Addr) -> AddressScope {
    if ip.is_loopback() {
        AddressScope::MachineLocal
    } else if ip.is_unicast_link_local() {
        AddressScope::LinkLocal
    } else if ip.is_unique_local() {
        AddressScope::CloudLocal
    } else if ip.is_unspecified() {
        AddressScope::Unknown
    } else {
        AddressScope::Public
    }
}

/// Errors raised by address selection.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum AddressError {
    /// Raised when no candidate is reachable from outside the machine.
    #[error("no usable address among {candidates} candidate(s)")]
    NoAddress {
        /// Number of candidates considered.
        candidates: usize,
    },
}

/// Returns the best address for reaching a machine from outside.
///
/// Public addresses win, then cloud-local or unknown ones; IPv4 precedes
/// IPv6 within a scope. Machine-local and link-local addresses never
/// qualify. Among equals the earliest candidate is chosen.
///
/// # Errors
///
/// Returns [`AddressError::NoAddress`] when nothing qualifies.
pub fn select_public(candidates: &[Address]) -> Result<Address, AddressError> {
    candidates
        .iter()
        .filter_map(|address| address.rank().map(|rank| (rank, address)))
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, address)| address.clone())
        .ok_or(AddressError::NoAddress {
            candidates: candidates.len(),
        })
}

/// Converts a provider's per-network address map into candidates.
///
/// The floating IP, when present, comes first and is public. Addresses on
/// the [`PUBLIC_NETWORK`] label are public; others keep their derived
/// scope. Empty and repeated literals are skipped.
#[must_use]
pub fn instance_addresses(
    public_ip: Option<&str>,
    networks: &BTreeMap<String, Vec<String>>,
) -> Vec<Address> {
    let mut out: Vec<Address> = Vec::new();
    let mut push = |candidate: Address| {
        if !candidate.value.is_empty() && !out.iter().any(|seen| seen.value == candidate.value) {
            out.push(candidate);
        }
    };

    if let Some(ip) = public_ip {
        push(Address::new(ip).with_scope(AddressScope::Public));
    }
    for (label, addresses) in networks {
        for literal in addresses {
            let candidate = Address::new(literal.as_str());
            if label == PUBLIC_NETWORK {
                push(candidate.with_scope(AddressScope::Public));
            } else {
                push(candidate);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("8.8.8.8", AddressKind::Ipv4, AddressScope::Public)]
    #[case("10.0.0.4", AddressKind::Ipv4, AddressScope::CloudLocal)]
    #[case("192.168.1.1", AddressKind::Ipv4, AddressScope::CloudLocal)]
    #[case("127.0.0.1", AddressKind::Ipv4, AddressScope::MachineLocal)]
    #[case("169.254.1.1", AddressKind::Ipv4, AddressScope::LinkLocal)]
    #[case("2001:db8::1", AddressKind::Ipv6, AddressScope::Public)]
    #[case("fd00::1", AddressKind::Ipv6, AddressScope::CloudLocal)]
    #[case("fe80::1", AddressKind::Ipv6, AddressScope::LinkLocal)]
    #[case("::1", AddressKind::Ipv6, AddressScope::MachineLocal)]
    #[case("example.com", AddressKind::Hostname, AddressScope::Unknown)]
    #[case("localhost", AddressKind::Hostname, AddressScope::MachineLocal)]
    fn derives_kind_and_scope(
        #[case] literal: &str,
        #[case] kind: AddressKind,
        #[case] scope: AddressScope,
    ) {
        let address = Address::new(literal);
        assert_eq!(address.kind, kind);
        assert_eq!(address.scope, scope);
    }

    #[test]
    fn public_beats_cloud_local() {
        let candidates = [Address::new("10.0.0.4"), Address::new("8.8.8.8")];
        let chosen = select_public(&candidates).expect("address");
        assert_eq!(chosen.value, "8.8.8.8");
    }

    #[test]
    fn ipv4_precedes_ipv6_within_scope() {
        let candidates = [Address::new("2001:db8::1"), Address::new("8.8.4.4")];
        let chosen = select_public(&candidates).expect("address");
        assert_eq!(chosen.value, "8.8.4.4");
    }

    #[test]
    fn falls_back_to_cloud_local() {
        let candidates = [Address::new("127.0.0.1"), Address::new("10.1.2.3")];
        let chosen = select_public(&candidates).expect("address");
        assert_eq!(chosen.scope, AddressScope::CloudLocal);
    }

    #[rstest]
    #[case::empty(&[])]
    #[case::local_only(&["127.0.0.1", "fe80::1"])]
    fn rejects_unreachable_sets(#[case] literals: &[&str]) {
        let candidates: Vec<Address> = literals.iter().copied().map(Address::new).collect();
        let err = select_public(&candidates).expect_err("no address");
        assert_eq!(
            err,
            AddressError::NoAddress {
                candidates: literals.len()
            }
        );
    }

    #[test]
    fn floating_ip_is_public_and_first() {
        let networks = BTreeMap::from([
            (String::from(PRIVATE_NETWORK), vec![String::from("10.0.0.4")]),
            (String::from(PUBLIC_NETWORK), vec![String::from("10.9.9.9")]),
        ]);

        let addresses = instance_addresses(Some("203.0.113.7"), &networks);

        let values: Vec<&str> = addresses.iter().map(|a| a.value.as_str()).collect();
        assert_eq!(values, ["203.0.113.7", "10.0.0.4", "10.9.9.9"]);
        assert_eq!(addresses.first().map(|a| a.scope), Some(AddressScope::Public));
        assert_eq!(addresses.get(2).map(|a| a.scope), Some(AddressScope::Public));
    }

    #[test]
    fn repeated_addresses_are_dropped() {
        let networks = BTreeMap::from([(
            String::from(PRIVATE_NETWORK),
            vec![String::from("10.0.0.4"), String::new()],
        )]);

        let addresses = instance_addresses(Some("10.0.0.4"), &networks);

        assert_eq!(addresses.len(), 1);
    }
}
