//! Translation between port ranges and backend ingress rules.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Source range applied when a port range does not name one.
pub const DEFAULT_SOURCE_RANGE: &str = "0.0.0.0/0";

/// Transport protocol of an ingress rule.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum Protocol {
    /// Transmission Control Protocol.
    Tcp,
    /// User Datagram Protocol.
    Udp,
    /// Internet Control Message Protocol; rules carry no ports.
    Icmp,
}

impl Protocol {
    /// Lower-case protocol name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Icmp => "icmp",
        }
    }

    const fn has_ports(self) -> bool {
        !matches!(self, Self::Icmp)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = PortRangeError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "icmp" => Ok(Self::Icmp),
            other => Err(PortRangeError::UnknownProtocol(other.to_owned())),
        }
    }
}

/// Errors raised while building or parsing a [`PortRange`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum PortRangeError {
    /// Raised when the lower bound exceeds the upper bound.
    #[error("invalid port range {from}-{to}")]
    Inverted {
        /// Lower bound supplied by the caller.
        from: u16,
        /// Upper bound supplied by the caller.
        to: u16,
    },
    /// Raised when a TCP or UDP range includes port zero.
    #[error("port 0 is not valid for {0}")]
    ZeroPort(Protocol),
    /// Raised for protocols other than tcp, udp, and icmp.
    #[error("unknown protocol '{0}'")]
    UnknownProtocol(String),
    /// Raised when the textual form cannot be parsed.
    #[error("malformed port range '{0}'")]
    Malformed(String),
}

/// Caller-facing description of ports to open.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct PortRange {
    /// Protocol the range applies to.
    pub protocol: Protocol,
    /// First port of the range; ignored for ICMP.
    pub from_port: u16,
    /// Last port of the range; ignored for ICMP.
    pub to_port: u16,
    /// Source CIDR; `None` means [`DEFAULT_SOURCE_RANGE`].
    pub cidr: Option<String>,
}

impl PortRange {
    /// Builds and validates a range.
    ///
    /// # Errors
    ///
    /// Returns [`PortRangeError`] when the bounds are inverted or include
    /// port zero for a port-carrying protocol.
    pub fn new(protocol: Protocol, from_port: u16, to_port: u16) -> Result<Self, PortRangeError> {
        let range = Self {
            protocol,
            from_port,
            to_port,
            cidr: None,
        };
        range.validate()?;
        Ok(range)
    }

    /// Single TCP port.
    #[must_use]
    pub const fn tcp(port: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            from_port: port,
            to_port: port,
            cidr: None,
        }
    }

    /// Single UDP port.
    #[must_use]
    pub const fn udp(port: u16) -> Self {
        Self {
            protocol: Protocol::Udp,
            from_port: port,
            to_port: port,
            cidr: None,
        }
    }

    /// All ICMP traffic.
    #[must_use]
    pub const fn icmp() -> Self {
        Self {
            protocol: Protocol::Icmp,
            from_port: 0,
            to_port: 0,
            cidr: None,
        }
    }

    /// Restricts the range to a source CIDR.
    #[must_use]
    pub fn with_cidr(mut self, cidr: impl Into<String>) -> Self {
        self.cidr = Some(cidr.into());
        self
    }

    /// Source range the rule applies to.
    #[must_use]
    pub fn source_range(&self) -> &str {
        self.cidr.as_deref().unwrap_or(DEFAULT_SOURCE_RANGE)
    }

    /// Checks the bounds for port-carrying protocols.
    ///
    /// # Errors
    ///
    /// Returns [`PortRangeError::Inverted`] or [`PortRangeError::ZeroPort`].
    pub fn validate(&self) -> Result<(), PortRangeError> {
        if !self.protocol.has_ports() {
            return Ok(());
        }
        if self.from_port == 0 {
            return Err(PortRangeError::ZeroPort(self.protocol));
        }
        if self.from_port > self.to_port {
            return Err(PortRangeError::Inverted {
                from: self.from_port,
                to: self.to_port,
            });
        }
        Ok(())
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.protocol.has_ports() {
            return f.write_str(self.protocol.as_str());
        }
        if self.from_port == self.to_port {
            write!(f, "{}/{}", self.from_port, self.protocol)
        } else {
            write!(f, "{}-{}/{}", self.from_port, self.to_port, self.protocol)
        }
    }
}

impl FromStr for PortRange {
    type Err = PortRangeError;

    /// Accepts `80`, `80/udp`, `8000-8080/tcp`, and `icmp`. The protocol
    /// defaults to tcp.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("icmp") {
            return Ok(Self::icmp());
        }
        let (ports, protocol) = match trimmed.split_once('/') {
            Some((ports, protocol)) => (ports, protocol.parse::<Protocol>()?),
            None => (trimmed, Protocol::Tcp),
        };
        if protocol == Protocol::Icmp {
            return Err(PortRangeError::Malformed(trimmed.to_owned()));
        }
        let parse_port = |text: &str| {
            text.trim()
                .parse::<u16>()
                .map_err(|_| PortRangeError::Malformed(trimmed.to_owned()))
        };
        let (from_port, to_port) = match ports.split_once('-') {
            Some((from, to)) => (parse_port(from)?, parse_port(to)?),
            None => {
                let port = parse_port(ports)?;
                (port, port)
            }
        };
        Self::new(protocol, from_port, to_port)
    }
}

/// Rule representation understood by network backends.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub struct BackendRule {
    /// Protocol of the rule.
    pub protocol: Protocol,
    /// Lower port bound; `None` for ICMP.
    pub port_from: Option<u16>,
    /// Upper port bound; `None` for ICMP.
    pub port_to: Option<u16>,
    /// Source CIDR.
    pub ip_range: String,
}

impl fmt::Display for BackendRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.port_from, self.port_to) {
            (Some(from), Some(to)) if from == to => {
                write!(f, "{from}/{} from {}", self.protocol, self.ip_range)
            }
            (Some(from), Some(to)) => {
                write!(f, "{from}-{to}/{} from {}", self.protocol, self.ip_range)
            }
            _ => write!(f, "{} from {}", self.protocol, self.ip_range),
        }
    }
}

/// Converts a port range into the backend's rule representation.
#[must_use]
pub fn to_rule(range: &PortRange) -> BackendRule {
    let (port_from, port_to) = if range.protocol.has_ports() {
        (Some(range.from_port), Some(range.to_port))
    } else {
        (None, None)
    };
    BackendRule {
        protocol: range.protocol,
        port_from,
        port_to,
        ip_range: range.source_range().to_owned(),
    }
}

/// Converts every range, preserving order.
#[must_use]
pub fn ports_to_rules(ranges: &[PortRange]) -> Vec<BackendRule> {
    ranges.iter().map(to_rule).collect()
}

/// Returns `true` when `rule` opens exactly `range`.
///
/// Port-carrying rules without both bounds never match.
#[must_use]
pub fn rule_matches_port_range(rule: &BackendRule, range: &PortRange) -> bool {
    if rule.protocol != range.protocol || rule.ip_range != range.source_range() {
        return false;
    }
    if !range.protocol.has_ports() {
        return true;
    }
    rule.port_from == Some(range.from_port) && rule.port_to == Some(range.to_port)
}
