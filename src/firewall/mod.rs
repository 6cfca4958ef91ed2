//! Ingress rules and security-group reconciliation.

mod reconciler;
mod rules;

pub use reconciler::{SSH_PORT, SecurityGroupReconciler};
pub use rules::{
    BackendRule, DEFAULT_SOURCE_RANGE, PortRange, PortRangeError, Protocol, ports_to_rules,
    rule_matches_port_range, to_rule,
};

/// Desired state for one named group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecurityGroupSpec {
    /// Group name.
    pub name: String,
    /// Port ranges the group must open.
    pub rules: Vec<PortRange>,
}

impl SecurityGroupSpec {
    /// Creates a spec from a name and ranges.
    #[must_use]
    pub fn new(name: impl Into<String>, rules: impl IntoIterator<Item = PortRange>) -> Self {
        Self {
            name: name.into().trim().to_owned(),
            rules: rules.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests;
