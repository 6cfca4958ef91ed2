//! Network control-plane abstraction consumed by the security-group
//! reconciler.

use std::future::Future;
use std::pin::Pin;

use thiserror::Error;

use crate::firewall::BackendRule;

/// Rule as reported by the backend for an existing group.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecurityGroupRule {
    /// Provider specific rule identifier.
    pub id: String,
    /// Protocol, bounds, and source range of the rule.
    pub rule: BackendRule,
}

/// Security group observed on the backend.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SecurityGroup {
    /// Provider specific group identifier.
    pub id: String,
    /// Unique group name used for lookups.
    pub name: String,
    /// Ingress rules currently attached to the group.
    pub rules: Vec<SecurityGroupRule>,
}

impl SecurityGroup {
    /// Creates a group with no rules.
    #[must_use]
    pub fn empty(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            rules: Vec::new(),
        }
    }

    /// Iterates over the backend rules without their identifiers.
    pub fn backend_rules(&self) -> impl Iterator<Item = &BackendRule> {
        self.rules.iter().map(|entry| &entry.rule)
    }
}

/// Errors raised by network backends.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum NetworkError {
    /// Raised when the addressed group or server does not exist.
    #[error("{name} not found")]
    NotFound {
        /// Name or identifier used for the lookup.
        name: String,
    },
    /// Raised when creating a group whose name is already taken.
    #[error("security group {name} already exists")]
    AlreadyExists {
        /// Group name that collided.
        name: String,
    },
    /// Raised when adding a rule the group already carries.
    #[error("rule {rule} already present in group {group_id}")]
    RuleExists {
        /// Group that already holds the rule.
        group_id: String,
        /// Human readable rendering of the rule.
        rule: String,
    },
    /// Opaque failure reported by the control plane.
    #[error("network backend error: {message}")]
    Backend {
        /// Message returned by the provider.
        message: String,
    },
}

impl NetworkError {
    /// Builds a [`NetworkError::Backend`] from any displayable error.
    pub fn backend(message: impl ToString) -> Self {
        Self::Backend {
            message: message.to_string(),
        }
    }
}

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by network control planes.
///
/// Every call is a single request; retries and timeouts belong to the
/// implementation's transport, not to callers of this trait.
pub trait NetworkBackend {
    /// Looks up a group by name, returning `None` when no such group exists.
    fn group_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> BackendFuture<'a, Option<SecurityGroup>, NetworkError>;

    /// Creates an empty group. Fails with [`NetworkError::AlreadyExists`]
    /// when the name is taken.
    fn create_group<'a>(&'a self, name: &'a str) -> BackendFuture<'a, SecurityGroup, NetworkError>;

    /// Adds one ingress rule. Fails with [`NetworkError::RuleExists`] when the
    /// group already holds an identical rule.
    fn add_rule<'a>(
        &'a self,
        group_id: &'a str,
        rule: &'a BackendRule,
    ) -> BackendFuture<'a, SecurityGroupRule, NetworkError>;

    /// Deletes the group and all of its rules.
    fn delete_group<'a>(&'a self, group_id: &'a str) -> BackendFuture<'a, (), NetworkError>;
}

impl<T: NetworkBackend + Sync + ?Sized> NetworkBackend for &T {
    fn group_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> BackendFuture<'a, Option<SecurityGroup>, NetworkError> {
        (**self).group_by_name(name)
    }

    fn create_group<'a>(&'a self, name: &'a str) -> BackendFuture<'a, SecurityGroup, NetworkError> {
        (**self).create_group(name)
    }

    fn add_rule<'a>(
        &'a self,
        group_id: &'a str,
        rule: &'a BackendRule,
    ) -> BackendFuture<'a, SecurityGroupRule, NetworkError> {
        (**self).add_rule(group_id, rule)
    }

    fn delete_group<'a>(&'a self, group_id: &'a str) -> BackendFuture<'a, (), NetworkError> {
        (**self).delete_group(group_id)
    }
}
