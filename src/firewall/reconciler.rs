//! Convergence of named security groups towards a desired rule set.

use tracing::{debug, info};

use crate::backend::{NetworkBackend, NetworkError, SecurityGroup};

use super::rules::{PortRange, rule_matches_port_range, to_rule};
use super::SecurityGroupSpec;

/// SSH port opened by the global group.
pub const SSH_PORT: u16 = 22;

/// Ensures security groups carry the rules callers ask for.
///
/// Reconciliation is additive: rules outside the desired set are left alone
/// and only [`SecurityGroupReconciler::discard_group`] removes anything. The
/// read-diff-apply sequence is not atomic, so concurrent calls for the same
/// group name must be serialised by the caller.
#[derive(Clone, Debug)]
pub struct SecurityGroupReconciler<B: NetworkBackend> {
    backend: B,
}

impl<B: NetworkBackend> SecurityGroupReconciler<B> {
    /// Creates a reconciler over the given backend.
    #[must_use]
    pub const fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Returns the backend used for reconciliation.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Makes sure the group `name` exists and carries every rule in
    /// `desired`, creating the group when absent.
    ///
    /// Rules the backend reports as already present count as applied.
    ///
    /// # Errors
    ///
    /// Propagates any [`NetworkError`] other than the duplicate-group and
    /// duplicate-rule responses.
    pub async fn ensure_group(
        &self,
        name: &str,
        desired: &[PortRange],
    ) -> Result<SecurityGroup, NetworkError> {
        let mut group = self.lookup_or_create(name).await?;
        let mut refresh = false;

        for range in desired {
            if group
                .backend_rules()
                .any(|rule| rule_matches_port_range(rule, range))
            {
                debug!(group = %group.name, %range, "rule already present");
                continue;
            }

            let rule = to_rule(range);
            match self.backend.add_rule(&group.id, &rule).await {
                Ok(added) => {
                    info!(group = %group.name, %rule, "added ingress rule");
                    group.rules.push(added);
                }
                Err(NetworkError::RuleExists { .. }) => {
                    debug!(group = %group.name, %rule, "backend already holds rule");
                    refresh = true;
                }
                Err(err) => return Err(err),
            }
        }

        if refresh {
            return self
                .find_group(name)
                .await?
                .ok_or_else(|| NetworkError::NotFound {
                    name: name.to_owned(),
                });
        }
        Ok(group)
    }

    /// Ensures the group described by `spec`.
    ///
    /// # Errors
    ///
    /// See [`SecurityGroupReconciler::ensure_group`].
    pub async fn ensure_spec(&self, spec: &SecurityGroupSpec) -> Result<SecurityGroup, NetworkError> {
        self.ensure_group(&spec.name, &spec.rules).await
    }

    /// Ensures the shared group every machine joins: SSH, all ICMP, and the
    /// controller API port.
    ///
    /// # Errors
    ///
    /// See [`SecurityGroupReconciler::ensure_group`].
    pub async fn set_up_global_group(
        &self,
        name: &str,
        api_port: u16,
    ) -> Result<SecurityGroup, NetworkError> {
        let rules = [
            PortRange::tcp(SSH_PORT),
            PortRange::icmp(),
            PortRange::tcp(api_port),
        ];
        self.ensure_group(name, &rules).await
    }

    /// Deletes the group `name`. Deleting a group that does not exist is
    /// not an error.
    ///
    /// # Errors
    ///
    /// Propagates backend failures other than [`NetworkError::NotFound`].
    pub async fn discard_group(&self, name: &str) -> Result<(), NetworkError> {
        let Some(group) = self.find_group(name).await? else {
            debug!(group = name, "group already absent");
            return Ok(());
        };

        match self.backend.delete_group(&group.id).await {
            Ok(()) => {
                info!(group = name, id = %group.id, "deleted security group");
                Ok(())
            }
            Err(NetworkError::NotFound { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    async fn find_group(&self, name: &str) -> Result<Option<SecurityGroup>, NetworkError> {
        match self.backend.group_by_name(name).await {
            Ok(group) => Ok(group),
            Err(NetworkError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn lookup_or_create(&self, name: &str) -> Result<SecurityGroup, NetworkError> {
        if let Some(group) = self.find_group(name).await? {
            return Ok(group);
        }

        match self.backend.create_group(name).await {
            Ok(group) => {
                info!(group = name, id = %group.id, "created security group");
                Ok(group)
            }
            Err(NetworkError::AlreadyExists { .. }) => {
                debug!(group = name, "group created concurrently; reloading");
                self.find_group(name)
                    .await?
                    .ok_or_else(|| NetworkError::NotFound {
                        name: name.to_owned(),
                    })
            }
            Err(err) => Err(err),
        }
    }
}
