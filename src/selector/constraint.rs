//! Placement constraints and their validating builder.

use std::collections::BTreeSet;

use super::SelectError;

/// Compute requirements of a placement request.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ResourceConstraints {
    /// Minimum CPU core count.
    pub cpu_cores: Option<u32>,
    /// Minimum memory in MiB.
    pub mem_mib: Option<u64>,
    /// Minimum root disk size in MiB.
    pub root_disk_mib: Option<u64>,
    /// Instance type names the caller accepts; `None` accepts any.
    pub instance_types: Option<BTreeSet<String>>,
}

/// Placement request resolved by the selector.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceConstraint {
    series: String,
    architectures: BTreeSet<String>,
    region: String,
    resources: ResourceConstraints,
}

impl InstanceConstraint {
    /// Starts building a constraint.
    #[must_use]
    pub fn builder() -> InstanceConstraintBuilder {
        InstanceConstraintBuilder::new()
    }

    /// OS series codename.
    #[must_use]
    pub fn series(&self) -> &str {
        &self.series
    }

    /// Acceptable architectures.
    #[must_use]
    pub const fn architectures(&self) -> &BTreeSet<String> {
        &self.architectures
    }

    /// Region images must live in.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Compute requirements.
    #[must_use]
    pub const fn resources(&self) -> &ResourceConstraints {
        &self.resources
    }

    fn validate(&self) -> Result<(), SelectError> {
        if self.series.is_empty() {
            return Err(SelectError::invalid("series must not be empty"));
        }
        if self.region.is_empty() {
            return Err(SelectError::invalid("region must not be empty"));
        }
        if self.architectures.is_empty() {
            return Err(SelectError::invalid(
                "at least one architecture is required",
            ));
        }
        if self.architectures.iter().any(String::is_empty) {
            return Err(SelectError::invalid("architecture names must not be empty"));
        }
        if self.resources.cpu_cores == Some(0) {
            return Err(SelectError::invalid("cpu_cores must be positive"));
        }
        if self
            .resources
            .instance_types
            .as_ref()
            .is_some_and(BTreeSet::is_empty)
        {
            return Err(SelectError::invalid(
                "instance type allow-list must not be empty",
            ));
        }
        Ok(())
    }
}

/// Builder for [`InstanceConstraint`] that trims and validates on build.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct InstanceConstraintBuilder {
    series: String,
    architectures: Vec<String>,
    region: String,
    resources: ResourceConstraints,
}

impl InstanceConstraintBuilder {
    /// Creates an empty builder; series, region and at least one
    /// architecture must be set before build.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the OS series.
    #[must_use]
    pub fn series(mut self, value: impl Into<String>) -> Self {
        self.series = value.into();
        self
    }

    /// Adds an acceptable architecture.
    #[must_use]
    pub fn architecture(mut self, value: impl Into<String>) -> Self {
        self.architectures.push(value.into());
        self
    }

    /// Adds several acceptable architectures.
    #[must_use]
    pub fn architectures<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.architectures.extend(values.into_iter().map(Into::into));
        self
    }

    /// Sets the region.
    #[must_use]
    pub fn region(mut self, value: impl Into<String>) -> Self {
        self.region = value.into();
        self
    }

    /// Sets the minimum core count.
    #[must_use]
    pub const fn cpu_cores(mut self, value: u32) -> Self {
        self.resources.cpu_cores = Some(value);
        self
    }

    /// Sets the minimum memory in MiB.
    #[must_use]
    pub const fn mem_mib(mut self, value: u64) -> Self {
        self.resources.mem_mib = Some(value);
        self
    }

    /// Sets the minimum root disk in MiB.
    #[must_use]
    pub const fn root_disk_mib(mut self, value: u64) -> Self {
        self.resources.root_disk_mib = Some(value);
        self
    }

    /// Restricts selection to the named instance types.
    #[must_use]
    pub fn instance_types<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resources.instance_types = Some(
            values
                .into_iter()
                .map(|value| value.into().trim().to_owned())
                .collect(),
        );
        self
    }

    /// Builds and validates the constraint, trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`SelectError::InvalidConstraint`] when the series or region
    /// is empty, no architecture was given, `cpu_cores` is zero, or the
    /// instance type allow-list is empty.
    pub fn build(self) -> Result<InstanceConstraint, SelectError> {
        let constraint = InstanceConstraint {
            series: self.series.trim().to_owned(),
            architectures: self
                .architectures
                .iter()
                .map(|arch| arch.trim().to_owned())
                .collect(),
            region: self.region.trim().to_owned(),
            resources: self.resources,
        };
        constraint.validate()?;
        Ok(constraint)
    }
}
