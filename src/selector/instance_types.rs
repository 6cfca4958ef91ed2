//! Instance type table and constraint matching.

use super::constraint::ResourceConstraints;

/// Memory floor applied when the caller states no memory requirement and no
/// allow-list.
pub const DEFAULT_MIN_MEM_MIB: u64 = 1024;

/// One purchasable machine shape.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceType {
    /// Provider name, e.g. `DEV1-S`.
    pub name: String,
    /// Architectures the type can run.
    pub arches: Vec<String>,
    /// CPU core count.
    pub cpu_cores: u32,
    /// Memory in MiB.
    pub mem_mib: u64,
    /// Root disk in MiB, when fixed by the type.
    pub root_disk_mib: Option<u64>,
    /// Relative cost; lower is cheaper.
    pub cost: u64,
    /// Virtualisation type, when the type requires one.
    pub virt_type: Option<String>,
    /// Deprecated types are never selected.
    pub deprecated: bool,
}

impl InstanceType {
    /// Creates a non-deprecated type with no disk or virtualisation
    /// requirement.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        arches: &[&str],
        cpu_cores: u32,
        mem_mib: u64,
        cost: u64,
    ) -> Self {
        Self {
            name: name.into(),
            arches: arches.iter().map(|arch| (*arch).to_owned()).collect(),
            cpu_cores,
            mem_mib,
            root_disk_mib: None,
            cost,
            virt_type: None,
            deprecated: false,
        }
    }

    /// Sets the root disk size.
    #[must_use]
    pub const fn with_root_disk(mut self, root_disk_mib: u64) -> Self {
        self.root_disk_mib = Some(root_disk_mib);
        self
    }

    /// Sets the virtualisation type.
    #[must_use]
    pub fn with_virt_type(mut self, virt_type: impl Into<String>) -> Self {
        self.virt_type = Some(virt_type.into());
        self
    }

    /// Marks the type as deprecated.
    #[must_use]
    pub const fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    fn supports_image(&self, arch: &str, virt_type: Option<&str>) -> bool {
        if !self.arches.iter().any(|candidate| candidate == arch) {
            return false;
        }
        match (self.virt_type.as_deref(), virt_type) {
            (Some(required), Some(offered)) => required == offered,
            _ => true,
        }
    }

    fn satisfies(&self, resources: &ResourceConstraints, min_mem_mib: Option<u64>) -> bool {
        if self.deprecated {
            return false;
        }
        if let Some(allowed) = &resources.instance_types {
            if !allowed.contains(&self.name) {
                return false;
            }
        }
        if resources.cpu_cores.is_some_and(|cores| self.cpu_cores < cores) {
            return false;
        }
        if min_mem_mib.is_some_and(|mem| self.mem_mib < mem) {
            return false;
        }
        match resources.root_disk_mib {
            Some(disk) => self.root_disk_mib.is_none_or(|offered| offered >= disk),
            None => true,
        }
    }
}

/// Types able to run an image of `arch`/`virt_type` under `resources`,
/// cheapest first with table order preserved among equal costs.
///
/// Without a memory requirement or allow-list a floor of
/// [`DEFAULT_MIN_MEM_MIB`] applies; when nothing clears it the single
/// largest-memory type that otherwise matches is returned.
#[must_use]
pub fn matching_instance_types<'a>(
    types: &'a [InstanceType],
    arch: &str,
    virt_type: Option<&str>,
    resources: &ResourceConstraints,
) -> Vec<&'a InstanceType> {
    let runnable: Vec<&InstanceType> = types
        .iter()
        .filter(|candidate| candidate.supports_image(arch, virt_type))
        .collect();

    let apply_default = resources.mem_mib.is_none() && resources.instance_types.is_none();
    let mut matched: Vec<&InstanceType> = if apply_default {
        let with_floor: Vec<&InstanceType> = runnable
            .iter()
            .copied()
            .filter(|candidate| candidate.satisfies(resources, Some(DEFAULT_MIN_MEM_MIB)))
            .collect();
        if with_floor.is_empty() {
            largest_memory(&runnable, resources).into_iter().collect()
        } else {
            with_floor
        }
    } else {
        runnable
            .iter()
            .copied()
            .filter(|candidate| candidate.satisfies(resources, resources.mem_mib))
            .collect()
    };

    matched.sort_by_key(|candidate| candidate.cost);
    matched
}

fn largest_memory<'a>(
    runnable: &[&'a InstanceType],
    resources: &ResourceConstraints,
) -> Option<&'a InstanceType> {
    runnable
        .iter()
        .copied()
        .filter(|candidate| candidate.satisfies(resources, None))
        .fold(None, |best: Option<&InstanceType>, candidate| match best {
            Some(current) if current.mem_mib >= candidate.mem_mib => Some(current),
            _ => Some(candidate),
        })
}
