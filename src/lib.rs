//! Instance placement and network exposure for a cloud-provider agent.
//!
//! The crate resolves placement constraints into a concrete image and
//! instance type using a published image catalog, chooses the address a
//! provisioned machine is reached on, and converges named security groups
//! towards the ingress rules a workload needs. A Scaleway adapter provides
//! the network control plane.

pub mod address;
pub mod backend;
pub mod catalog;
pub mod config;
pub mod firewall;
pub mod scaleway;
pub mod selector;
pub mod storage;
pub mod test_support;
pub mod watch;

pub use address::{Address, AddressError, AddressKind, AddressScope, select_public};
pub use backend::{NetworkBackend, NetworkError, SecurityGroup, SecurityGroupRule};
pub use catalog::{Catalog, CatalogError, ImageMetadataRecord, ParseError, load_catalog};
pub use config::{ConfigError, PlacementConfig, ScalewayConfig};
pub use firewall::{
    BackendRule, PortRange, Protocol, SecurityGroupReconciler, SecurityGroupSpec,
};
pub use scaleway::ScalewayNetwork;
pub use selector::{
    InstanceConstraint, InstanceSpec, InstanceSpecSelector, InstanceType, SelectError,
    SeriesTable,
};
pub use storage::{CatalogStore, DirStore, MemoryStore, StoreError};
pub use watch::StoreWatcher;
