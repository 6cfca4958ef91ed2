//! Server address lookup for the Scaleway adapter.

use std::collections::BTreeMap;

use scaleway_rs::ScalewayInstance;
use tracing::debug;

use crate::address::{
    Address, PRIVATE_NETWORK, PUBLIC_NETWORK, instance_addresses, select_public,
};
use crate::backend::NetworkError;

use super::ScalewayNetwork;
use super::types::ServerId;

/// Addresses a server reports, detached from the SDK listing.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
struct ServerAddressing {
    public_ip: Option<String>,
    public_ips: Vec<String>,
    ipv6: Option<String>,
    private_ip: Option<String>,
}

impl ServerAddressing {
    fn from_server(server: ScalewayInstance) -> Self {
        Self {
            public_ip: server.public_ip.map(|ip| ip.address),
            public_ips: server.public_ips.into_iter().map(|ip| ip.address).collect(),
            ipv6: server.ipv6.map(|ip| ip.address),
            private_ip: server.private_ip,
        }
    }

    /// Candidates with the primary public IP first. Additional public IPs,
    /// including IPv6, are labelled public; the private IP keeps its derived
    /// scope.
    fn candidates(&self) -> Vec<Address> {
        let mut networks: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let public: Vec<String> = self
            .public_ips
            .iter()
            .chain(self.ipv6.as_ref())
            .cloned()
            .collect();
        if !public.is_empty() {
            networks.insert(PUBLIC_NETWORK.to_owned(), public);
        }
        if let Some(private) = &self.private_ip {
            networks.insert(PRIVATE_NETWORK.to_owned(), vec![private.clone()]);
        }
        instance_addresses(self.public_ip.as_deref(), &networks)
    }
}

impl ScalewayNetwork {
    /// Candidate addresses of a server, its public IP first.
    ///
    /// # Errors
    ///
    /// Returns [`NetworkError::NotFound`] when the server does not exist and
    /// [`NetworkError::Backend`] when the API call fails.
    pub async fn server_addresses(&self, server_id: &str) -> Result<Vec<Address>, NetworkError> {
        let id = ServerId::from(server_id);
        let mut servers = self
            .api
            .list_instances(self.zone.as_str())
            .servers(id.as_str())
            .per_page(1)
            .run_async()
            .await
            .map_err(NetworkError::backend)?;

        let Some(server) = servers.pop() else {
            return Err(NetworkError::NotFound {
                name: id.to_string(),
            });
        };
        Ok(ServerAddressing::from_server(server).candidates())
    }

    /// Best externally reachable address of a server, if it has one.
    ///
    /// Private addresses are returned when the server has no public one.
    ///
    /// # Errors
    ///
    /// See [`ScalewayNetwork::server_addresses`].
    pub async fn public_address(&self, server_id: &str) -> Result<Option<Address>, NetworkError> {
        let candidates = self.server_addresses(server_id).await?;
        let chosen = select_public(&candidates).ok();
        debug!(
            server = server_id,
            candidates = candidates.len(),
            chosen = ?chosen,
            "resolved server address"
        );
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{AddressKind, AddressScope};
    use rstest::rstest;

    #[rstest]
    fn private_only_server_falls_back_to_private_address() {
        let addressing = ServerAddressing {
            private_ip: Some(String::from("10.1.2.3")),
            ..ServerAddressing::default()
        };

        let candidates = addressing.candidates();
        let chosen = select_public(&candidates).expect("private address qualifies");

        assert_eq!(chosen.value, "10.1.2.3");
        assert_eq!(chosen.scope, AddressScope::CloudLocal);
    }

    #[rstest]
    fn dual_stack_server_prefers_ipv4() {
        let addressing = ServerAddressing {
            public_ips: vec![
                String::from("2001:bc8:1234::1"),
                String::from("51.15.20.30"),
            ],
            private_ip: Some(String::from("10.1.2.3")),
            ..ServerAddressing::default()
        };

        let candidates = addressing.candidates();
        let chosen = select_public(&candidates).expect("public address");

        assert_eq!(chosen.value, "51.15.20.30");
        assert_eq!(chosen.kind, AddressKind::Ipv4);
        assert_eq!(candidates.len(), 3);
        assert!(
            candidates
                .iter()
                .filter(|address| address.value != "10.1.2.3")
                .all(|address| address.scope == AddressScope::Public)
        );
    }

    #[rstest]
    fn ipv6_only_server_uses_ipv6() {
        let addressing = ServerAddressing {
            ipv6: Some(String::from("2001:bc8:1234::9")),
            ..ServerAddressing::default()
        };

        let chosen = select_public(&addressing.candidates()).expect("ipv6 address");

        assert_eq!(chosen.kind, AddressKind::Ipv6);
        assert_eq!(chosen.scope, AddressScope::Public);
    }

    #[rstest]
    fn primary_public_ip_leads_and_is_not_repeated() {
        let addressing = ServerAddressing {
            public_ip: Some(String::from("51.15.20.30")),
            public_ips: vec![String::from("51.15.20.30"), String::from("51.15.20.31")],
            private_ip: Some(String::from("10.1.2.3")),
            ipv6: None,
        };

        let values: Vec<String> = addressing
            .candidates()
            .into_iter()
            .map(|address| address.value)
            .collect();

        assert_eq!(values, ["51.15.20.30", "10.1.2.3", "51.15.20.31"]);
    }

    #[rstest]
    fn server_without_addresses_has_no_candidates() {
        let candidates = ServerAddressing::default().candidates();
        assert!(candidates.is_empty());
        assert!(select_public(&candidates).is_err());
    }
}
