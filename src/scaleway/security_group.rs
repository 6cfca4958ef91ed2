//! Security group calls against the Scaleway Instances API.

use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::{
    BackendFuture, NetworkBackend, NetworkError, SecurityGroup, SecurityGroupRule,
};
use crate::firewall::{BackendRule, Protocol};

use super::types::SecurityGroupId;
use super::{HTTP_CLIENT, ScalewayNetwork};

const PAGE_SIZE: u32 = 100;
const INBOUND: &str = "inbound";
const ACCEPT: &str = "accept";

#[derive(Deserialize)]
struct GroupBody {
    id: String,
    name: String,
}

#[derive(Deserialize)]
struct ListGroupsResponse {
    #[serde(default)]
    security_groups: Vec<GroupBody>,
}

#[derive(Deserialize)]
struct CreateGroupResponse {
    security_group: GroupBody,
}

#[derive(Serialize)]
struct CreateGroupRequest<'a> {
    name: &'a str,
    project: &'a str,
    description: &'a str,
    stateful: bool,
    inbound_default_policy: &'a str,
    outbound_default_policy: &'a str,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
struct RuleBody {
    id: String,
    protocol: String,
    direction: String,
    action: String,
    ip_range: String,
    dest_port_from: Option<u16>,
    dest_port_to: Option<u16>,
}

#[derive(Deserialize)]
struct ListRulesResponse {
    #[serde(default)]
    rules: Vec<RuleBody>,
    #[serde(default)]
    total_count: u32,
}

#[derive(Deserialize)]
struct CreateRuleResponse {
    rule: RuleBody,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
struct CreateRuleRequest<'a> {
    protocol: &'static str,
    direction: &'static str,
    action: &'static str,
    ip_range: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    dest_port_from: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dest_port_to: Option<u16>,
}

impl<'a> CreateRuleRequest<'a> {
    fn inbound(rule: &'a BackendRule) -> Self {
        let dest_port_to = match (rule.port_from, rule.port_to) {
            (Some(from), Some(to)) if to != from => Some(to),
            _ => None,
        };
        Self {
            protocol: match rule.protocol {
                Protocol::Tcp => "TCP",
                Protocol::Udp => "UDP",
                Protocol::Icmp => "ICMP",
            },
            direction: INBOUND,
            action: ACCEPT,
            ip_range: &rule.ip_range,
            dest_port_from: rule.port_from,
            dest_port_to,
        }
    }
}

impl RuleBody {
    /// Converts an inbound accept rule; other rules have no counterpart.
    fn into_backend_rule(self) -> Option<SecurityGroupRule> {
        if self.direction != INBOUND || self.action != ACCEPT {
            return None;
        }
        let protocol: Protocol = self.protocol.parse().ok()?;
        let (port_from, port_to) = if protocol == Protocol::Icmp {
            (None, None)
        } else {
            let from = self.dest_port_from?;
            (Some(from), Some(self.dest_port_to.unwrap_or(from)))
        };
        Some(SecurityGroupRule {
            id: self.id,
            rule: BackendRule {
                protocol,
                port_from,
                port_to,
                ip_range: self.ip_range,
            },
        })
    }
}

struct Reply {
    status: StatusCode,
    body: Vec<u8>,
}

impl Reply {
    fn json<T: DeserializeOwned>(&self) -> Result<T, NetworkError> {
        serde_json::from_slice(&self.body).map_err(NetworkError::backend)
    }

    fn failure(&self) -> NetworkError {
        NetworkError::Backend {
            message: format!("{}: {}", self.status, String::from_utf8_lossy(&self.body)),
        }
    }
}

impl ScalewayNetwork {
    async fn send(&self, request: RequestBuilder) -> Result<Reply, NetworkError> {
        let response = request
            .header("X-Auth-Token", &self.config.secret_key)
            .send()
            .await
            .map_err(NetworkError::backend)?;
        let status = response.status();
        let body = response.bytes().await.map_err(NetworkError::backend)?;
        Ok(Reply {
            status,
            body: body.to_vec(),
        })
    }

    async fn find_group(&self, name: &str) -> Result<Option<SecurityGroup>, NetworkError> {
        let mut query = vec![
            ("name", name.to_owned()),
            ("project", self.config.default_project_id.clone()),
            ("per_page", PAGE_SIZE.to_string()),
        ];
        if let Some(organization) = &self.config.default_organization_id {
            query.push(("organization", organization.clone()));
        }
        let reply = self
            .send(HTTP_CLIENT.get(self.zone_url("security_groups")).query(&query))
            .await?;
        if !reply.status.is_success() {
            return Err(reply.failure());
        }

        let listed: ListGroupsResponse = reply.json()?;
        // The name filter matches substrings.
        let Some(group) = listed
            .security_groups
            .into_iter()
            .find(|group| group.name == name)
        else {
            return Ok(None);
        };
        let group_id = SecurityGroupId::from(group.id);
        let rules = self.list_rules(&group_id).await?;
        Ok(Some(SecurityGroup {
            id: group_id.as_str().to_owned(),
            name: group.name,
            rules,
        }))
    }

    async fn list_rules(
        &self,
        group_id: &SecurityGroupId,
    ) -> Result<Vec<SecurityGroupRule>, NetworkError> {
        let url = self.zone_url(&format!("security_groups/{group_id}/rules"));
        let mut rules = Vec::new();
        let mut seen: u32 = 0;
        let mut page: u32 = 1;
        loop {
            let reply = self
                .send(HTTP_CLIENT.get(&url).query(&[
                    ("page", page.to_string()),
                    ("per_page", PAGE_SIZE.to_string()),
                ]))
                .await?;
            if reply.status == StatusCode::NOT_FOUND {
                return Err(NetworkError::NotFound {
                    name: group_id.to_string(),
                });
            }
            if !reply.status.is_success() {
                return Err(reply.failure());
            }
            let listed: ListRulesResponse = reply.json()?;
            let fetched = u32::try_from(listed.rules.len()).unwrap_or(u32::MAX);
            seen = seen.saturating_add(fetched);
            rules.extend(
                listed
                    .rules
                    .into_iter()
                    .filter_map(RuleBody::into_backend_rule),
            );
            if fetched == 0 || seen >= listed.total_count {
                return Ok(rules);
            }
            page += 1;
        }
    }

    async fn create(&self, name: &str) -> Result<SecurityGroup, NetworkError> {
        let payload = CreateGroupRequest {
            name,
            project: &self.config.default_project_id,
            description: "managed by stratus",
            stateful: true,
            inbound_default_policy: "drop",
            outbound_default_policy: "accept",
        };
        let reply = self
            .send(HTTP_CLIENT.post(self.zone_url("security_groups")).json(&payload))
            .await?;
        if reply.status == StatusCode::CONFLICT {
            return Err(NetworkError::AlreadyExists {
                name: name.to_owned(),
            });
        }
        if !reply.status.is_success() {
            return Err(reply.failure());
        }
        let created: CreateGroupResponse = reply.json()?;
        debug!(group = name, id = %created.security_group.id, zone = %self.zone, "created group");
        Ok(SecurityGroup::empty(
            created.security_group.id,
            created.security_group.name,
        ))
    }

    async fn create_rule(
        &self,
        group_id: &SecurityGroupId,
        rule: &BackendRule,
    ) -> Result<SecurityGroupRule, NetworkError> {
        let url = self.zone_url(&format!("security_groups/{group_id}/rules"));
        let reply = self
            .send(HTTP_CLIENT.post(url).json(&CreateRuleRequest::inbound(rule)))
            .await?;
        match reply.status {
            StatusCode::CONFLICT => Err(NetworkError::RuleExists {
                group_id: group_id.to_string(),
                rule: rule.to_string(),
            }),
            StatusCode::NOT_FOUND => Err(NetworkError::NotFound {
                name: group_id.to_string(),
            }),
            status if status.is_success() => {
                let created: CreateRuleResponse = reply.json()?;
                Ok(SecurityGroupRule {
                    id: created.rule.id,
                    rule: rule.clone(),
                })
            }
            _ => Err(reply.failure()),
        }
    }

    async fn delete(&self, group_id: &SecurityGroupId) -> Result<(), NetworkError> {
        let url = self.zone_url(&format!("security_groups/{group_id}"));
        let reply = self.send(HTTP_CLIENT.delete(url)).await?;
        match reply.status {
            StatusCode::NOT_FOUND => Err(NetworkError::NotFound {
                name: group_id.to_string(),
            }),
            status if status.is_success() => Ok(()),
            _ => Err(reply.failure()),
        }
    }
}

impl NetworkBackend for ScalewayNetwork {
    fn group_by_name<'a>(
        &'a self,
        name: &'a str,
    ) -> BackendFuture<'a, Option<SecurityGroup>, NetworkError> {
        Box::pin(async move { self.find_group(name).await })
    }

    fn create_group<'a>(&'a self, name: &'a str) -> BackendFuture<'a, SecurityGroup, NetworkError> {
        Box::pin(async move { self.create(name).await })
    }

    fn add_rule<'a>(
        &'a self,
        group_id: &'a str,
        rule: &'a BackendRule,
    ) -> BackendFuture<'a, SecurityGroupRule, NetworkError> {
        Box::pin(async move {
            self.create_rule(&SecurityGroupId::from(group_id), rule)
                .await
        })
    }

    fn delete_group<'a>(&'a self, group_id: &'a str) -> BackendFuture<'a, (), NetworkError> {
        Box::pin(async move { self.delete(&SecurityGroupId::from(group_id)).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn rule_body(protocol: &str, from: Option<u16>, to: Option<u16>) -> RuleBody {
        RuleBody {
            id: String::from("rule-1"),
            protocol: protocol.to_owned(),
            direction: String::from(INBOUND),
            action: String::from(ACCEPT),
            ip_range: String::from("0.0.0.0/0"),
            dest_port_from: from,
            dest_port_to: to,
        }
    }

    #[rstest]
    #[case::single_port(rule_body("TCP", Some(22), None), Some((Protocol::Tcp, Some(22), Some(22))))]
    #[case::range(rule_body("UDP", Some(8000), Some(8080)), Some((Protocol::Udp, Some(8000), Some(8080))))]
    #[case::icmp(rule_body("ICMP", None, None), Some((Protocol::Icmp, None, None)))]
    #[case::any_protocol(rule_body("ANY", None, None), None)]
    fn converts_inbound_rules(
        #[case] body: RuleBody,
        #[case] expected: Option<(Protocol, Option<u16>, Option<u16>)>,
    ) {
        let converted = body
            .into_backend_rule()
            .map(|entry| (entry.rule.protocol, entry.rule.port_from, entry.rule.port_to));
        assert_eq!(converted, expected);
    }

    #[test]
    fn skips_outbound_rules() {
        let body = RuleBody {
            direction: String::from("outbound"),
            ..rule_body("TCP", Some(443), None)
        };
        assert!(body.into_backend_rule().is_none());
    }

    #[test]
    fn single_port_request_omits_upper_bound() {
        let rule = BackendRule {
            protocol: Protocol::Tcp,
            port_from: Some(22),
            port_to: Some(22),
            ip_range: String::from("0.0.0.0/0"),
        };
        let payload = serde_json::to_value(CreateRuleRequest::inbound(&rule)).expect("serialise");
        assert_eq!(
            payload,
            serde_json::json!({
                "protocol": "TCP",
                "direction": "inbound",
                "action": "accept",
                "ip_range": "0.0.0.0/0",
                "dest_port_from": 22,
            })
        );
    }

    #[test]
    fn icmp_request_has_no_ports() {
        let rule = BackendRule {
            protocol: Protocol::Icmp,
            port_from: None,
            port_to: None,
            ip_range: String::from("10.0.0.0/8"),
        };
        let request = CreateRuleRequest::inbound(&rule);
        assert_eq!(request.protocol, "ICMP");
        assert_eq!(request.dest_port_from, None);
        assert_eq!(request.dest_port_to, None);
    }
}
