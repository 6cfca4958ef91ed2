//! Unit tests for port rule translation and group reconciliation.

use super::*;
use crate::backend::NetworkError;
use crate::test_support::{FakeNetwork, NetworkCall, NetworkOp};
use rstest::{fixture, rstest};

#[fixture]
fn network() -> FakeNetwork {
    FakeNetwork::new()
}

#[rstest]
#[case("80", PortRange::tcp(80))]
#[case("53/udp", PortRange::udp(53))]
#[case("ICMP", PortRange::icmp())]
#[case(" 8000-8080/tcp ", PortRange { protocol: Protocol::Tcp, from_port: 8000, to_port: 8080, cidr: None })]
fn parses_port_ranges(#[case] text: &str, #[case] expected: PortRange) {
    assert_eq!(text.parse::<PortRange>().expect("parse"), expected);
}

#[rstest]
#[case("90-80/tcp", PortRangeError::Inverted { from: 90, to: 80 })]
#[case("0/udp", PortRangeError::ZeroPort(Protocol::Udp))]
#[case("22/sctp", PortRangeError::UnknownProtocol(String::from("sctp")))]
#[case("ssh", PortRangeError::Malformed(String::from("ssh")))]
#[case("8/icmp", PortRangeError::Malformed(String::from("8/icmp")))]
fn rejects_malformed_ranges(#[case] text: &str, #[case] expected: PortRangeError) {
    assert_eq!(text.parse::<PortRange>().expect_err("invalid"), expected);
}

#[rstest]
#[case(PortRange::tcp(22), "22/tcp")]
#[case(PortRange::new(Protocol::Udp, 60000, 61000).expect("range"), "60000-61000/udp")]
#[case(PortRange::icmp(), "icmp")]
fn displays_ranges(#[case] range: PortRange, #[case] expected: &str) {
    assert_eq!(range.to_string(), expected);
}

#[rstest]
fn icmp_rule_carries_no_ports() {
    let rule = to_rule(&PortRange::icmp());
    assert_eq!(rule.port_from, None);
    assert_eq!(rule.port_to, None);
    assert_eq!(rule.ip_range, DEFAULT_SOURCE_RANGE);
}

#[rstest]
#[case(PortRange::tcp(22))]
#[case(PortRange::udp(53).with_cidr("10.0.0.0/8"))]
#[case(PortRange::new(Protocol::Tcp, 8000, 8080).expect("range"))]
#[case(PortRange::icmp().with_cidr("192.168.0.0/16"))]
fn translated_rules_match_their_range(#[case] range: PortRange) {
    assert!(rule_matches_port_range(&to_rule(&range), &range));
}

#[rstest]
fn rules_differing_in_any_field_do_not_match() {
    let range = PortRange::tcp(22);
    let rule = to_rule(&range);

    let other_port = BackendRule {
        port_to: Some(23),
        ..rule.clone()
    };
    let other_protocol = BackendRule {
        protocol: Protocol::Udp,
        ..rule.clone()
    };
    let other_source = BackendRule {
        ip_range: String::from("10.0.0.0/8"),
        ..rule.clone()
    };
    let missing_bound = BackendRule {
        port_to: None,
        ..rule
    };

    for candidate in [other_port, other_protocol, other_source, missing_bound] {
        assert!(
            !rule_matches_port_range(&candidate, &range),
            "{candidate} should not match {range}"
        );
    }
}

#[rstest]
fn ports_to_rules_preserves_order() {
    let rules = ports_to_rules(&[PortRange::tcp(443), PortRange::icmp()]);
    let protocols: Vec<Protocol> = rules.iter().map(|rule| rule.protocol).collect();
    assert_eq!(protocols, [Protocol::Tcp, Protocol::Icmp]);
}

#[rstest]
fn spec_trims_group_name() {
    let spec = SecurityGroupSpec::new("  web  ", [PortRange::tcp(80)]);
    assert_eq!(spec.name, "web");
    assert_eq!(spec.rules.len(), 1);
}

#[rstest]
#[tokio::test]
async fn ensure_creates_group_with_rules(network: FakeNetwork) {
    let reconciler = SecurityGroupReconciler::new(&network);

    let group = reconciler
        .ensure_group("web", &[PortRange::tcp(80), PortRange::tcp(443)])
        .await
        .expect("ensure");

    assert_eq!(group.name, "web");
    assert_eq!(group.rules.len(), 2);
    assert_eq!(network.group("web"), Some(group));
}

#[rstest]
#[tokio::test]
async fn ensure_adds_only_missing_rules(network: FakeNetwork) {
    network.seed_group("web", &[to_rule(&PortRange::tcp(80))]);
    let reconciler = SecurityGroupReconciler::new(&network);

    let group = reconciler
        .ensure_group("web", &[PortRange::tcp(80), PortRange::tcp(443)])
        .await
        .expect("ensure");

    assert_eq!(group.rules.len(), 2);
    assert_eq!(network.add_rule_calls(), 1);
    assert!(!network
        .calls()
        .iter()
        .any(|call| matches!(call, NetworkCall::CreateGroup(_))));
}

#[rstest]
#[tokio::test]
async fn ensure_keeps_rules_outside_the_desired_set(network: FakeNetwork) {
    let extra = to_rule(&PortRange::udp(53));
    network.seed_group("web", &[extra.clone()]);
    let reconciler = SecurityGroupReconciler::new(&network);

    let group = reconciler
        .ensure_group("web", &[PortRange::tcp(80)])
        .await
        .expect("ensure");

    assert!(group.backend_rules().any(|rule| *rule == extra));
    assert_eq!(group.rules.len(), 2);
}

#[rstest]
#[tokio::test]
async fn duplicate_desired_ranges_add_once(network: FakeNetwork) {
    let reconciler = SecurityGroupReconciler::new(&network);

    reconciler
        .ensure_group("web", &[PortRange::tcp(80), PortRange::tcp(80)])
        .await
        .expect("ensure");

    assert_eq!(network.add_rule_calls(), 1);
}

#[rstest]
#[tokio::test]
async fn concurrent_create_reloads_existing_group(network: FakeNetwork) {
    let existing = network.seed_group("web", &[]);
    network.hide_next_lookup();
    let reconciler = SecurityGroupReconciler::new(&network);

    let group = reconciler
        .ensure_group("web", &[PortRange::tcp(22)])
        .await
        .expect("ensure");

    assert_eq!(group.id, existing.id);
    assert_eq!(group.rules.len(), 1);
}

#[rstest]
#[tokio::test]
async fn rule_exists_counts_as_applied(network: FakeNetwork) {
    let group = network.seed_group("web", &[]);
    network.fail_next(
        NetworkOp::AddRule,
        NetworkError::RuleExists {
            group_id: group.id.clone(),
            rule: String::from("22/tcp from 0.0.0.0/0"),
        },
    );
    let reconciler = SecurityGroupReconciler::new(&network);

    let ensured = reconciler
        .ensure_group("web", &[PortRange::tcp(22), PortRange::tcp(80)])
        .await
        .expect("ensure");

    assert_eq!(ensured.id, group.id);
    assert_eq!(network.add_rule_calls(), 2);
}

#[rstest]
#[tokio::test]
async fn backend_failures_propagate(network: FakeNetwork) {
    let failure = NetworkError::backend("quota exceeded");
    network.fail_next(NetworkOp::AddRule, failure.clone());
    let reconciler = SecurityGroupReconciler::new(&network);

    let err = reconciler
        .ensure_group("web", &[PortRange::tcp(22)])
        .await
        .expect_err("add fails");

    assert_eq!(err, failure);
}

#[rstest]
#[tokio::test]
async fn global_group_opens_ssh_icmp_and_api_port(network: FakeNetwork) {
    let reconciler = SecurityGroupReconciler::new(&network);

    let group = reconciler
        .set_up_global_group("global", 17070)
        .await
        .expect("global group");

    for range in [PortRange::tcp(SSH_PORT), PortRange::icmp(), PortRange::tcp(17070)] {
        assert!(
            group
                .backend_rules()
                .any(|rule| rule_matches_port_range(rule, &range)),
            "missing {range}"
        );
    }
}

#[rstest]
#[tokio::test]
async fn discard_deletes_existing_group(network: FakeNetwork) {
    let group = network.seed_group("web", &[]);
    let reconciler = SecurityGroupReconciler::new(&network);

    reconciler.discard_group("web").await.expect("discard");

    assert_eq!(network.group("web"), None);
    assert!(network
        .calls()
        .contains(&NetworkCall::DeleteGroup(group.id)));
}

#[rstest]
#[tokio::test]
async fn discard_tolerates_concurrent_delete(network: FakeNetwork) {
    network.seed_group("web", &[]);
    network.fail_next(
        NetworkOp::DeleteGroup,
        NetworkError::NotFound {
            name: String::from("web"),
        },
    );
    let reconciler = SecurityGroupReconciler::new(&network);

    reconciler.discard_group("web").await.expect("discard");
}

#[rstest]
#[tokio::test]
async fn discard_propagates_other_failures(network: FakeNetwork) {
    network.seed_group("web", &[]);
    let failure = NetworkError::backend("group in use");
    network.fail_next(NetworkOp::DeleteGroup, failure.clone());
    let reconciler = SecurityGroupReconciler::new(&network);

    let err = reconciler.discard_group("web").await.expect_err("delete fails");

    assert_eq!(err, failure);
}
