//! Security group convergence against an in-memory control plane.

#[path = "common/fixtures.rs"]
mod fixtures;

use fixtures::API_PORT;
use rstest::{fixture, rstest};
use stratus::firewall::{SSH_PORT, rule_matches_port_range};
use stratus::test_support::{FakeNetwork, NetworkCall};
use stratus::{PortRange, SecurityGroupReconciler, SecurityGroupSpec};

#[fixture]
fn network() -> FakeNetwork {
    FakeNetwork::new()
}

#[rstest]
#[tokio::test]
async fn global_group_converges_once(network: FakeNetwork) {
    let reconciler = SecurityGroupReconciler::new(&network);

    let first = reconciler
        .set_up_global_group("stratus-global", API_PORT)
        .await
        .expect("first run");
    network.clear_calls();
    let second = reconciler
        .set_up_global_group("stratus-global", API_PORT)
        .await
        .expect("second run");

    assert_eq!(first.id, second.id);
    assert_eq!(second.rules.len(), 3);
    assert_eq!(network.add_rule_calls(), 0);
    assert!(
        !network
            .calls()
            .iter()
            .any(|call| matches!(call, NetworkCall::CreateGroup(_)))
    );
}

#[rstest]
#[tokio::test]
async fn specs_open_every_requested_range(network: FakeNetwork) {
    let reconciler = SecurityGroupReconciler::new(&network);
    let ranges = [
        PortRange::tcp(SSH_PORT),
        "8000-8080/tcp".parse().expect("range"),
        PortRange::udp(53).with_cidr("10.0.0.0/8"),
    ];
    let spec = SecurityGroupSpec::new("workload", ranges.clone());

    let group = reconciler.ensure_spec(&spec).await.expect("ensure");

    for range in &ranges {
        assert!(
            group
                .backend_rules()
                .any(|rule| rule_matches_port_range(rule, range)),
            "missing {range}"
        );
    }
}

#[rstest]
#[tokio::test]
async fn discarding_an_absent_group_succeeds(network: FakeNetwork) {
    let reconciler = SecurityGroupReconciler::new(&network);

    reconciler.discard_group("never-created").await.expect("discard");

    assert_eq!(
        network.calls(),
        [NetworkCall::GroupByName(String::from("never-created"))]
    );
}

#[rstest]
#[tokio::test]
async fn reconcilers_on_one_backend_share_a_group(network: FakeNetwork) {
    let left = SecurityGroupReconciler::new(network.clone());
    let right = SecurityGroupReconciler::new(network.clone());

    let left_ports = [PortRange::tcp(80)];
    let right_ports = [PortRange::tcp(443)];
    let (first, second) = tokio::join!(
        left.ensure_group("shared", &left_ports),
        right.ensure_group("shared", &right_ports),
    );

    let first_group = first.expect("left");
    let second_group = second.expect("right");
    assert_eq!(first_group.id, second_group.id);
    let stored = network.group("shared").expect("group stored");
    assert_eq!(stored.rules.len(), 2);
}
