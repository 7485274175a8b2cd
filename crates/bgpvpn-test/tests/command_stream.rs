//! Command stream integration: the `bgpvpnd` input path end to end.

use bgpvpn_test::{BagpipeHarness, NotificationVerifier};
use pretty_assertions::assert_eq;

const SCRIPT: &str = r#"
# topology
{"command":"add_network","network":{"id":"n1","tenant_id":"tenant-a"}}
{"command":"add_subnet","subnet":{"id":"s1","network_id":"n1","cidr":"10.0.0.0/24","gateway_ip":"10.0.0.1"}}
{"command":"create_port","port":{"id":"p1","network_id":"n1","mac_address":"fa:16:3e:00:00:01","fixed_ips":[{"subnet_id":"s1","ip_address":"10.0.0.5"}],"device_owner":"compute:nova","status":"DOWN","host_id":"compute-7"}}

# api
{"command":"create_bgpvpn","bgpvpn":{"id":"b1","tenant_id":"tenant-a","type":"l3","route_targets":["64512:1"]}}
{"command":"create_net_assoc","bgpvpn_id":"b1","association":{"id":"na1","network_id":"n1"}}
{"command":"set_port_status","port_id":"p1","status":"ACTIVE"}
{"command":"update_bgpvpn","id":"b1","changes":{"name":"renamed"}}
{"command":"update_bgpvpn","id":"b1","changes":{"route_distinguishers":["64512:7"]}}
{"command":"delete_net_assoc","bgpvpn_id":"b1","id":"na1"}
{"command":"frobnicate"}
"#;

#[tokio::test]
async fn test_script_drives_driver() {
    let h = BagpipeHarness::new();
    let summary = h.run_script(SCRIPT).await.unwrap();

    assert_eq!(summary.applied, 8);
    assert_eq!(summary.rejected, 1, "route distinguishers are refused");
    assert_eq!(summary.malformed, 1);

    let verifier = NotificationVerifier::new(h.agent());
    verifier
        .assert_ops(&["attach_port", "push_delete"])
        .unwrap();
    let (info, host) = verifier.attach("p1").unwrap();
    assert_eq!(host, "compute-7");
    assert_eq!(info.ip_address.map(|ip| ip.to_string()), Some("10.0.0.5".to_string()));
    assert_eq!(info.gateway_ip.map(|ip| ip.to_string()), Some("10.0.0.1".to_string()));

    let b1 = h.lifecycle().get_bgpvpn("b1").unwrap();
    assert_eq!(b1.name, "renamed");
    assert!(b1.route_distinguishers.is_empty());
    assert!(b1.networks.is_empty());
}
