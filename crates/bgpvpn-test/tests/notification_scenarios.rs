//! Notification scenarios: which agent pushes follow associations, port
//! status changes and router interface changes.

use std::net::Ipv4Addr;

use bgpvpn_bagpipe::{BgpvpnError, Command, DriverConfig, Topology};
use bgpvpn_test::{
    bgpvpn_fixtures, network_fixtures, port_fixtures, BagpipeHarness, NotificationVerifier,
};
use bgpvpn_types::{PortStatus, Route, VpnType};
use pretty_assertions::assert_eq;

fn harness() -> BagpipeHarness {
    let h = BagpipeHarness::new();
    h.add_network(network_fixtures::tenant_network("n1"));
    h
}

/// Scenario:
/// 1. Create a BGPVPN and associate a network with no ACTIVE port
/// 2. Verify nothing is pushed
/// 3. Bring a port up, then down
/// 4. Verify the port is attached with the BGPVPN route targets, then detached
#[test]
fn test_associate_inert_network_then_port_comes_up() {
    let h = harness();
    h.plug_port(port_fixtures::vm_port("p1", "n1", PortStatus::Down));
    let lifecycle = h.lifecycle();
    lifecycle
        .create_bgpvpn(&bgpvpn_fixtures::l3("b1", &["64512:1"]))
        .unwrap();
    lifecycle
        .create_net_assoc("b1", &bgpvpn_fixtures::net_assoc("na1", "n1"))
        .unwrap();
    NotificationVerifier::new(h.agent()).assert_silent().unwrap();

    h.set_port_status("p1", PortStatus::Active).unwrap();
    let verifier = NotificationVerifier::new(h.agent());
    verifier.assert_ops(&["attach_port"]).unwrap();
    let (info, host) = verifier.attach("p1").unwrap();
    assert_eq!(host, "compute-1");
    assert_eq!(info.network_id, "n1");
    assert_eq!(info.gateway_ip, Some(Ipv4Addr::new(10, 0, 0, 1).into()));
    assert!(info.ip_address.is_some());
    assert_eq!(info.advertise_fixed_ips, None);
    let l3vpn = info.vpns.get("l3vpn").unwrap();
    assert_eq!(l3vpn.import_rt, vec!["64512:1".to_string()]);
    assert_eq!(l3vpn.export_rt, vec!["64512:1".to_string()]);
    h.agent().clear();

    h.set_port_status("p1", PortStatus::Down).unwrap();
    let verifier = NotificationVerifier::new(h.agent());
    verifier.assert_ops(&["detach_port"]).unwrap();
    let (info, _) = verifier.detach("p1").unwrap();
    assert_eq!(info.mac_address, None);
    assert!(info.vpns.is_empty());
}

#[test]
fn test_associate_live_network_pushes_update() {
    let h = harness();
    h.plug_port(port_fixtures::active_port("p1", "n1"));
    let lifecycle = h.lifecycle();
    let mut request = bgpvpn_fixtures::l3("b1", &["64512:1"]);
    request.import_targets = bgpvpn_test::rts(&["64512:10"]);
    lifecycle.create_bgpvpn(&request).unwrap();
    NotificationVerifier::new(h.agent()).assert_silent().unwrap();

    lifecycle
        .create_net_assoc("b1", &bgpvpn_fixtures::net_assoc("na1", "n1"))
        .unwrap();

    let verifier = NotificationVerifier::new(h.agent());
    verifier.assert_ops(&["push_update"]).unwrap();
    let wire = verifier.push_update("b1", "n1").unwrap();
    let l3vpn = wire.l3vpn().unwrap();
    assert_eq!(
        l3vpn.import_rt,
        vec!["64512:1".to_string(), "64512:10".to_string()]
    );
    assert_eq!(l3vpn.export_rt, vec!["64512:1".to_string()]);
    h.agent().clear();

    lifecycle.delete_net_assoc("b1", "na1").unwrap();
    NotificationVerifier::new(h.agent())
        .push_delete("b1", "n1")
        .unwrap();
}

#[test]
fn test_l2_route_targets_are_not_emitted_by_default() {
    let h = harness();
    h.plug_port(port_fixtures::active_port("p1", "n1"));
    let lifecycle = h.lifecycle();
    lifecycle
        .create_bgpvpn(&bgpvpn_fixtures::l2("b1", &["64512:1"]))
        .unwrap();
    lifecycle
        .create_net_assoc("b1", &bgpvpn_fixtures::net_assoc("na1", "n1"))
        .unwrap();

    let wire = NotificationVerifier::new(h.agent())
        .push_update("b1", "n1")
        .unwrap();
    assert!(wire.vpns.is_empty());
}

#[test]
fn test_l2_route_targets_emitted_when_configured() {
    let h = BagpipeHarness::with_config(DriverConfig {
        emitted_vpn_types: vec![VpnType::L2, VpnType::L3],
        ..Default::default()
    });
    h.add_network(network_fixtures::tenant_network("n1"));
    h.plug_port(port_fixtures::active_port("p1", "n1"));
    let lifecycle = h.lifecycle();
    lifecycle
        .create_bgpvpn(&bgpvpn_fixtures::l2("b1", &["64512:1"]))
        .unwrap();
    lifecycle
        .create_net_assoc("b1", &bgpvpn_fixtures::net_assoc("na1", "n1"))
        .unwrap();

    let wire = NotificationVerifier::new(h.agent())
        .push_update("b1", "n1")
        .unwrap();
    assert_eq!(wire.vpns.keys().collect::<Vec<_>>(), vec!["l2vpn"]);
}

#[test]
fn test_platform_ports_are_ignored_except_probes() {
    let h = harness();
    let lifecycle = h.lifecycle();
    lifecycle
        .create_bgpvpn(&bgpvpn_fixtures::l3("b1", &["64512:1"]))
        .unwrap();
    lifecycle
        .create_net_assoc("b1", &bgpvpn_fixtures::net_assoc("na1", "n1"))
        .unwrap();

    h.plug_port(port_fixtures::router_interface_port("gw", "n1"));
    NotificationVerifier::new(h.agent()).assert_silent().unwrap();

    h.plug_port(port_fixtures::probe_port("probe", "n1"));
    NotificationVerifier::new(h.agent())
        .attach("probe")
        .unwrap();
}

/// Scenario:
/// 1. Router r1 plugged on n1 (which has an ACTIVE port)
/// 2. Associate r1 to a BGPVPN: the BGPVPN is pushed for n1
/// 3. A new port on n1 is attached with the BGPVPN route targets
/// 4. Unplug r1: the BGPVPN is withdrawn from n1
#[test]
fn test_router_association_follows_router_interfaces() {
    let h = harness();
    h.plug_port(port_fixtures::active_port("p1", "n1"));
    h.add_router_interface("r1", "n1").unwrap();
    let lifecycle = h.lifecycle();
    lifecycle
        .create_bgpvpn(&bgpvpn_fixtures::l3("b1", &["64512:1"]))
        .unwrap();
    NotificationVerifier::new(h.agent()).assert_silent().unwrap();

    lifecycle
        .create_router_assoc("b1", &bgpvpn_fixtures::router_assoc("ra1", "r1"))
        .unwrap();
    NotificationVerifier::new(h.agent())
        .assert_ops(&["push_update"])
        .unwrap();
    h.agent().clear();

    h.plug_port(port_fixtures::active_port("p2", "n1"));
    let (info, _) = NotificationVerifier::new(h.agent()).attach("p2").unwrap();
    assert_eq!(
        info.vpns.get("l3vpn").unwrap().import_rt,
        vec!["64512:1".to_string()]
    );
    h.agent().clear();

    h.remove_router_interface("r1", "n1").unwrap();
    let verifier = NotificationVerifier::new(h.agent());
    verifier.assert_ops(&["push_delete"]).unwrap();
    verifier.push_delete("b1", "n1").unwrap();
}

#[test]
fn test_router_interface_plug_pushes_router_bgpvpns() {
    let h = harness();
    h.plug_port(port_fixtures::active_port("p1", "n1"));
    let lifecycle = h.lifecycle();
    lifecycle
        .create_bgpvpn(&bgpvpn_fixtures::l3("b1", &["64512:1"]))
        .unwrap();
    lifecycle
        .create_router_assoc("b1", &bgpvpn_fixtures::router_assoc("ra1", "r1"))
        .unwrap();
    NotificationVerifier::new(h.agent()).assert_silent().unwrap();

    h.add_router_interface("r1", "n1").unwrap();
    NotificationVerifier::new(h.agent())
        .push_update("b1", "n1")
        .unwrap();
}

/// A network reached through a router by one l3 BGPVPN cannot also be
/// associated to another one, in either order.
#[test]
fn test_router_interface_ambiguity_is_rejected() {
    let h = harness();
    let lifecycle = h.lifecycle();
    lifecycle
        .create_bgpvpn(&bgpvpn_fixtures::l3("b1", &["64512:1"]))
        .unwrap();
    lifecycle
        .create_bgpvpn(&bgpvpn_fixtures::l3("b2", &["64512:2"]))
        .unwrap();
    lifecycle
        .create_router_assoc("b1", &bgpvpn_fixtures::router_assoc("ra1", "r1"))
        .unwrap();
    lifecycle
        .create_net_assoc("b2", &bgpvpn_fixtures::net_assoc("na1", "n1"))
        .unwrap();

    let err = h.add_router_interface("r1", "n1").unwrap_err();
    assert!(matches!(err, BgpvpnError::Conflict { .. }));
    assert!(h.topology().network_routers("n1").is_empty());

    h.add_network(network_fixtures::tenant_network("n2"));
    h.add_router_interface("r1", "n2").unwrap();
    let err = lifecycle
        .create_net_assoc("b2", &bgpvpn_fixtures::net_assoc("na2", "n2"))
        .unwrap_err();
    assert!(matches!(err, BgpvpnError::Conflict { .. }));
    assert_eq!(lifecycle.list_net_assocs("b2").unwrap().len(), 1);
}

#[test]
fn test_port_association_routes() {
    let h = harness();
    h.plug_port(port_fixtures::active_port("p1", "n1"));
    let lifecycle = h.lifecycle();
    lifecycle
        .create_bgpvpn(&bgpvpn_fixtures::l3("b1", &["64512:1"]))
        .unwrap();
    lifecycle
        .create_bgpvpn(&bgpvpn_fixtures::l3("b2", &["64512:2"]))
        .unwrap();

    let request = bgpvpn_fixtures::port_assoc("pa1", "p1")
        .with_route(Route::Prefix {
            prefix: "192.168.0.0/24".parse().unwrap(),
            local_pref: Some(100),
        })
        .with_route(Route::Bgpvpn {
            bgpvpn_id: "b2".to_string(),
            local_pref: None,
        });
    lifecycle.create_port_assoc("b1", &request).unwrap();

    let verifier = NotificationVerifier::new(h.agent());
    verifier.assert_ops(&["attach_port"]).unwrap();
    let (info, _) = verifier.attach("p1").unwrap();
    assert_eq!(info.advertise_fixed_ips, Some(true));
    assert_eq!(info.static_routes.len(), 1);
    assert_eq!(info.static_routes[0].prefix.to_string(), "192.168.0.0/24");
    assert_eq!(info.static_routes[0].local_pref, Some(100));
    let readvertise = info.readvertise.unwrap();
    assert_eq!(readvertise.from_rt, vec!["64512:2".to_string()]);
    assert_eq!(readvertise.to_rt, vec!["64512:1".to_string()]);
    h.agent().clear();

    lifecycle.delete_port_assoc("b1", "pa1").unwrap();
    NotificationVerifier::new(h.agent()).detach("p1").unwrap();
}

#[test]
fn test_port_association_route_of_other_type_is_rejected() {
    let h = harness();
    h.plug_port(port_fixtures::active_port("p1", "n1"));
    let lifecycle = h.lifecycle();
    lifecycle
        .create_bgpvpn(&bgpvpn_fixtures::l3("b1", &["64512:1"]))
        .unwrap();
    lifecycle
        .create_bgpvpn(&bgpvpn_fixtures::l2("evpn", &["64512:3"]))
        .unwrap();

    let request = bgpvpn_fixtures::port_assoc("pa1", "p1").with_route(Route::Bgpvpn {
        bgpvpn_id: "evpn".to_string(),
        local_pref: None,
    });
    let err = lifecycle.create_port_assoc("b1", &request).unwrap_err();
    assert!(matches!(err, BgpvpnError::RouteValidation { .. }));
    assert!(lifecycle.list_port_assocs("b1").unwrap().is_empty());
    NotificationVerifier::new(h.agent()).assert_silent().unwrap();
}

#[test]
fn test_port_deletion_detaches() {
    let h = harness();
    h.plug_port(port_fixtures::active_port("p1", "n1"));
    let lifecycle = h.lifecycle();
    lifecycle
        .create_bgpvpn(&bgpvpn_fixtures::l3("b1", &["64512:1"]))
        .unwrap();
    lifecycle
        .create_net_assoc("b1", &bgpvpn_fixtures::net_assoc("na1", "n1"))
        .unwrap();
    h.agent().clear();

    h.apply(Command::DeletePort {
        port_id: "p1".to_string(),
    })
    .unwrap();
    NotificationVerifier::new(h.agent())
        .assert_ops(&["detach_port"])
        .unwrap();
    assert!(h.topology().get_port("p1").is_none());

    let err = h
        .apply(Command::DeletePort {
            port_id: "p1".to_string(),
        })
        .unwrap_err();
    assert!(err.is_not_found());
}

/// Route of an l2 BGPVPN's port association pointing at an l3 BGPVPN.
#[test]
fn test_l2_port_association_route_to_l3_is_rejected() {
    let h = harness();
    h.plug_port(port_fixtures::active_port("p1", "n1"));
    let lifecycle = h.lifecycle();
    lifecycle
        .create_bgpvpn(&bgpvpn_fixtures::l2("a", &["64512:1"]))
        .unwrap();
    lifecycle
        .create_bgpvpn(&bgpvpn_fixtures::l3("b", &["64512:2"]))
        .unwrap();

    let request = bgpvpn_fixtures::port_assoc("pa1", "p1").with_route(Route::Bgpvpn {
        bgpvpn_id: "b".to_string(),
        local_pref: None,
    });
    let err = lifecycle.create_port_assoc("a", &request).unwrap_err();
    assert!(matches!(err, BgpvpnError::RouteValidation { .. }));
    assert!(lifecycle.list_port_assocs("a").unwrap().is_empty());
}
