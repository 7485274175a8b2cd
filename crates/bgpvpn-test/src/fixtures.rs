//! Test fixtures for common BGPVPN scenarios

use std::net::Ipv4Addr;

use bgpvpn_types::{
    BgpvpnRequest, FixedIp, Network, NetworkAssociationRequest, Port, PortAssociationRequest,
    PortStatus, RouteTarget, RouterAssociationRequest, Subnet, VpnType,
};

/// Host every fixture port is bound to.
pub const COMPUTE_HOST: &str = "compute-1";

/// Parses a list of route targets.
pub fn rts(values: &[&str]) -> Vec<RouteTarget> {
    values
        .iter()
        .map(|v| v.parse().unwrap_or_else(|e| panic!("bad route target {}: {}", v, e)))
        .collect()
}

/// Port fixtures
pub mod port_fixtures {
    use super::*;

    /// VM port with one fixed IP `10.0.0.<n>` on subnet `<network>-subnet`.
    pub fn vm_port(id: &str, network_id: &str, status: PortStatus) -> Port {
        let n = id.bytes().fold(0u8, |acc, b| acc.wrapping_add(b)) % 200 + 10;
        Port {
            id: id.to_string(),
            network_id: network_id.to_string(),
            mac_address: format!("fa:16:3e:00:00:{:02x}", n)
                .parse()
                .unwrap_or_else(|e| panic!("bad mac: {}", e)),
            fixed_ips: vec![FixedIp {
                subnet_id: format!("{}-subnet", network_id),
                ip_address: format!("10.0.0.{}", n)
                    .parse()
                    .unwrap_or_else(|e| panic!("bad ip: {}", e)),
            }],
            device_owner: "compute:nova".to_string(),
            status,
            host_id: COMPUTE_HOST.to_string(),
            admin_state_up: true,
        }
    }

    pub fn active_port(id: &str, network_id: &str) -> Port {
        vm_port(id, network_id, PortStatus::Active)
    }

    /// Router interface port; never notified.
    pub fn router_interface_port(id: &str, network_id: &str) -> Port {
        Port {
            device_owner: "network:router_interface".to_string(),
            ..vm_port(id, network_id, PortStatus::Active)
        }
    }

    /// DHCP probe port; notified despite its `network:` owner.
    pub fn probe_port(id: &str, network_id: &str) -> Port {
        Port {
            device_owner: "network:probe".to_string(),
            ..vm_port(id, network_id, PortStatus::Active)
        }
    }
}

/// Network and subnet fixtures
pub mod network_fixtures {
    use super::*;

    pub fn tenant_network(id: &str) -> Network {
        Network {
            id: id.to_string(),
            tenant_id: "tenant-a".to_string(),
            external: false,
        }
    }

    pub fn external_network(id: &str) -> Network {
        Network {
            id: id.to_string(),
            tenant_id: "admin".to_string(),
            external: true,
        }
    }

    /// `10.0.0.0/24` subnet `<network>-subnet` with gateway `10.0.0.1`.
    pub fn subnet(network_id: &str) -> Subnet {
        Subnet {
            id: format!("{}-subnet", network_id),
            network_id: network_id.to_string(),
            cidr: "10.0.0.0/24".parse().unwrap_or_else(|e| panic!("bad cidr: {}", e)),
            gateway_ip: Some(Ipv4Addr::new(10, 0, 0, 1).into()),
        }
    }
}

/// BGPVPN and association request fixtures
pub mod bgpvpn_fixtures {
    use super::*;

    /// L3 BGPVPN of `tenant-a` with the given route targets.
    pub fn l3(id: &str, route_targets: &[&str]) -> BgpvpnRequest {
        BgpvpnRequest {
            id: Some(id.to_string()),
            tenant_id: "tenant-a".to_string(),
            name: format!("{}-vpn", id),
            vpn_type: VpnType::L3,
            route_targets: rts(route_targets),
            ..Default::default()
        }
    }

    pub fn l2(id: &str, route_targets: &[&str]) -> BgpvpnRequest {
        BgpvpnRequest {
            vpn_type: VpnType::L2,
            ..l3(id, route_targets)
        }
    }

    pub fn net_assoc(id: &str, network_id: &str) -> NetworkAssociationRequest {
        NetworkAssociationRequest::new(network_id).with_id(id)
    }

    pub fn router_assoc(id: &str, router_id: &str) -> RouterAssociationRequest {
        RouterAssociationRequest::new(router_id).with_id(id)
    }

    pub fn port_assoc(id: &str, port_id: &str) -> PortAssociationRequest {
        PortAssociationRequest::new(port_id).with_id(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_ports_share_subnet_naming() {
        let port = port_fixtures::active_port("p1", "n1");
        let subnet = network_fixtures::subnet("n1");
        assert_eq!(port.fixed_ips[0].subnet_id, subnet.id);
        assert!(port.status.is_active());
    }

    #[test]
    fn test_l2_fixture_keeps_route_targets() {
        let req = bgpvpn_fixtures::l2("b1", &["64512:1"]);
        assert_eq!(req.vpn_type, VpnType::L2);
        assert_eq!(req.route_targets, rts(&["64512:1"]));
    }
}
