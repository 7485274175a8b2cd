//! Payloads pushed to the BGP agent.
//!
//! A BGPVPN push is addressed per network:
//!
//! ```json
//! {"id": "b1", "network_id": "n1", "l3vpn": {"import_rt": ["64512:1"], "export_rt": ["64512:1"]}}
//! ```
//!
//! The `l3vpn` key is absent when the BGPVPN carries no route target. Port
//! attach payloads add the port addressing and the extra routes of its port
//! associations; detach payloads carry only `id` and `network_id`.

use std::net::IpAddr;

use bgpvpn_types::{
    Bgpvpn, BgpvpnId, IpPrefix, MacAddress, NetworkId, Port, PortAssociation, PortId, Route,
    VpnType,
};
use serde::{Deserialize, Serialize};

use crate::projector::{project_for, VpnRouteTargets};

/// A BGPVPN as seen by the agent for one network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpvpnWire {
    pub id: BgpvpnId,
    pub network_id: NetworkId,
    #[serde(flatten)]
    pub vpns: VpnRouteTargets,
}

impl BgpvpnWire {
    /// Builds the push payload of `bgpvpn` for `network_id`.
    pub fn for_network(bgpvpn: &Bgpvpn, network_id: &str, emitted: &[VpnType]) -> Self {
        Self {
            id: bgpvpn.id.clone(),
            network_id: network_id.to_string(),
            vpns: non_empty(project_for(emitted, [bgpvpn])),
        }
    }

    pub fn l3vpn(&self) -> Option<&crate::projector::RouteTargetLists> {
        self.vpns.get(VpnType::L3.wire_key())
    }
}

/// A static prefix advertised through a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoute {
    pub prefix: IpPrefix,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_pref: Option<u32>,
}

/// Routes of other BGPVPNs readvertised through a port.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Readvertise {
    pub from_rt: Vec<String>,
    pub to_rt: Vec<String>,
}

/// Attach or detach payload for one port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBgpvpnInfo {
    pub id: PortId,
    pub network_id: NetworkId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<MacAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway_ip: Option<IpAddr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_fixed_ips: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub static_routes: Vec<StaticRoute>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readvertise: Option<Readvertise>,
    #[serde(flatten)]
    pub vpns: VpnRouteTargets,
}

impl PortBgpvpnInfo {
    /// Detach payload: identity only, no route targets.
    pub fn detach(port: &Port) -> Self {
        Self {
            id: port.id.clone(),
            network_id: port.network_id.clone(),
            mac_address: None,
            ip_address: None,
            gateway_ip: None,
            advertise_fixed_ips: None,
            static_routes: Vec::new(),
            readvertise: None,
            vpns: VpnRouteTargets::new(),
        }
    }

    /// Attach payload for `port` reaching `bgpvpns`.
    ///
    /// `port_assocs` are the port associations of `port` whose routes are
    /// carried; `lookup` resolves the BGPVPNs referenced by `bgpvpn` routes.
    pub fn attach<'a>(
        port: &Port,
        gateway_ip: Option<IpAddr>,
        bgpvpns: &[Bgpvpn],
        port_assocs: &[PortAssociation],
        lookup: impl Fn(&str) -> Option<&'a Bgpvpn>,
        emitted: &[VpnType],
    ) -> Self {
        let mut static_routes = Vec::new();
        let mut readvertise = Readvertise::default();

        for assoc in port_assocs {
            for route in &assoc.routes {
                match route {
                    Route::Prefix { prefix, local_pref } => static_routes.push(StaticRoute {
                        prefix: *prefix,
                        local_pref: *local_pref,
                    }),
                    Route::Bgpvpn { bgpvpn_id, .. } => {
                        let Some(source) = lookup(bgpvpn_id.as_str()) else {
                            continue;
                        };
                        for lists in project_for(emitted, [source]).into_values() {
                            readvertise.from_rt.extend(lists.import_rt);
                        }
                        if let Some(owner) = bgpvpns.iter().find(|b| b.id == assoc.bgpvpn_id) {
                            for lists in project_for(emitted, [owner]).into_values() {
                                readvertise.to_rt.extend(lists.export_rt);
                            }
                        }
                    }
                }
            }
        }

        let advertise_fixed_ips = if port_assocs.is_empty() {
            None
        } else {
            Some(port_assocs.iter().any(|a| a.advertise_fixed_ips))
        };

        Self {
            id: port.id.clone(),
            network_id: port.network_id.clone(),
            mac_address: Some(port.mac_address),
            ip_address: port.primary_fixed_ip().map(|ip| ip.ip_address),
            gateway_ip,
            advertise_fixed_ips,
            static_routes,
            readvertise: (!readvertise.from_rt.is_empty()).then_some(readvertise),
            vpns: non_empty(project_for(emitted, bgpvpns)),
        }
    }
}

fn non_empty(vpns: VpnRouteTargets) -> VpnRouteTargets {
    vpns.into_iter().filter(|(_, lists)| !lists.is_empty()).collect()
}
