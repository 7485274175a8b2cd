//! BGPVPN objects and their network, router and port associations.

use crate::{
    AssociationId, BgpvpnId, IpPrefix, NetworkId, ParseError, PortId, RouteTarget, RouterId,
    TenantId,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of VPN a BGPVPN provides. Immutable after creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VpnType {
    /// Layer-2 (EVPN) attachment.
    L2,
    /// Layer-3 (IP VPN) attachment.
    #[default]
    L3,
}

impl VpnType {
    /// Key under which the agent expects route targets of this type,
    /// e.g. `l3vpn`.
    pub const fn wire_key(&self) -> &'static str {
        match self {
            VpnType::L2 => "l2vpn",
            VpnType::L3 => "l3vpn",
        }
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            VpnType::L2 => "l2",
            VpnType::L3 => "l3",
        }
    }
}

impl fmt::Display for VpnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VpnType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "l2" => Ok(VpnType::L2),
            "l3" => Ok(VpnType::L3),
            _ => Err(ParseError::InvalidVpnType(s.to_string())),
        }
    }
}

/// A BGPVPN as returned to the API layer.
///
/// `networks`, `routers` and `ports` are derived from the associations
/// owned by this BGPVPN, in association creation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bgpvpn {
    pub id: BgpvpnId,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub vpn_type: VpnType,
    #[serde(default)]
    pub route_targets: Vec<RouteTarget>,
    #[serde(default)]
    pub import_targets: Vec<RouteTarget>,
    #[serde(default)]
    pub export_targets: Vec<RouteTarget>,
    #[serde(default)]
    pub route_distinguishers: Vec<String>,
    #[serde(default)]
    pub networks: Vec<NetworkId>,
    #[serde(default)]
    pub routers: Vec<RouterId>,
    #[serde(default)]
    pub ports: Vec<PortId>,
}

/// Create request for a BGPVPN. The store allocates an id unless one is
/// given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpvpnRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<BgpvpnId>,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub vpn_type: VpnType,
    #[serde(default)]
    pub route_targets: Vec<RouteTarget>,
    #[serde(default)]
    pub import_targets: Vec<RouteTarget>,
    #[serde(default)]
    pub export_targets: Vec<RouteTarget>,
    #[serde(default)]
    pub route_distinguishers: Vec<String>,
}

/// Partial update of a BGPVPN. The VPN type has no field here: it cannot
/// change after creation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpvpnUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_targets: Option<Vec<RouteTarget>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_targets: Option<Vec<RouteTarget>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_targets: Option<Vec<RouteTarget>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_distinguishers: Option<Vec<String>>,
}

impl BgpvpnUpdate {
    /// Applies the present fields onto `bgpvpn`.
    pub fn apply_to(&self, bgpvpn: &mut Bgpvpn) {
        if let Some(name) = &self.name {
            bgpvpn.name = name.clone();
        }
        if let Some(rts) = &self.route_targets {
            bgpvpn.route_targets = rts.clone();
        }
        if let Some(rts) = &self.import_targets {
            bgpvpn.import_targets = rts.clone();
        }
        if let Some(rts) = &self.export_targets {
            bgpvpn.export_targets = rts.clone();
        }
        if let Some(rds) = &self.route_distinguishers {
            bgpvpn.route_distinguishers = rds.clone();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAssociation {
    pub id: AssociationId,
    pub bgpvpn_id: BgpvpnId,
    pub network_id: NetworkId,
    pub tenant_id: TenantId,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkAssociationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AssociationId>,
    pub network_id: NetworkId,
    /// Defaults to the owning BGPVPN's tenant.
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterAssociation {
    pub id: AssociationId,
    pub bgpvpn_id: BgpvpnId,
    pub router_id: RouterId,
    pub tenant_id: TenantId,
    #[serde(default = "default_true")]
    pub advertise_extra_routes: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterAssociationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AssociationId>,
    pub router_id: RouterId,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    #[serde(default = "default_true")]
    pub advertise_extra_routes: bool,
}

impl RouterAssociationRequest {
    pub fn new(router_id: impl Into<RouterId>) -> Self {
        Self {
            id: None,
            router_id: router_id.into(),
            tenant_id: None,
            advertise_extra_routes: true,
        }
    }

    pub fn with_id(mut self, id: impl Into<AssociationId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

impl NetworkAssociationRequest {
    pub fn new(network_id: impl Into<NetworkId>) -> Self {
        Self {
            network_id: network_id.into(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<AssociationId>) -> Self {
        self.id = Some(id.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterAssociationUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_extra_routes: Option<bool>,
}

/// An extra route advertised for a port association.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Route {
    /// A static prefix reachable through the port.
    Prefix {
        prefix: IpPrefix,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_pref: Option<u32>,
    },
    /// Routes of another BGPVPN, readvertised through the port.
    Bgpvpn {
        bgpvpn_id: BgpvpnId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        local_pref: Option<u32>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAssociation {
    pub id: AssociationId,
    pub bgpvpn_id: BgpvpnId,
    pub port_id: PortId,
    pub tenant_id: TenantId,
    #[serde(default = "default_true")]
    pub advertise_fixed_ips: bool,
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAssociationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AssociationId>,
    pub port_id: PortId,
    #[serde(default)]
    pub tenant_id: Option<TenantId>,
    #[serde(default = "default_true")]
    pub advertise_fixed_ips: bool,
    #[serde(default)]
    pub routes: Vec<Route>,
}

impl PortAssociationRequest {
    pub fn new(port_id: impl Into<PortId>) -> Self {
        Self {
            id: None,
            port_id: port_id.into(),
            tenant_id: None,
            advertise_fixed_ips: true,
            routes: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<AssociationId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.routes.push(route);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortAssociationUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advertise_fixed_ips: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<Vec<Route>>,
}

fn default_true() -> bool {
    true
}
