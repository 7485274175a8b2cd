//! Topology objects read by the driver: ports, subnets and networks.

use crate::{IpPrefix, MacAddress, NetworkId, ParseError, PortId, SubnetId, TenantId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Operational status of a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortStatus {
    Active,
    #[default]
    Down,
    Build,
    Error,
}

impl PortStatus {
    pub const fn is_active(&self) -> bool {
        matches!(self, PortStatus::Active)
    }
}

impl fmt::Display for PortStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PortStatus::Active => "ACTIVE",
            PortStatus::Down => "DOWN",
            PortStatus::Build => "BUILD",
            PortStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

impl FromStr for PortStatus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ACTIVE" => Ok(PortStatus::Active),
            "DOWN" => Ok(PortStatus::Down),
            "BUILD" => Ok(PortStatus::Build),
            "ERROR" => Ok(PortStatus::Error),
            _ => Err(ParseError::InvalidPortStatus(s.to_string())),
        }
    }
}

/// An address allocated to a port on one of its network's subnets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedIp {
    pub subnet_id: SubnetId,
    pub ip_address: IpAddr,
}

/// A virtual port, as seen by the orchestration layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub id: PortId,
    pub network_id: NetworkId,
    pub mac_address: MacAddress,
    #[serde(default)]
    pub fixed_ips: Vec<FixedIp>,
    /// Owner of the port, e.g. `compute:nova` or `network:router_interface`.
    #[serde(default)]
    pub device_owner: String,
    #[serde(default)]
    pub status: PortStatus,
    /// Host the port is bound to; notifications are addressed to its agent.
    #[serde(default)]
    pub host_id: String,
    #[serde(default = "default_true")]
    pub admin_state_up: bool,
}

impl Port {
    /// The first fixed IP of the port. Only this address is advertised.
    pub fn primary_fixed_ip(&self) -> Option<&FixedIp> {
        self.fixed_ips.first()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: SubnetId,
    pub network_id: NetworkId,
    pub cidr: IpPrefix,
    #[serde(default)]
    pub gateway_ip: Option<IpAddr>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    pub id: NetworkId,
    #[serde(default)]
    pub tenant_id: TenantId,
    /// Externally-facing (provider/floating IP) network.
    #[serde(default, rename = "router:external")]
    pub external: bool,
}

fn default_true() -> bool {
    true
}
