//! Data model for BGP/MPLS VPN attachment.
//!
//! This crate provides the plain data types shared by the BaGPipe driver
//! and its collaborators:
//!
//! - [`Bgpvpn`]: a tenant-visible VPN object with its route targets
//! - [`NetworkAssociation`], [`RouterAssociation`], [`PortAssociation`]:
//!   links between a BGPVPN and a network, router or port
//! - [`Route`]: extra routes carried by a port association
//! - [`Port`], [`Subnet`], [`Network`]: the topology objects the driver reads
//! - [`RouteTarget`]: a validated `ASN:NN` BGP extended community
//! - [`MacAddress`], [`IpPrefix`]: address primitives
//!
//! None of these types carry behavior beyond parsing and formatting.

mod bgpvpn;
mod ip;
mod mac;
mod port;
mod route_target;

pub use bgpvpn::{
    Bgpvpn, BgpvpnRequest, BgpvpnUpdate, NetworkAssociation, NetworkAssociationRequest,
    PortAssociation, PortAssociationRequest, PortAssociationUpdate, Route, RouterAssociation,
    RouterAssociationRequest, RouterAssociationUpdate, VpnType,
};
pub use ip::IpPrefix;
pub use mac::MacAddress;
pub use port::{FixedIp, Network, Port, PortStatus, Subnet};
pub use route_target::RouteTarget;

/// Identifier of a BGPVPN.
pub type BgpvpnId = String;
/// Identifier of a network, router or port association.
pub type AssociationId = String;
/// Identifier of a tenant (project).
pub type TenantId = String;
/// Identifier of a network.
pub type NetworkId = String;
/// Identifier of a router.
pub type RouterId = String;
/// Identifier of a port.
pub type PortId = String;
/// Identifier of a subnet.
pub type SubnetId = String;

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid route target: {0} (expected ASN:NN)")]
    InvalidRouteTarget(String),

    #[error("invalid VPN type: {0} (must be l2 or l3)")]
    InvalidVpnType(String),

    #[error("invalid port status: {0}")]
    InvalidPortStatus(String),
}
