//! Read access to the virtual network topology.
//!
//! The driver never owns ports, networks or routers. It queries them through
//! [`Topology`], implemented by the orchestration layer. [`MemoryTopology`]
//! is the in-process implementation used by the daemon and in tests.

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::Arc;

use bgpvpn_types::{Network, NetworkId, Port, PortId, PortStatus, RouterId, Subnet, SubnetId};
use parking_lot::RwLock;

/// Topology queries used by the driver and the event reactor.
pub trait Topology: Send + Sync {
    fn get_port(&self, port_id: &str) -> Option<Port>;

    fn get_network(&self, network_id: &str) -> Option<Network>;

    /// Returns true if at least one ACTIVE port is plugged on the network.
    fn network_has_ports(&self, network_id: &str) -> bool;

    /// Networks on which `router_id` has an interface.
    fn router_networks(&self, router_id: &str) -> Vec<NetworkId>;

    /// Routers with an interface on `network_id`.
    fn network_routers(&self, network_id: &str) -> Vec<RouterId>;

    fn subnet_gateway(&self, subnet_id: &str) -> Option<IpAddr>;

    fn is_external_network(&self, network_id: &str) -> bool {
        self.get_network(network_id)
            .map(|network| network.external)
            .unwrap_or(false)
    }
}

impl<T: Topology + ?Sized> Topology for Arc<T> {
    fn get_port(&self, port_id: &str) -> Option<Port> {
        (**self).get_port(port_id)
    }

    fn get_network(&self, network_id: &str) -> Option<Network> {
        (**self).get_network(network_id)
    }

    fn network_has_ports(&self, network_id: &str) -> bool {
        (**self).network_has_ports(network_id)
    }

    fn router_networks(&self, router_id: &str) -> Vec<NetworkId> {
        (**self).router_networks(router_id)
    }

    fn network_routers(&self, network_id: &str) -> Vec<RouterId> {
        (**self).network_routers(network_id)
    }

    fn subnet_gateway(&self, subnet_id: &str) -> Option<IpAddr> {
        (**self).subnet_gateway(subnet_id)
    }

    fn is_external_network(&self, network_id: &str) -> bool {
        (**self).is_external_network(network_id)
    }
}

#[derive(Debug, Default)]
struct TopologyState {
    networks: BTreeMap<NetworkId, Network>,
    subnets: BTreeMap<SubnetId, Subnet>,
    ports: BTreeMap<PortId, Port>,
    /// Router interfaces as `(router, network)` pairs, in plug order.
    router_interfaces: Vec<(RouterId, NetworkId)>,
}

/// In-memory [`Topology`].
#[derive(Debug, Default)]
pub struct MemoryTopology {
    state: RwLock<TopologyState>,
}

impl MemoryTopology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_network(&self, network: Network) {
        self.state.write().networks.insert(network.id.clone(), network);
    }

    pub fn add_subnet(&self, subnet: Subnet) {
        self.state.write().subnets.insert(subnet.id.clone(), subnet);
    }

    /// Inserts or replaces a port. Returns the previous version, if any.
    pub fn upsert_port(&self, port: Port) -> Option<Port> {
        self.state.write().ports.insert(port.id.clone(), port)
    }

    pub fn remove_port(&self, port_id: &str) -> Option<Port> {
        self.state.write().ports.remove(port_id)
    }

    /// Changes the status of a port. Returns `(updated, original)`.
    pub fn set_port_status(&self, port_id: &str, status: PortStatus) -> Option<(Port, Port)> {
        let mut state = self.state.write();
        let port = state.ports.get_mut(port_id)?;
        let original = port.clone();
        port.status = status;
        Some((port.clone(), original))
    }

    /// Plugs a router interface. Returns false if it already existed.
    pub fn add_router_interface(&self, router_id: &str, network_id: &str) -> bool {
        let mut state = self.state.write();
        let exists = state
            .router_interfaces
            .iter()
            .any(|(r, n)| r == router_id && n == network_id);
        if !exists {
            state
                .router_interfaces
                .push((router_id.to_string(), network_id.to_string()));
        }
        !exists
    }

    /// Unplugs a router interface. Returns false if it did not exist.
    pub fn remove_router_interface(&self, router_id: &str, network_id: &str) -> bool {
        let mut state = self.state.write();
        let before = state.router_interfaces.len();
        state
            .router_interfaces
            .retain(|(r, n)| !(r == router_id && n == network_id));
        state.router_interfaces.len() != before
    }
}

impl Topology for MemoryTopology {
    fn get_port(&self, port_id: &str) -> Option<Port> {
        self.state.read().ports.get(port_id).cloned()
    }

    fn get_network(&self, network_id: &str) -> Option<Network> {
        self.state.read().networks.get(network_id).cloned()
    }

    fn network_has_ports(&self, network_id: &str) -> bool {
        self.state
            .read()
            .ports
            .values()
            .any(|port| port.network_id == network_id && port.status.is_active())
    }

    fn router_networks(&self, router_id: &str) -> Vec<NetworkId> {
        self.state
            .read()
            .router_interfaces
            .iter()
            .filter(|(r, _)| r == router_id)
            .map(|(_, n)| n.clone())
            .collect()
    }

    fn network_routers(&self, network_id: &str) -> Vec<RouterId> {
        self.state
            .read()
            .router_interfaces
            .iter()
            .filter(|(_, n)| n == network_id)
            .map(|(r, _)| r.clone())
            .collect()
    }

    fn subnet_gateway(&self, subnet_id: &str) -> Option<IpAddr> {
        self.state
            .read()
            .subnets
            .get(subnet_id)
            .and_then(|subnet| subnet.gateway_ip)
    }
}
