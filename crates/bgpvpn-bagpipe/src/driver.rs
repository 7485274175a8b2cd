//! BaGPipe driver: lifecycle hooks that validate associations and decide
//! which notifications the BGP agent needs.
//!
//! Notifications are addressed per network. A BGPVPN reaches a network
//! through a network association, or through a router association on a
//! router with an interface on that network. Only networks with ACTIVE
//! ports are notified; inert associations produce no agent traffic.

use bgpvpn_types::{
    Bgpvpn, NetworkAssociation, NetworkId, Port, PortAssociation, PortStatus, Route,
    RouterAssociation, VpnType,
};
use tracing::{debug, info};

use crate::config::DriverConfig;
use crate::diff::diff_resources;
use crate::error::{BgpvpnError, BgpvpnResult, NotificationError, NotifyResult};
use crate::lifecycle::LifecycleHooks;
use crate::notifier::NotificationChannel;
use crate::store::AssociationTables;
use crate::topology::Topology;
use crate::wire::{BgpvpnWire, PortBgpvpnInfo};

/// BGPVPN attributes whose change must be pushed to the agent.
pub const BGPVPN_NOTIFY_KEYS: &[&str] = &[
    "route_targets",
    "import_targets",
    "export_targets",
    "networks",
    "routers",
];

/// Router association attributes whose change must be pushed to the agent.
pub const ROUTER_ASSOC_NOTIFY_KEYS: &[&str] = &["advertise_extra_routes"];

/// BaGPipe implementation of [`LifecycleHooks`].
pub struct BagpipeDriver<T, N> {
    topology: T,
    channel: N,
    config: DriverConfig,
}

impl<T: Topology, N: NotificationChannel> BagpipeDriver<T, N> {
    pub fn new(topology: T, channel: N, config: DriverConfig) -> Self {
        Self {
            topology,
            channel,
            config,
        }
    }

    pub fn topology(&self) -> &T {
        &self.topology
    }

    pub fn channel(&self) -> &N {
        &self.channel
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    fn emitted(&self) -> &[VpnType] {
        &self.config.emitted_vpn_types
    }

    /// Ports owned by the network service (except probes) and ports on
    /// external networks never get notifications.
    pub fn ignore_port(&self, port: &Port) -> bool {
        let owned_by_platform = port.device_owner.starts_with(&self.config.network_owner_prefix)
            && !self.config.probe_owners.iter().any(|o| o == &port.device_owner);
        owned_by_platform || self.topology.is_external_network(&port.network_id)
    }

    /// Networks a BGPVPN reaches: its associated networks, then the networks
    /// of its associated routers. Deduplicated, in that order.
    pub fn bgpvpn_networks(&self, bgpvpn: &Bgpvpn) -> Vec<NetworkId> {
        let mut networks: Vec<NetworkId> = Vec::new();
        let via_routers = bgpvpn
            .routers
            .iter()
            .flat_map(|router| self.topology.router_networks(router));
        for network in bgpvpn.networks.iter().cloned().chain(via_routers) {
            if !networks.contains(&network) {
                networks.push(network);
            }
        }
        networks
    }

    fn networks_with_ports(&self, networks: Vec<NetworkId>) -> Vec<NetworkId> {
        networks
            .into_iter()
            .filter(|network| self.topology.network_has_ports(network))
            .collect()
    }

    /// BGPVPNs reachable from a network, directly or through its routers.
    pub fn bgpvpns_for_network(&self, tables: &dyn AssociationTables, network_id: &str) -> Vec<Bgpvpn> {
        let mut bgpvpns = tables.find_bgpvpns_for_network(network_id);
        for router in self.topology.network_routers(network_id) {
            extend_unique(&mut bgpvpns, tables.find_bgpvpns_for_router(&router));
        }
        bgpvpns
    }

    /// BGPVPNs reachable from a port: those of its network plus those with
    /// a port association on it.
    pub fn bgpvpns_for_port(&self, tables: &dyn AssociationTables, port: &Port) -> Vec<Bgpvpn> {
        let mut bgpvpns = self.bgpvpns_for_network(tables, &port.network_id);
        extend_unique(&mut bgpvpns, tables.find_bgpvpns_for_port(&port.id));
        bgpvpns
    }

    /// Builds the attach payload for `port` reaching `bgpvpns`.
    pub fn port_attach_info(&self, tables: &dyn AssociationTables, port: &Port, bgpvpns: &[Bgpvpn]) -> PortBgpvpnInfo {
        let gateway_ip = port
            .primary_fixed_ip()
            .and_then(|ip| self.topology.subnet_gateway(&ip.subnet_id));
        let port_assocs = tables.find_port_assocs_for_port(&port.id);

        let referenced: Vec<Bgpvpn> = port_assocs
            .iter()
            .flat_map(|assoc| &assoc.routes)
            .filter_map(|route| match route {
                Route::Bgpvpn { bgpvpn_id, .. } => tables.get_bgpvpn(bgpvpn_id).ok(),
                Route::Prefix { .. } => None,
            })
            .collect();

        PortBgpvpnInfo::attach(
            port,
            gateway_ip,
            bgpvpns,
            &port_assocs,
            |id| referenced.iter().find(|b| b.id == id),
            self.emitted(),
        )
    }

    /// Attaches `port` to every BGPVPN it reaches. Does nothing if it
    /// reaches none.
    pub fn attach_port(&self, tables: &dyn AssociationTables, port: &Port) -> NotifyResult {
        let bgpvpns = self.bgpvpns_for_port(tables, port);
        if bgpvpns.is_empty() {
            debug!(port_id = %port.id, "Port reaches no BGPVPN, nothing to attach");
            return Ok(());
        }
        let info = self.port_attach_info(tables, port, &bgpvpns);
        info!(port_id = %port.id, host = %port.host_id, bgpvpns = bgpvpns.len(), "Attaching port");
        self.channel.attach_port(&info, &port.host_id)
    }

    /// Detaches `port` if it reaches at least one BGPVPN.
    pub fn detach_port(&self, tables: &dyn AssociationTables, port: &Port) -> NotifyResult {
        if self.bgpvpns_for_port(tables, port).is_empty() {
            debug!(port_id = %port.id, "Port reaches no BGPVPN, nothing to detach");
            return Ok(());
        }
        info!(port_id = %port.id, host = %port.host_id, "Detaching port");
        self.channel
            .detach_port(&PortBgpvpnInfo::detach(port), &port.host_id)
    }

    /// Pushes the port's current state after a port status change.
    pub fn notify_port_updated(&self, tables: &dyn AssociationTables, port: &Port) -> NotifyResult {
        match port.status {
            PortStatus::Active => self.attach_port(tables, port),
            PortStatus::Down => self.detach_port(tables, port),
            other => {
                debug!(port_id = %port.id, status = %other, "Port status not notified");
                Ok(())
            }
        }
    }

    /// Re-sends an ACTIVE port's attachment after its port associations
    /// changed, or detaches it when it no longer reaches any BGPVPN.
    pub fn refresh_port(&self, tables: &dyn AssociationTables, port_id: &str) -> NotifyResult {
        let Some(port) = self.topology.get_port(port_id) else {
            debug!(port_id, "Port not in topology, nothing to refresh");
            return Ok(());
        };
        if self.ignore_port(&port) || !port.status.is_active() {
            return Ok(());
        }

        let bgpvpns = self.bgpvpns_for_port(tables, &port);
        if bgpvpns.is_empty() {
            info!(port_id, "Port no longer reaches any BGPVPN, detaching");
            return self
                .channel
                .detach_port(&PortBgpvpnInfo::detach(&port), &port.host_id);
        }
        let info = self.port_attach_info(tables, &port, &bgpvpns);
        self.channel.attach_port(&info, &port.host_id)
    }

    /// `push_update` of `bgpvpn` on each of `networks` that has ports.
    pub fn push_update_on(&self, bgpvpn: &Bgpvpn, networks: Vec<NetworkId>) -> NotifyResult {
        settle(
            self.networks_with_ports(networks)
                .iter()
                .map(|network| {
                    debug!(bgpvpn_id = %bgpvpn.id, network_id = %network, "push_update");
                    self.channel
                        .push_update(&BgpvpnWire::for_network(bgpvpn, network, self.emitted()))
                })
                .collect(),
        )
    }

    /// `push_delete` of `bgpvpn` on each of `networks` that has ports.
    pub fn push_delete_on(&self, bgpvpn: &Bgpvpn, networks: Vec<NetworkId>) -> NotifyResult {
        settle(
            self.networks_with_ports(networks)
                .iter()
                .map(|network| {
                    debug!(bgpvpn_id = %bgpvpn.id, network_id = %network, "push_delete");
                    self.channel
                        .push_delete(&BgpvpnWire::for_network(bgpvpn, network, self.emitted()))
                })
                .collect(),
        )
    }

    /// Withdraws `bgpvpn` from `networks` after one of its associations
    /// went away. A network it still reaches through another association
    /// gets a `push_update` instead of a `push_delete`.
    fn withdraw_from(&self, tables: &dyn AssociationTables, bgpvpn: &Bgpvpn, networks: Vec<NetworkId>) -> NotifyResult {
        let (still_reached, gone): (Vec<NetworkId>, Vec<NetworkId>) =
            networks.into_iter().partition(|network| {
                self.bgpvpns_for_network(tables, network)
                    .iter()
                    .any(|b| b.id == bgpvpn.id)
            });
        if !still_reached.is_empty() {
            debug!(bgpvpn_id = %bgpvpn.id, networks = ?still_reached, "Still reached, not withdrawing");
        }
        settle(vec![
            self.push_delete_on(bgpvpn, gone),
            self.push_update_on(bgpvpn, still_reached),
        ])
    }

    fn validate_route_distinguishers(&self, bgpvpn: &Bgpvpn) -> BgpvpnResult<()> {
        if bgpvpn.route_distinguishers.is_empty() {
            Ok(())
        } else {
            Err(BgpvpnError::unsupported("route distinguishers"))
        }
    }

    /// `bgpvpn`-type routes must reference an existing BGPVPN of the same
    /// type and tenant as the association's BGPVPN.
    fn validate_routes(&self, tables: &dyn AssociationTables, assoc: &PortAssociation) -> BgpvpnResult<()> {
        let owner = tables.get_bgpvpn(&assoc.bgpvpn_id)?;
        for route in &assoc.routes {
            let Route::Bgpvpn { bgpvpn_id, .. } = route else {
                continue;
            };
            let referenced = tables.get_bgpvpn(bgpvpn_id).map_err(|_| {
                BgpvpnError::invalid_route(format!("bgpvpn {} does not exist", bgpvpn_id))
            })?;
            if referenced.vpn_type != owner.vpn_type {
                return Err(BgpvpnError::invalid_route(format!(
                    "bgpvpn {} is of type {}, association bgpvpn {} is of type {}",
                    referenced.id, referenced.vpn_type, owner.id, owner.vpn_type
                )));
            }
            if referenced.tenant_id != owner.tenant_id {
                return Err(BgpvpnError::invalid_route(format!(
                    "bgpvpn {} belongs to another tenant",
                    referenced.id
                )));
            }
        }
        Ok(())
    }

    /// Looks up a BGPVPN from a postcommit hook. A BGPVPN deleted in the
    /// meantime is not an error: there is nothing left to notify.
    fn committed_bgpvpn(&self, tables: &dyn AssociationTables, id: &str) -> Option<Bgpvpn> {
        match tables.get_bgpvpn(id) {
            Ok(bgpvpn) => Some(bgpvpn),
            Err(e) => {
                debug!(bgpvpn_id = id, error = %e, "BGPVPN gone before postcommit");
                None
            }
        }
    }
}

impl<T: Topology, N: NotificationChannel> LifecycleHooks for BagpipeDriver<T, N> {
    fn create_bgpvpn_precommit(&self, _tables: &dyn AssociationTables, bgpvpn: &Bgpvpn) -> BgpvpnResult<()> {
        self.validate_route_distinguishers(bgpvpn)
    }

    fn create_bgpvpn_postcommit(&self, _tables: &dyn AssociationTables, bgpvpn: &Bgpvpn) -> NotifyResult {
        self.push_update_on(bgpvpn, self.bgpvpn_networks(bgpvpn))
    }

    fn update_bgpvpn_precommit(&self, _tables: &dyn AssociationTables, _old: &Bgpvpn, new: &Bgpvpn) -> BgpvpnResult<()> {
        self.validate_route_distinguishers(new)
    }

    fn update_bgpvpn_postcommit(&self, _tables: &dyn AssociationTables, old: &Bgpvpn, new: &Bgpvpn) -> NotifyResult {
        let difference = diff_resources(new, old);
        if !difference.touches(BGPVPN_NOTIFY_KEYS) {
            debug!(
                bgpvpn_id = %new.id,
                changed = ?difference.moving_keys(),
                "No agent-relevant change, skipping notification"
            );
            return Ok(());
        }
        self.push_update_on(new, self.bgpvpn_networks(new))
    }

    fn delete_bgpvpn_postcommit(&self, tables: &dyn AssociationTables, bgpvpn: &Bgpvpn) -> NotifyResult {
        let mut results = vec![self.push_delete_on(bgpvpn, self.bgpvpn_networks(bgpvpn))];
        results.extend(bgpvpn.ports.iter().map(|port_id| self.refresh_port(tables, port_id)));
        settle(results)
    }

    fn create_net_assoc_precommit(&self, tables: &dyn AssociationTables, assoc: &NetworkAssociation) -> BgpvpnResult<()> {
        if self.topology.is_external_network(&assoc.network_id) {
            return Err(BgpvpnError::unsupported("association of an external network"));
        }

        let owner = tables.get_bgpvpn(&assoc.bgpvpn_id)?;
        if owner.vpn_type != VpnType::L3 {
            return Ok(());
        }
        for router in self.topology.network_routers(&assoc.network_id) {
            let other = tables
                .find_bgpvpns_for_router(&router)
                .into_iter()
                .find(|b| b.vpn_type == VpnType::L3 && b.id != owner.id);
            if let Some(other) = other {
                return Err(BgpvpnError::conflict(format!(
                    "network {} is connected to router {} associated to l3 bgpvpn {}",
                    assoc.network_id, router, other.id
                )));
            }
        }
        Ok(())
    }

    fn create_net_assoc_postcommit(&self, tables: &dyn AssociationTables, assoc: &NetworkAssociation) -> NotifyResult {
        let Some(bgpvpn) = self.committed_bgpvpn(tables, &assoc.bgpvpn_id) else {
            return Ok(());
        };
        self.push_update_on(&bgpvpn, vec![assoc.network_id.clone()])
    }

    fn delete_net_assoc_postcommit(&self, tables: &dyn AssociationTables, assoc: &NetworkAssociation) -> NotifyResult {
        let Some(bgpvpn) = self.committed_bgpvpn(tables, &assoc.bgpvpn_id) else {
            return Ok(());
        };
        self.withdraw_from(tables, &bgpvpn, vec![assoc.network_id.clone()])
    }

    fn create_router_assoc_precommit(
        &self,
        tables: &dyn AssociationTables,
        assoc: &RouterAssociation,
    ) -> BgpvpnResult<()> {
        let owner = tables.get_bgpvpn(&assoc.bgpvpn_id)?;
        if owner.vpn_type != VpnType::L3 {
            return Err(BgpvpnError::unsupported("router association on an l2 bgpvpn"));
        }

        // The association being created is already in the tables.
        if owner.routers.len() > self.config.max_router_assocs_per_bgpvpn {
            return Err(BgpvpnError::unsupported(format!(
                "more than {} router association(s) per bgpvpn",
                self.config.max_router_assocs_per_bgpvpn
            )));
        }

        for network in self.topology.router_networks(&assoc.router_id) {
            let other = tables
                .find_bgpvpns_for_network(&network)
                .into_iter()
                .find(|b| b.vpn_type == VpnType::L3 && b.id != owner.id);
            if let Some(other) = other {
                return Err(BgpvpnError::conflict(format!(
                    "router {} is connected to network {} associated to l3 bgpvpn {}",
                    assoc.router_id, network, other.id
                )));
            }
        }
        Ok(())
    }

    fn create_router_assoc_postcommit(&self, tables: &dyn AssociationTables, assoc: &RouterAssociation) -> NotifyResult {
        let Some(bgpvpn) = self.committed_bgpvpn(tables, &assoc.bgpvpn_id) else {
            return Ok(());
        };
        self.push_update_on(&bgpvpn, self.topology.router_networks(&assoc.router_id))
    }

    fn update_router_assoc_postcommit(
        &self,
        tables: &dyn AssociationTables,
        old: &RouterAssociation,
        new: &RouterAssociation,
    ) -> NotifyResult {
        if !diff_resources(new, old).touches(ROUTER_ASSOC_NOTIFY_KEYS) {
            return Ok(());
        }
        let Some(bgpvpn) = self.committed_bgpvpn(tables, &new.bgpvpn_id) else {
            return Ok(());
        };
        self.push_update_on(&bgpvpn, self.topology.router_networks(&new.router_id))
    }

    fn delete_router_assoc_postcommit(&self, tables: &dyn AssociationTables, assoc: &RouterAssociation) -> NotifyResult {
        let Some(bgpvpn) = self.committed_bgpvpn(tables, &assoc.bgpvpn_id) else {
            return Ok(());
        };
        self.withdraw_from(tables, &bgpvpn, self.topology.router_networks(&assoc.router_id))
    }

    fn create_port_assoc_precommit(&self, tables: &dyn AssociationTables, assoc: &PortAssociation) -> BgpvpnResult<()> {
        if self.topology.get_port(&assoc.port_id).is_none() {
            return Err(BgpvpnError::not_found("port", assoc.port_id.clone()));
        }
        self.validate_routes(tables, assoc)
    }

    fn create_port_assoc_postcommit(&self, tables: &dyn AssociationTables, assoc: &PortAssociation) -> NotifyResult {
        self.refresh_port(tables, &assoc.port_id)
    }

    fn update_port_assoc_precommit(
        &self,
        tables: &dyn AssociationTables,
        _old: &PortAssociation,
        new: &PortAssociation,
    ) -> BgpvpnResult<()> {
        self.validate_routes(tables, new)
    }

    fn update_port_assoc_postcommit(
        &self,
        tables: &dyn AssociationTables,
        old: &PortAssociation,
        new: &PortAssociation,
    ) -> NotifyResult {
        if diff_resources(new, old).is_empty() {
            return Ok(());
        }
        self.refresh_port(tables, &new.port_id)
    }

    fn delete_port_assoc_postcommit(&self, tables: &dyn AssociationTables, assoc: &PortAssociation) -> NotifyResult {
        self.refresh_port(tables, &assoc.port_id)
    }
}

fn extend_unique(bgpvpns: &mut Vec<Bgpvpn>, more: Vec<Bgpvpn>) {
    for bgpvpn in more {
        if !bgpvpns.iter().any(|b| b.id == bgpvpn.id) {
            bgpvpns.push(bgpvpn);
        }
    }
}

/// Folds the results of several pushes: every push was attempted, the
/// first failure is reported.
pub(crate) fn settle(results: Vec<NotifyResult>) -> NotifyResult {
    let total = results.len();
    let mut errors = results.into_iter().filter_map(Result::err);
    let Some(first) = errors.next() else {
        return Ok(());
    };
    let failed = 1 + errors.count();
    if failed == 1 {
        return Err(first);
    }
    Err(NotificationError::Partial {
        failed,
        total,
        first: Box::new(first),
    })
}
