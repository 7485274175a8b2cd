//! Persistence seam for BGPVPNs and their associations.
//!
//! [`AssociationTables`] is the set of tables visible inside a transaction;
//! [`AssociationStore`] provides the transaction boundary. Precommit hooks
//! run against the tables of the open transaction, so an error returned
//! from a hook discards every write made in it.

use std::sync::Arc;

use bgpvpn_types::{
    Bgpvpn, BgpvpnRequest, BgpvpnUpdate, NetworkAssociation, NetworkAssociationRequest,
    PortAssociation, PortAssociationRequest, PortAssociationUpdate, RouterAssociation,
    RouterAssociationRequest, RouterAssociationUpdate,
};

use crate::error::BgpvpnResult;

/// CRUD access to BGPVPNs and their network, router and port associations.
///
/// Returned [`Bgpvpn`] values always carry their derived `networks`,
/// `routers` and `ports` lists. Deleting a BGPVPN deletes its associations.
/// Association operations take the owning BGPVPN id and fail with
/// `NotFound` if it does not exist.
pub trait AssociationTables {
    fn create_bgpvpn(&mut self, request: &BgpvpnRequest) -> BgpvpnResult<Bgpvpn>;
    fn get_bgpvpn(&self, id: &str) -> BgpvpnResult<Bgpvpn>;
    fn list_bgpvpns(&self) -> Vec<Bgpvpn>;
    fn update_bgpvpn(&mut self, id: &str, changes: &BgpvpnUpdate) -> BgpvpnResult<Bgpvpn>;
    /// Deletes the BGPVPN and cascades to its associations. Returns the
    /// BGPVPN as it was before deletion.
    fn delete_bgpvpn(&mut self, id: &str) -> BgpvpnResult<Bgpvpn>;

    fn create_net_assoc(
        &mut self,
        bgpvpn_id: &str,
        request: &NetworkAssociationRequest,
    ) -> BgpvpnResult<NetworkAssociation>;
    fn get_net_assoc(&self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<NetworkAssociation>;
    fn list_net_assocs(&self, bgpvpn_id: &str) -> BgpvpnResult<Vec<NetworkAssociation>>;
    fn delete_net_assoc(&mut self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<NetworkAssociation>;

    fn create_router_assoc(
        &mut self,
        bgpvpn_id: &str,
        request: &RouterAssociationRequest,
    ) -> BgpvpnResult<RouterAssociation>;
    fn get_router_assoc(&self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<RouterAssociation>;
    fn list_router_assocs(&self, bgpvpn_id: &str) -> BgpvpnResult<Vec<RouterAssociation>>;
    fn update_router_assoc(
        &mut self,
        bgpvpn_id: &str,
        id: &str,
        changes: &RouterAssociationUpdate,
    ) -> BgpvpnResult<RouterAssociation>;
    fn delete_router_assoc(&mut self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<RouterAssociation>;

    fn create_port_assoc(
        &mut self,
        bgpvpn_id: &str,
        request: &PortAssociationRequest,
    ) -> BgpvpnResult<PortAssociation>;
    fn get_port_assoc(&self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<PortAssociation>;
    fn list_port_assocs(&self, bgpvpn_id: &str) -> BgpvpnResult<Vec<PortAssociation>>;
    fn update_port_assoc(
        &mut self,
        bgpvpn_id: &str,
        id: &str,
        changes: &PortAssociationUpdate,
    ) -> BgpvpnResult<PortAssociation>;
    fn delete_port_assoc(&mut self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<PortAssociation>;

    /// BGPVPNs with a network association on `network_id`.
    fn find_bgpvpns_for_network(&self, network_id: &str) -> Vec<Bgpvpn>;
    /// BGPVPNs with a router association on `router_id`.
    fn find_bgpvpns_for_router(&self, router_id: &str) -> Vec<Bgpvpn>;
    /// BGPVPNs with a port association on `port_id`.
    fn find_bgpvpns_for_port(&self, port_id: &str) -> Vec<Bgpvpn>;
    fn find_port_assocs_for_port(&self, port_id: &str) -> Vec<PortAssociation>;
}

/// Transactional access to [`AssociationTables`].
///
/// Transactions are all-or-nothing: if the closure returns `Err`, none of
/// its writes become visible.
pub trait AssociationStore: Send + Sync {
    type Tables: AssociationTables;

    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self::Tables) -> Result<T, E>;

    /// The committed tables as of now. Holding a snapshot never blocks
    /// transactions; later commits are not visible through it.
    fn snapshot(&self) -> Arc<Self::Tables>;

    /// Runs `f` against a snapshot of the committed tables.
    fn read<T, F>(&self, f: F) -> T
    where
        F: FnOnce(&Self::Tables) -> T,
    {
        f(&*self.snapshot())
    }
}
