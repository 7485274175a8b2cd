//! In-memory [`AssociationStore`].
//!
//! A transaction runs against a private copy of the tables, which replaces
//! the committed tables only when the transaction succeeds. Transactions are
//! serialized by a single mutex. Readers take the committed tables as an
//! `Arc` and release the mutex before looking at them.

use bgpvpn_types::{
    Bgpvpn, BgpvpnRequest, BgpvpnUpdate, NetworkAssociation, NetworkAssociationRequest,
    PortAssociation, PortAssociationRequest, PortAssociationUpdate, RouterAssociation,
    RouterAssociationRequest, RouterAssociationUpdate,
};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{BgpvpnError, BgpvpnResult};
use crate::store::{AssociationStore, AssociationTables};

const BGPVPN: &str = "bgpvpn";
const NET_ASSOC: &str = "network association";
const ROUTER_ASSOC: &str = "router association";
const PORT_ASSOC: &str = "port association";

/// Tables of the in-memory store, in creation order.
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    /// Stored without derived association lists.
    bgpvpns: Vec<Bgpvpn>,
    net_assocs: Vec<NetworkAssociation>,
    router_assocs: Vec<RouterAssociation>,
    port_assocs: Vec<PortAssociation>,
}

impl MemoryTables {
    fn stored_bgpvpn(&self, id: &str) -> BgpvpnResult<&Bgpvpn> {
        self.bgpvpns
            .iter()
            .find(|b| b.id == id)
            .ok_or_else(|| BgpvpnError::not_found(BGPVPN, id))
    }

    /// Fills in the derived association lists.
    fn hydrate(&self, stored: &Bgpvpn) -> Bgpvpn {
        let mut bgpvpn = stored.clone();
        bgpvpn.networks = self
            .net_assocs
            .iter()
            .filter(|a| a.bgpvpn_id == stored.id)
            .map(|a| a.network_id.clone())
            .collect();
        bgpvpn.routers = self
            .router_assocs
            .iter()
            .filter(|a| a.bgpvpn_id == stored.id)
            .map(|a| a.router_id.clone())
            .collect();
        bgpvpn.ports = self
            .port_assocs
            .iter()
            .filter(|a| a.bgpvpn_id == stored.id)
            .map(|a| a.port_id.clone())
            .collect();
        bgpvpn
    }

    fn hydrate_ids<'a>(&self, ids: impl Iterator<Item = &'a str>) -> Vec<Bgpvpn> {
        let mut found: Vec<Bgpvpn> = Vec::new();
        for id in ids {
            if found.iter().any(|b| b.id == id) {
                continue;
            }
            if let Ok(stored) = self.stored_bgpvpn(id) {
                found.push(self.hydrate(stored));
            }
        }
        found
    }

    /// Tenant of a new association: explicit, else the owning BGPVPN's.
    fn assoc_tenant(&self, bgpvpn_id: &str, requested: &Option<String>) -> BgpvpnResult<String> {
        let owner = self.stored_bgpvpn(bgpvpn_id)?;
        Ok(requested.clone().unwrap_or_else(|| owner.tenant_id.clone()))
    }
}

/// Uses the requested id if it is free, else allocates a fresh one.
fn allocate_id<A>(
    rows: &[A],
    kind: &str,
    requested: &Option<String>,
    id_of: impl Fn(&A) -> &str,
) -> BgpvpnResult<String> {
    match requested {
        Some(id) if rows.iter().any(|row| id_of(row) == id.as_str()) => Err(BgpvpnError::conflict(
            format!("{} {} already exists", kind, id),
        )),
        Some(id) => Ok(id.clone()),
        None => Ok(Uuid::new_v4().to_string()),
    }
}

fn find_owned<'a, A>(
    rows: &'a [A],
    kind: &str,
    bgpvpn_id: &str,
    id: &str,
    key: impl Fn(&A) -> (&str, &str),
) -> BgpvpnResult<&'a A> {
    rows.iter()
        .find(|row| key(*row) == (bgpvpn_id, id))
        .ok_or_else(|| BgpvpnError::not_found(kind, id))
}

fn position_owned<A>(
    rows: &[A],
    kind: &str,
    bgpvpn_id: &str,
    id: &str,
    key: impl Fn(&A) -> (&str, &str),
) -> BgpvpnResult<usize> {
    rows.iter()
        .position(|row| key(row) == (bgpvpn_id, id))
        .ok_or_else(|| BgpvpnError::not_found(kind, id))
}

fn net_key(a: &NetworkAssociation) -> (&str, &str) {
    (&a.bgpvpn_id, &a.id)
}

fn router_key(a: &RouterAssociation) -> (&str, &str) {
    (&a.bgpvpn_id, &a.id)
}

fn port_key(a: &PortAssociation) -> (&str, &str) {
    (&a.bgpvpn_id, &a.id)
}

impl AssociationTables for MemoryTables {
    fn create_bgpvpn(&mut self, request: &BgpvpnRequest) -> BgpvpnResult<Bgpvpn> {
        let bgpvpn = Bgpvpn {
            id: allocate_id(&self.bgpvpns, BGPVPN, &request.id, |b| b.id.as_str())?,
            tenant_id: request.tenant_id.clone(),
            name: request.name.clone(),
            vpn_type: request.vpn_type,
            route_targets: request.route_targets.clone(),
            import_targets: request.import_targets.clone(),
            export_targets: request.export_targets.clone(),
            route_distinguishers: request.route_distinguishers.clone(),
            networks: Vec::new(),
            routers: Vec::new(),
            ports: Vec::new(),
        };
        self.bgpvpns.push(bgpvpn.clone());
        Ok(bgpvpn)
    }

    fn get_bgpvpn(&self, id: &str) -> BgpvpnResult<Bgpvpn> {
        self.stored_bgpvpn(id).map(|b| self.hydrate(b))
    }

    fn list_bgpvpns(&self) -> Vec<Bgpvpn> {
        self.bgpvpns.iter().map(|b| self.hydrate(b)).collect()
    }

    fn update_bgpvpn(&mut self, id: &str, changes: &BgpvpnUpdate) -> BgpvpnResult<Bgpvpn> {
        let stored = self
            .bgpvpns
            .iter_mut()
            .find(|b| b.id == id)
            .ok_or_else(|| BgpvpnError::not_found(BGPVPN, id))?;
        changes.apply_to(stored);
        let updated = stored.clone();
        Ok(self.hydrate(&updated))
    }

    fn delete_bgpvpn(&mut self, id: &str) -> BgpvpnResult<Bgpvpn> {
        let snapshot = self.get_bgpvpn(id)?;
        self.bgpvpns.retain(|b| b.id != id);
        self.net_assocs.retain(|a| a.bgpvpn_id != id);
        self.router_assocs.retain(|a| a.bgpvpn_id != id);
        self.port_assocs.retain(|a| a.bgpvpn_id != id);
        Ok(snapshot)
    }

    fn create_net_assoc(
        &mut self,
        bgpvpn_id: &str,
        request: &NetworkAssociationRequest,
    ) -> BgpvpnResult<NetworkAssociation> {
        let tenant_id = self.assoc_tenant(bgpvpn_id, &request.tenant_id)?;
        if self
            .net_assocs
            .iter()
            .any(|a| a.bgpvpn_id == bgpvpn_id && a.network_id == request.network_id)
        {
            return Err(BgpvpnError::conflict(format!(
                "network {} is already associated to bgpvpn {}",
                request.network_id, bgpvpn_id
            )));
        }
        let assoc = NetworkAssociation {
            id: allocate_id(&self.net_assocs, NET_ASSOC, &request.id, |a| a.id.as_str())?,
            bgpvpn_id: bgpvpn_id.to_string(),
            network_id: request.network_id.clone(),
            tenant_id,
        };
        self.net_assocs.push(assoc.clone());
        Ok(assoc)
    }

    fn get_net_assoc(&self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<NetworkAssociation> {
        self.stored_bgpvpn(bgpvpn_id)?;
        find_owned(&self.net_assocs, NET_ASSOC, bgpvpn_id, id, net_key).cloned()
    }

    fn list_net_assocs(&self, bgpvpn_id: &str) -> BgpvpnResult<Vec<NetworkAssociation>> {
        self.stored_bgpvpn(bgpvpn_id)?;
        Ok(self
            .net_assocs
            .iter()
            .filter(|a| a.bgpvpn_id == bgpvpn_id)
            .cloned()
            .collect())
    }

    fn delete_net_assoc(&mut self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<NetworkAssociation> {
        self.stored_bgpvpn(bgpvpn_id)?;
        let index = position_owned(&self.net_assocs, NET_ASSOC, bgpvpn_id, id, net_key)?;
        Ok(self.net_assocs.remove(index))
    }

    fn create_router_assoc(
        &mut self,
        bgpvpn_id: &str,
        request: &RouterAssociationRequest,
    ) -> BgpvpnResult<RouterAssociation> {
        let tenant_id = self.assoc_tenant(bgpvpn_id, &request.tenant_id)?;
        if self
            .router_assocs
            .iter()
            .any(|a| a.bgpvpn_id == bgpvpn_id && a.router_id == request.router_id)
        {
            return Err(BgpvpnError::conflict(format!(
                "router {} is already associated to bgpvpn {}",
                request.router_id, bgpvpn_id
            )));
        }
        let assoc = RouterAssociation {
            id: allocate_id(&self.router_assocs, ROUTER_ASSOC, &request.id, |a| a.id.as_str())?,
            bgpvpn_id: bgpvpn_id.to_string(),
            router_id: request.router_id.clone(),
            tenant_id,
            advertise_extra_routes: request.advertise_extra_routes,
        };
        self.router_assocs.push(assoc.clone());
        Ok(assoc)
    }

    fn get_router_assoc(&self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<RouterAssociation> {
        self.stored_bgpvpn(bgpvpn_id)?;
        find_owned(&self.router_assocs, ROUTER_ASSOC, bgpvpn_id, id, router_key).cloned()
    }

    fn list_router_assocs(&self, bgpvpn_id: &str) -> BgpvpnResult<Vec<RouterAssociation>> {
        self.stored_bgpvpn(bgpvpn_id)?;
        Ok(self
            .router_assocs
            .iter()
            .filter(|a| a.bgpvpn_id == bgpvpn_id)
            .cloned()
            .collect())
    }

    fn update_router_assoc(
        &mut self,
        bgpvpn_id: &str,
        id: &str,
        changes: &RouterAssociationUpdate,
    ) -> BgpvpnResult<RouterAssociation> {
        self.stored_bgpvpn(bgpvpn_id)?;
        let index = position_owned(&self.router_assocs, ROUTER_ASSOC, bgpvpn_id, id, router_key)?;
        let assoc = &mut self.router_assocs[index];
        if let Some(advertise) = changes.advertise_extra_routes {
            assoc.advertise_extra_routes = advertise;
        }
        Ok(assoc.clone())
    }

    fn delete_router_assoc(&mut self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<RouterAssociation> {
        self.stored_bgpvpn(bgpvpn_id)?;
        let index = position_owned(&self.router_assocs, ROUTER_ASSOC, bgpvpn_id, id, router_key)?;
        Ok(self.router_assocs.remove(index))
    }

    fn create_port_assoc(
        &mut self,
        bgpvpn_id: &str,
        request: &PortAssociationRequest,
    ) -> BgpvpnResult<PortAssociation> {
        let tenant_id = self.assoc_tenant(bgpvpn_id, &request.tenant_id)?;
        if self
            .port_assocs
            .iter()
            .any(|a| a.bgpvpn_id == bgpvpn_id && a.port_id == request.port_id)
        {
            return Err(BgpvpnError::conflict(format!(
                "port {} is already associated to bgpvpn {}",
                request.port_id, bgpvpn_id
            )));
        }
        let assoc = PortAssociation {
            id: allocate_id(&self.port_assocs, PORT_ASSOC, &request.id, |a| a.id.as_str())?,
            bgpvpn_id: bgpvpn_id.to_string(),
            port_id: request.port_id.clone(),
            tenant_id,
            advertise_fixed_ips: request.advertise_fixed_ips,
            routes: request.routes.clone(),
        };
        self.port_assocs.push(assoc.clone());
        Ok(assoc)
    }

    fn get_port_assoc(&self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<PortAssociation> {
        self.stored_bgpvpn(bgpvpn_id)?;
        find_owned(&self.port_assocs, PORT_ASSOC, bgpvpn_id, id, port_key).cloned()
    }

    fn list_port_assocs(&self, bgpvpn_id: &str) -> BgpvpnResult<Vec<PortAssociation>> {
        self.stored_bgpvpn(bgpvpn_id)?;
        Ok(self
            .port_assocs
            .iter()
            .filter(|a| a.bgpvpn_id == bgpvpn_id)
            .cloned()
            .collect())
    }

    fn update_port_assoc(
        &mut self,
        bgpvpn_id: &str,
        id: &str,
        changes: &PortAssociationUpdate,
    ) -> BgpvpnResult<PortAssociation> {
        self.stored_bgpvpn(bgpvpn_id)?;
        let index = position_owned(&self.port_assocs, PORT_ASSOC, bgpvpn_id, id, port_key)?;
        let assoc = &mut self.port_assocs[index];
        if let Some(advertise) = changes.advertise_fixed_ips {
            assoc.advertise_fixed_ips = advertise;
        }
        if let Some(routes) = &changes.routes {
            assoc.routes = routes.clone();
        }
        Ok(assoc.clone())
    }

    fn delete_port_assoc(&mut self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<PortAssociation> {
        self.stored_bgpvpn(bgpvpn_id)?;
        let index = position_owned(&self.port_assocs, PORT_ASSOC, bgpvpn_id, id, port_key)?;
        Ok(self.port_assocs.remove(index))
    }

    fn find_bgpvpns_for_network(&self, network_id: &str) -> Vec<Bgpvpn> {
        self.hydrate_ids(
            self.net_assocs
                .iter()
                .filter(|a| a.network_id == network_id)
                .map(|a| a.bgpvpn_id.as_str()),
        )
    }

    fn find_bgpvpns_for_router(&self, router_id: &str) -> Vec<Bgpvpn> {
        self.hydrate_ids(
            self.router_assocs
                .iter()
                .filter(|a| a.router_id == router_id)
                .map(|a| a.bgpvpn_id.as_str()),
        )
    }

    fn find_bgpvpns_for_port(&self, port_id: &str) -> Vec<Bgpvpn> {
        self.hydrate_ids(
            self.port_assocs
                .iter()
                .filter(|a| a.port_id == port_id)
                .map(|a| a.bgpvpn_id.as_str()),
        )
    }

    fn find_port_assocs_for_port(&self, port_id: &str) -> Vec<PortAssociation> {
        self.port_assocs
            .iter()
            .filter(|a| a.port_id == port_id)
            .cloned()
            .collect()
    }
}

/// In-memory association store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    committed: Mutex<Arc<MemoryTables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AssociationStore for MemoryStore {
    type Tables = MemoryTables;

    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&mut MemoryTables) -> Result<T, E>,
    {
        let mut committed = self.committed.lock();
        let mut working = MemoryTables::clone(&committed);
        let result = f(&mut working)?;
        *committed = Arc::new(working);
        Ok(result)
    }

    fn snapshot(&self) -> Arc<MemoryTables> {
        Arc::clone(&self.committed.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bgpvpn_types::{Route, VpnType};
    use pretty_assertions::assert_eq;

    fn request(tenant: &str) -> BgpvpnRequest {
        BgpvpnRequest {
            tenant_id: tenant.into(),
            name: "vpn".into(),
            vpn_type: VpnType::L3,
            route_targets: vec!["64512:1".parse().unwrap()],
            ..Default::default()
        }
    }

    fn net(network_id: &str) -> NetworkAssociationRequest {
        NetworkAssociationRequest::new(network_id)
    }

    #[test]
    fn test_create_and_get_bgpvpn() {
        let store = MemoryStore::new();
        let created = store
            .transaction(|t| t.create_bgpvpn(&request("t1")))
            .unwrap();
        let fetched = store.read(|t| t.get_bgpvpn(&created.id)).unwrap();
        assert_eq!(created, fetched);
        assert!(store.read(|t| t.get_bgpvpn("missing")).unwrap_err().is_not_found());
    }

    #[test]
    fn test_derived_lists_follow_associations() {
        let mut tables = MemoryTables::default();
        let b = tables.create_bgpvpn(&request("t1")).unwrap();
        tables.create_net_assoc(&b.id, &net("n1")).unwrap();
        tables.create_net_assoc(&b.id, &net("n2")).unwrap();
        tables
            .create_router_assoc(&b.id, &RouterAssociationRequest::new("r1"))
            .unwrap();
        tables
            .create_port_assoc(&b.id, &PortAssociationRequest::new("p1"))
            .unwrap();

        let b = tables.get_bgpvpn(&b.id).unwrap();
        assert_eq!(b.networks, vec!["n1".to_string(), "n2".to_string()]);
        assert_eq!(b.routers, vec!["r1".to_string()]);
        assert_eq!(b.ports, vec!["p1".to_string()]);
    }

    #[test]
    fn test_association_requires_parent() {
        let mut tables = MemoryTables::default();
        let err = tables.create_net_assoc("missing", &net("n1")).unwrap_err();
        assert_eq!(err, BgpvpnError::not_found("bgpvpn", "missing"));
    }

    #[test]
    fn test_requested_ids() {
        let mut tables = MemoryTables::default();
        let b = tables
            .create_bgpvpn(&BgpvpnRequest {
                id: Some("vpn-a".into()),
                ..request("t1")
            })
            .unwrap();
        assert_eq!(b.id, "vpn-a");
        assert!(matches!(
            tables.create_bgpvpn(&BgpvpnRequest {
                id: Some("vpn-a".into()),
                ..request("t1")
            }),
            Err(BgpvpnError::Conflict { .. })
        ));

        let assoc = tables
            .create_net_assoc("vpn-a", &net("n1").with_id("na-1"))
            .unwrap();
        assert_eq!(assoc.id, "na-1");
        assert_eq!(tables.get_net_assoc("vpn-a", "na-1").unwrap(), assoc);
    }

    #[test]
    fn test_association_tenant_defaults_to_owner() {
        let mut tables = MemoryTables::default();
        let b = tables.create_bgpvpn(&request("t1")).unwrap();
        let assoc = tables.create_net_assoc(&b.id, &net("n1")).unwrap();
        assert_eq!(assoc.tenant_id, "t1");
    }

    #[test]
    fn test_duplicate_associations_conflict() {
        let mut tables = MemoryTables::default();
        let b = tables.create_bgpvpn(&request("t1")).unwrap();
        tables.create_net_assoc(&b.id, &net("n1")).unwrap();
        assert!(matches!(
            tables.create_net_assoc(&b.id, &net("n1")),
            Err(BgpvpnError::Conflict { .. })
        ));

        tables
            .create_port_assoc(&b.id, &PortAssociationRequest::new("p1"))
            .unwrap();
        assert!(matches!(
            tables.create_port_assoc(&b.id, &PortAssociationRequest::new("p1")),
            Err(BgpvpnError::Conflict { .. })
        ));

        tables
            .create_router_assoc(&b.id, &RouterAssociationRequest::new("r1"))
            .unwrap();
        assert!(matches!(
            tables.create_router_assoc(&b.id, &RouterAssociationRequest::new("r1")),
            Err(BgpvpnError::Conflict { .. })
        ));
    }

    #[test]
    fn test_same_network_in_two_bgpvpns_is_allowed() {
        let mut tables = MemoryTables::default();
        let b1 = tables.create_bgpvpn(&request("t1")).unwrap();
        let b2 = tables.create_bgpvpn(&request("t1")).unwrap();
        tables.create_net_assoc(&b1.id, &net("n1")).unwrap();
        tables.create_net_assoc(&b2.id, &net("n1")).unwrap();

        let found = tables.find_bgpvpns_for_network("n1");
        assert_eq!(
            found.iter().map(|b| b.id.as_str()).collect::<Vec<_>>(),
            vec![b1.id.as_str(), b2.id.as_str()]
        );
    }

    #[test]
    fn test_delete_cascades() {
        let store = MemoryStore::new();
        let b = store
            .transaction(|t| {
                let b = t.create_bgpvpn(&request("t1"))?;
                t.create_net_assoc(&b.id, &net("n1"))?;
                t.create_router_assoc(&b.id, &RouterAssociationRequest::new("r1"))?;
                t.create_port_assoc(&b.id, &PortAssociationRequest::new("p1"))?;
                Ok::<_, BgpvpnError>(b)
            })
            .unwrap();

        let snapshot = store.transaction(|t| t.delete_bgpvpn(&b.id)).unwrap();
        assert_eq!(snapshot.networks, vec!["n1".to_string()]);

        store.read(|t| {
            assert!(t.find_bgpvpns_for_network("n1").is_empty());
            assert!(t.find_bgpvpns_for_router("r1").is_empty());
            assert!(t.find_port_assocs_for_port("p1").is_empty());
        });
        assert!(store
            .transaction(|t| t.delete_bgpvpn(&b.id))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_failed_transaction_discards_writes() {
        let store = MemoryStore::new();
        let result: Result<(), BgpvpnError> = store.transaction(|t| {
            t.create_bgpvpn(&request("t1"))?;
            Err(BgpvpnError::unsupported("route distinguishers"))
        });
        assert!(result.is_err());
        assert!(store.read(|t| t.list_bgpvpns()).is_empty());
    }

    #[test]
    fn test_snapshot_does_not_block_commits() {
        let store = MemoryStore::new();
        let before = store.snapshot();

        // Would deadlock if the snapshot kept the store locked.
        let created = store.transaction(|t| t.create_bgpvpn(&request("t1"))).unwrap();

        assert!(before.list_bgpvpns().is_empty());
        assert_eq!(store.snapshot().list_bgpvpns(), vec![created]);
    }

    #[test]
    fn test_update_port_assoc_routes() {
        let mut tables = MemoryTables::default();
        let b = tables.create_bgpvpn(&request("t1")).unwrap();
        let assoc = tables
            .create_port_assoc(&b.id, &PortAssociationRequest::new("p1"))
            .unwrap();
        let route = Route::Prefix {
            prefix: "10.1.0.0/16".parse().unwrap(),
            local_pref: None,
        };
        let updated = tables
            .update_port_assoc(
                &b.id,
                &assoc.id,
                &PortAssociationUpdate {
                    advertise_fixed_ips: Some(false),
                    routes: Some(vec![route.clone()]),
                },
            )
            .unwrap();
        assert!(!updated.advertise_fixed_ips);
        assert_eq!(updated.routes, vec![route]);
    }

    #[test]
    fn test_association_lookup_is_scoped_to_owner() {
        let mut tables = MemoryTables::default();
        let b1 = tables.create_bgpvpn(&request("t1")).unwrap();
        let b2 = tables.create_bgpvpn(&request("t1")).unwrap();
        let assoc = tables.create_net_assoc(&b1.id, &net("n1")).unwrap();
        assert!(tables.get_net_assoc(&b2.id, &assoc.id).unwrap_err().is_not_found());
        assert!(tables.delete_net_assoc(&b2.id, &assoc.id).is_err());
        assert_eq!(tables.delete_net_assoc(&b1.id, &assoc.id).unwrap(), assoc);
    }
}
