//! Precommit/postcommit lifecycle of BGPVPNs and their associations.
//!
//! Every mutation follows the same state machine:
//!
//! ```text
//! Absent --persist--> PrecommitPending --precommit ok--> Committed --postcommit--> (done)
//!                            |
//!                            +--precommit err--> Absent (transaction discarded)
//! ```
//!
//! Precommit hooks run inside the store transaction: an error aborts the
//! mutation and nothing is persisted. Postcommit hooks run after commit and
//! only push notifications; their failures are logged and never reach the
//! caller.

use std::sync::Arc;

use bgpvpn_types::{
    Bgpvpn, BgpvpnRequest, BgpvpnUpdate, NetworkAssociation, NetworkAssociationRequest,
    PortAssociation, PortAssociationRequest, PortAssociationUpdate, RouterAssociation,
    RouterAssociationRequest, RouterAssociationUpdate,
};
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::audit::{AuditCategory, AuditRecord};
use crate::audit_log;
use crate::error::{BgpvpnResult, NotifyResult};
use crate::store::{AssociationStore, AssociationTables};

const AUDIT_SOURCE: &str = "AssociationLifecycle";

/// Lifecycle state of a resource during one mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Absent,
    PrecommitPending,
    Committed,
}

/// Driver hooks around each mutation.
///
/// Precommit hooks see the tables of the open transaction, including the
/// write being validated. Postcommit hooks see the committed tables.
/// Every hook defaults to a no-op.
pub trait LifecycleHooks: Send + Sync {
    fn create_bgpvpn_precommit(&self, _tables: &dyn AssociationTables, _bgpvpn: &Bgpvpn) -> BgpvpnResult<()> {
        Ok(())
    }

    fn create_bgpvpn_postcommit(&self, _tables: &dyn AssociationTables, _bgpvpn: &Bgpvpn) -> NotifyResult {
        Ok(())
    }

    fn update_bgpvpn_precommit(
        &self,
        _tables: &dyn AssociationTables,
        _old: &Bgpvpn,
        _new: &Bgpvpn,
    ) -> BgpvpnResult<()> {
        Ok(())
    }

    fn update_bgpvpn_postcommit(&self, _tables: &dyn AssociationTables, _old: &Bgpvpn, _new: &Bgpvpn) -> NotifyResult {
        Ok(())
    }

    /// Runs before the BGPVPN and its associations are removed.
    fn delete_bgpvpn_precommit(&self, _tables: &dyn AssociationTables, _bgpvpn: &Bgpvpn) -> BgpvpnResult<()> {
        Ok(())
    }

    /// `bgpvpn` is the snapshot taken before deletion.
    fn delete_bgpvpn_postcommit(&self, _tables: &dyn AssociationTables, _bgpvpn: &Bgpvpn) -> NotifyResult {
        Ok(())
    }

    fn create_net_assoc_precommit(
        &self,
        _tables: &dyn AssociationTables,
        _assoc: &NetworkAssociation,
    ) -> BgpvpnResult<()> {
        Ok(())
    }

    fn create_net_assoc_postcommit(&self, _tables: &dyn AssociationTables, _assoc: &NetworkAssociation) -> NotifyResult {
        Ok(())
    }

    fn delete_net_assoc_precommit(
        &self,
        _tables: &dyn AssociationTables,
        _assoc: &NetworkAssociation,
    ) -> BgpvpnResult<()> {
        Ok(())
    }

    fn delete_net_assoc_postcommit(&self, _tables: &dyn AssociationTables, _assoc: &NetworkAssociation) -> NotifyResult {
        Ok(())
    }

    fn create_router_assoc_precommit(
        &self,
        _tables: &dyn AssociationTables,
        _assoc: &RouterAssociation,
    ) -> BgpvpnResult<()> {
        Ok(())
    }

    fn create_router_assoc_postcommit(&self, _tables: &dyn AssociationTables, _assoc: &RouterAssociation) -> NotifyResult {
        Ok(())
    }

    fn update_router_assoc_precommit(
        &self,
        _tables: &dyn AssociationTables,
        _old: &RouterAssociation,
        _new: &RouterAssociation,
    ) -> BgpvpnResult<()> {
        Ok(())
    }

    fn update_router_assoc_postcommit(
        &self,
        _tables: &dyn AssociationTables,
        _old: &RouterAssociation,
        _new: &RouterAssociation,
    ) -> NotifyResult {
        Ok(())
    }

    fn delete_router_assoc_precommit(
        &self,
        _tables: &dyn AssociationTables,
        _assoc: &RouterAssociation,
    ) -> BgpvpnResult<()> {
        Ok(())
    }

    fn delete_router_assoc_postcommit(&self, _tables: &dyn AssociationTables, _assoc: &RouterAssociation) -> NotifyResult {
        Ok(())
    }

    fn create_port_assoc_precommit(&self, _tables: &dyn AssociationTables, _assoc: &PortAssociation) -> BgpvpnResult<()> {
        Ok(())
    }

    fn create_port_assoc_postcommit(&self, _tables: &dyn AssociationTables, _assoc: &PortAssociation) -> NotifyResult {
        Ok(())
    }

    fn update_port_assoc_precommit(
        &self,
        _tables: &dyn AssociationTables,
        _old: &PortAssociation,
        _new: &PortAssociation,
    ) -> BgpvpnResult<()> {
        Ok(())
    }

    fn update_port_assoc_postcommit(
        &self,
        _tables: &dyn AssociationTables,
        _old: &PortAssociation,
        _new: &PortAssociation,
    ) -> NotifyResult {
        Ok(())
    }

    fn delete_port_assoc_precommit(&self, _tables: &dyn AssociationTables, _assoc: &PortAssociation) -> BgpvpnResult<()> {
        Ok(())
    }

    fn delete_port_assoc_postcommit(&self, _tables: &dyn AssociationTables, _assoc: &PortAssociation) -> NotifyResult {
        Ok(())
    }
}

/// Hooks that accept everything and notify nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHooks;

impl LifecycleHooks for NullHooks {}

/// Persistence plus notification for BGPVPNs and their associations.
pub struct AssociationLifecycle<S, H: ?Sized> {
    store: Arc<S>,
    hooks: Arc<H>,
}

impl<S, H: ?Sized> Clone for AssociationLifecycle<S, H> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            hooks: Arc::clone(&self.hooks),
        }
    }
}

impl<S, H> AssociationLifecycle<S, H>
where
    S: AssociationStore,
    H: LifecycleHooks + ?Sized,
{
    pub fn new(store: Arc<S>, hooks: Arc<H>) -> Self {
        Self { store, hooks }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn hooks(&self) -> &Arc<H> {
        &self.hooks
    }

    // ---- BGPVPN ----

    pub fn get_bgpvpn(&self, id: &str) -> BgpvpnResult<Bgpvpn> {
        self.store.read(|tables| tables.get_bgpvpn(id))
    }

    pub fn list_bgpvpns(&self) -> Vec<Bgpvpn> {
        self.store.read(|tables| tables.list_bgpvpns())
    }

    #[instrument(skip(self, request), fields(tenant_id = %request.tenant_id, vpn_type = %request.vpn_type))]
    pub fn create_bgpvpn(&self, request: &BgpvpnRequest) -> BgpvpnResult<Bgpvpn> {
        let result: BgpvpnResult<_> = self.store.transaction(|tables| {
            let bgpvpn = tables.create_bgpvpn(request)?;
            pending("bgpvpn", &bgpvpn.id);
            self.hooks.create_bgpvpn_precommit(&*tables, &bgpvpn)?;
            Ok(bgpvpn)
        });
        let bgpvpn = audited(AuditCategory::ResourceCreate, "create_bgpvpn", "bgpvpn", result, |b| {
            b.id.clone()
        })?;

        self.postcommit("create_bgpvpn", &bgpvpn.id, |tables| {
            self.hooks.create_bgpvpn_postcommit(tables, &bgpvpn)
        });
        Ok(bgpvpn)
    }

    #[instrument(skip(self, changes))]
    pub fn update_bgpvpn(&self, id: &str, changes: &BgpvpnUpdate) -> BgpvpnResult<Bgpvpn> {
        let result: BgpvpnResult<_> = self.store.transaction(|tables| {
            let old = tables.get_bgpvpn(id)?;
            let new = tables.update_bgpvpn(id, changes)?;
            pending("bgpvpn", id);
            self.hooks.update_bgpvpn_precommit(&*tables, &old, &new)?;
            Ok((old, new))
        });
        let (old, new) = audited(AuditCategory::ResourceModify, "update_bgpvpn", "bgpvpn", result, |_| {
            id.to_string()
        })?;

        self.postcommit("update_bgpvpn", id, |tables| {
            self.hooks.update_bgpvpn_postcommit(tables, &old, &new)
        });
        Ok(new)
    }

    /// Deletes a BGPVPN and all of its associations.
    #[instrument(skip(self))]
    pub fn delete_bgpvpn(&self, id: &str) -> BgpvpnResult<()> {
        let result: BgpvpnResult<_> = self.store.transaction(|tables| {
            let snapshot = tables.get_bgpvpn(id)?;
            pending("bgpvpn", id);
            self.hooks.delete_bgpvpn_precommit(&*tables, &snapshot)?;
            tables.delete_bgpvpn(id)
        });
        let snapshot = audited(AuditCategory::ResourceDelete, "delete_bgpvpn", "bgpvpn", result, |_| {
            id.to_string()
        })?;

        self.postcommit("delete_bgpvpn", id, |tables| {
            self.hooks.delete_bgpvpn_postcommit(tables, &snapshot)
        });
        Ok(())
    }

    // ---- Network associations ----

    pub fn get_net_assoc(&self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<NetworkAssociation> {
        self.store.read(|tables| tables.get_net_assoc(bgpvpn_id, id))
    }

    pub fn list_net_assocs(&self, bgpvpn_id: &str) -> BgpvpnResult<Vec<NetworkAssociation>> {
        self.store.read(|tables| tables.list_net_assocs(bgpvpn_id))
    }

    #[instrument(skip(self, request), fields(network_id = %request.network_id))]
    pub fn create_net_assoc(
        &self,
        bgpvpn_id: &str,
        request: &NetworkAssociationRequest,
    ) -> BgpvpnResult<NetworkAssociation> {
        let result: BgpvpnResult<_> = self.store.transaction(|tables| {
            let assoc = tables.create_net_assoc(bgpvpn_id, request)?;
            pending("network_association", &assoc.id);
            self.hooks.create_net_assoc_precommit(&*tables, &assoc)?;
            Ok(assoc)
        });
        let assoc = audited(
            AuditCategory::ResourceCreate,
            "create_net_assoc",
            "network_association",
            result,
            |a| a.id.clone(),
        )?;

        self.postcommit("create_net_assoc", &assoc.id, |tables| {
            self.hooks.create_net_assoc_postcommit(tables, &assoc)
        });
        Ok(assoc)
    }

    #[instrument(skip(self))]
    pub fn delete_net_assoc(&self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<()> {
        let result: BgpvpnResult<_> = self.store.transaction(|tables| {
            let assoc = tables.get_net_assoc(bgpvpn_id, id)?;
            pending("network_association", id);
            self.hooks.delete_net_assoc_precommit(&*tables, &assoc)?;
            tables.delete_net_assoc(bgpvpn_id, id)
        });
        let assoc = audited(
            AuditCategory::ResourceDelete,
            "delete_net_assoc",
            "network_association",
            result,
            |_| id.to_string(),
        )?;

        self.postcommit("delete_net_assoc", id, |tables| {
            self.hooks.delete_net_assoc_postcommit(tables, &assoc)
        });
        Ok(())
    }

    // ---- Router associations ----

    pub fn get_router_assoc(&self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<RouterAssociation> {
        self.store.read(|tables| tables.get_router_assoc(bgpvpn_id, id))
    }

    pub fn list_router_assocs(&self, bgpvpn_id: &str) -> BgpvpnResult<Vec<RouterAssociation>> {
        self.store.read(|tables| tables.list_router_assocs(bgpvpn_id))
    }

    #[instrument(skip(self, request), fields(router_id = %request.router_id))]
    pub fn create_router_assoc(
        &self,
        bgpvpn_id: &str,
        request: &RouterAssociationRequest,
    ) -> BgpvpnResult<RouterAssociation> {
        let result: BgpvpnResult<_> = self.store.transaction(|tables| {
            let assoc = tables.create_router_assoc(bgpvpn_id, request)?;
            pending("router_association", &assoc.id);
            self.hooks.create_router_assoc_precommit(&*tables, &assoc)?;
            Ok(assoc)
        });
        let assoc = audited(
            AuditCategory::ResourceCreate,
            "create_router_assoc",
            "router_association",
            result,
            |a| a.id.clone(),
        )?;

        self.postcommit("create_router_assoc", &assoc.id, |tables| {
            self.hooks.create_router_assoc_postcommit(tables, &assoc)
        });
        Ok(assoc)
    }

    #[instrument(skip(self, changes))]
    pub fn update_router_assoc(
        &self,
        bgpvpn_id: &str,
        id: &str,
        changes: &RouterAssociationUpdate,
    ) -> BgpvpnResult<RouterAssociation> {
        let result: BgpvpnResult<_> = self.store.transaction(|tables| {
            let old = tables.get_router_assoc(bgpvpn_id, id)?;
            let new = tables.update_router_assoc(bgpvpn_id, id, changes)?;
            pending("router_association", id);
            self.hooks.update_router_assoc_precommit(&*tables, &old, &new)?;
            Ok((old, new))
        });
        let (old, new) = audited(
            AuditCategory::ResourceModify,
            "update_router_assoc",
            "router_association",
            result,
            |_| id.to_string(),
        )?;

        self.postcommit("update_router_assoc", id, |tables| {
            self.hooks.update_router_assoc_postcommit(tables, &old, &new)
        });
        Ok(new)
    }

    #[instrument(skip(self))]
    pub fn delete_router_assoc(&self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<()> {
        let result: BgpvpnResult<_> = self.store.transaction(|tables| {
            let assoc = tables.get_router_assoc(bgpvpn_id, id)?;
            pending("router_association", id);
            self.hooks.delete_router_assoc_precommit(&*tables, &assoc)?;
            tables.delete_router_assoc(bgpvpn_id, id)
        });
        let assoc = audited(
            AuditCategory::ResourceDelete,
            "delete_router_assoc",
            "router_association",
            result,
            |_| id.to_string(),
        )?;

        self.postcommit("delete_router_assoc", id, |tables| {
            self.hooks.delete_router_assoc_postcommit(tables, &assoc)
        });
        Ok(())
    }

    // ---- Port associations ----

    pub fn get_port_assoc(&self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<PortAssociation> {
        self.store.read(|tables| tables.get_port_assoc(bgpvpn_id, id))
    }

    pub fn list_port_assocs(&self, bgpvpn_id: &str) -> BgpvpnResult<Vec<PortAssociation>> {
        self.store.read(|tables| tables.list_port_assocs(bgpvpn_id))
    }

    #[instrument(skip(self, request), fields(port_id = %request.port_id))]
    pub fn create_port_assoc(
        &self,
        bgpvpn_id: &str,
        request: &PortAssociationRequest,
    ) -> BgpvpnResult<PortAssociation> {
        let result: BgpvpnResult<_> = self.store.transaction(|tables| {
            let assoc = tables.create_port_assoc(bgpvpn_id, request)?;
            pending("port_association", &assoc.id);
            self.hooks.create_port_assoc_precommit(&*tables, &assoc)?;
            Ok(assoc)
        });
        let assoc = audited(
            AuditCategory::ResourceCreate,
            "create_port_assoc",
            "port_association",
            result,
            |a| a.id.clone(),
        )?;

        self.postcommit("create_port_assoc", &assoc.id, |tables| {
            self.hooks.create_port_assoc_postcommit(tables, &assoc)
        });
        Ok(assoc)
    }

    #[instrument(skip(self, changes))]
    pub fn update_port_assoc(
        &self,
        bgpvpn_id: &str,
        id: &str,
        changes: &PortAssociationUpdate,
    ) -> BgpvpnResult<PortAssociation> {
        let result: BgpvpnResult<_> = self.store.transaction(|tables| {
            let old = tables.get_port_assoc(bgpvpn_id, id)?;
            let new = tables.update_port_assoc(bgpvpn_id, id, changes)?;
            pending("port_association", id);
            self.hooks.update_port_assoc_precommit(&*tables, &old, &new)?;
            Ok((old, new))
        });
        let (old, new) = audited(
            AuditCategory::ResourceModify,
            "update_port_assoc",
            "port_association",
            result,
            |_| id.to_string(),
        )?;

        self.postcommit("update_port_assoc", id, |tables| {
            self.hooks.update_port_assoc_postcommit(tables, &old, &new)
        });
        Ok(new)
    }

    #[instrument(skip(self))]
    pub fn delete_port_assoc(&self, bgpvpn_id: &str, id: &str) -> BgpvpnResult<()> {
        let result: BgpvpnResult<_> = self.store.transaction(|tables| {
            let assoc = tables.get_port_assoc(bgpvpn_id, id)?;
            pending("port_association", id);
            self.hooks.delete_port_assoc_precommit(&*tables, &assoc)?;
            tables.delete_port_assoc(bgpvpn_id, id)
        });
        let assoc = audited(
            AuditCategory::ResourceDelete,
            "delete_port_assoc",
            "port_association",
            result,
            |_| id.to_string(),
        )?;

        self.postcommit("delete_port_assoc", id, |tables| {
            self.hooks.delete_port_assoc_postcommit(tables, &assoc)
        });
        Ok(())
    }

    /// Runs a postcommit hook against a snapshot of the committed tables, so
    /// agent pushes never hold the store. Failures are logged and dropped:
    /// the mutation is already committed.
    fn postcommit<F>(&self, action: &'static str, object_id: &str, hook: F)
    where
        F: FnOnce(&dyn AssociationTables) -> NotifyResult,
    {
        debug!(action, object_id, state = ?LifecycleState::Committed, "Running postcommit");
        let tables = self.store.snapshot();
        if let Err(e) = hook(&*tables as &dyn AssociationTables) {
            warn!(
                action,
                object_id,
                error = %e,
                "Postcommit notification failed, agent state may be stale"
            );
            audit_log!(AuditRecord::new(AuditCategory::ResourceModify, AUDIT_SOURCE, action)
                .with_object_id(object_id)
                .failed(e.to_string())
                .with_details(json!({"phase": "postcommit"})));
        }
    }
}

fn pending(object_type: &str, object_id: &str) {
    debug!(object_type, object_id, state = ?LifecycleState::PrecommitPending, "Running precommit");
}

/// Audits the outcome of a transaction and passes the result through.
fn audited<T>(
    category: AuditCategory,
    action: &str,
    object_type: &str,
    result: BgpvpnResult<T>,
    object_id: impl FnOnce(&T) -> String,
) -> BgpvpnResult<T> {
    let record = AuditRecord::new(category, AUDIT_SOURCE, action).with_object_type(object_type);
    match &result {
        Ok(value) => {
            audit_log!(record.with_object_id(object_id(value)));
        }
        Err(e) => {
            debug!(action, state = ?LifecycleState::Absent, error = %e, "Mutation aborted");
            audit_log!(record
                .denied(e.to_string())
                .with_details(json!({"error_kind": e.kind()})));
        }
    }
    result
}
