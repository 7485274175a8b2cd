//! Reactions to port and router interface events.
//!
//! The orchestration layer calls [`TopologyEventReactor`] after it changed
//! a port or a router interface. Each callback recomputes what the agent
//! must learn and pushes it. Failures are logged and swallowed, with one
//! exception: [`TopologyEventReactor::router_interface_before_add`] runs
//! before the change and can veto it.

use std::sync::Arc;

use bgpvpn_types::{Bgpvpn, Port, VpnType};
use tracing::{debug, error, info, instrument};

use crate::audit::{AuditCategory, AuditRecord};
use crate::audit_log;
use crate::driver::{settle, BagpipeDriver};
use crate::error::{BgpvpnError, BgpvpnResult, EventError};
use crate::notifier::NotificationChannel;
use crate::store::{AssociationStore, AssociationTables};
use crate::topology::Topology;

pub struct TopologyEventReactor<S, T, N> {
    store: Arc<S>,
    driver: Arc<BagpipeDriver<T, N>>,
}

impl<S, T, N> Clone for TopologyEventReactor<S, T, N> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            driver: Arc::clone(&self.driver),
        }
    }
}

impl<S, T, N> TopologyEventReactor<S, T, N>
where
    S: AssociationStore,
    T: Topology,
    N: NotificationChannel,
{
    pub fn new(store: Arc<S>, driver: Arc<BagpipeDriver<T, N>>) -> Self {
        Self { store, driver }
    }

    /// A port was created.
    pub fn port_created(&self, port: &Port) {
        if let Err(e) = self.try_port_created(port) {
            error!(port_id = %port.id, error = %e, "Failed to handle port creation");
        }
    }

    /// A port changed. `original` is the port before the change.
    pub fn port_updated(&self, port: &Port, original: &Port) {
        if let Err(e) = self.try_port_updated(port, original) {
            error!(port_id = %port.id, error = %e, "Failed to handle port update");
        }
    }

    /// A port is about to be deleted. It must still be visible through the
    /// topology when this is called.
    pub fn port_deleted(&self, port_id: &str) {
        if let Err(e) = self.try_port_deleted(port_id) {
            error!(port_id, error = %e, "Failed to handle port deletion");
        }
    }

    /// Vetoes plugging `router_id` into `network_id` when it would bind the
    /// network to two different l3 BGPVPNs.
    #[instrument(skip(self))]
    pub fn router_interface_before_add(&self, router_id: &str, network_id: &str) -> BgpvpnResult<()> {
        let result = self.store.read(|tables| {
            let via_router = l3_bgpvpns(tables.find_bgpvpns_for_router(router_id));
            let via_network = l3_bgpvpns(tables.find_bgpvpns_for_network(network_id));
            for router_bgpvpn in &via_router {
                if let Some(other) = via_network.iter().find(|b| b.id != router_bgpvpn.id) {
                    return Err(BgpvpnError::conflict(format!(
                        "router {} is associated to l3 bgpvpn {} and network {} to l3 bgpvpn {}",
                        router_id, router_bgpvpn.id, network_id, other.id
                    )));
                }
            }
            Ok(())
        });

        if let Err(e) = &result {
            audit_log!(AuditRecord::new(
                AuditCategory::TopologyEvent,
                "TopologyEventReactor",
                "router_interface_add"
            )
            .with_object_id(format!("{}:{}", router_id, network_id))
            .with_object_type("router_interface")
            .denied(e.to_string()));
        }
        result
    }

    /// `router_id` was plugged into `network_id`.
    pub fn router_interface_added(&self, router_id: &str, network_id: &str) {
        if let Err(e) = self.try_router_interface_added(router_id, network_id) {
            error!(router_id, network_id, error = %e, "Failed to handle router interface addition");
        }
    }

    /// `router_id` was unplugged from `network_id`.
    pub fn router_interface_removed(&self, router_id: &str, network_id: &str) {
        if let Err(e) = self.try_router_interface_removed(router_id, network_id) {
            error!(router_id, network_id, error = %e, "Failed to handle router interface removal");
        }
    }

    fn try_port_created(&self, port: &Port) -> Result<(), EventError> {
        if !port.status.is_active() || self.driver.ignore_port(port) {
            return Ok(());
        }
        let tables = self.store.snapshot();
        self.driver.attach_port(&*tables, port)?;
        Ok(())
    }

    fn try_port_updated(&self, port: &Port, original: &Port) -> Result<(), EventError> {
        if port.status == original.status {
            debug!(port_id = %port.id, "Port status unchanged");
            return Ok(());
        }
        if self.driver.ignore_port(port) {
            return Ok(());
        }
        info!(
            port_id = %port.id,
            from = %original.status,
            to = %port.status,
            "Port status changed"
        );
        let tables = self.store.snapshot();
        self.driver.notify_port_updated(&*tables, port)?;
        Ok(())
    }

    fn try_port_deleted(&self, port_id: &str) -> Result<(), EventError> {
        let Some(port) = self.driver.topology().get_port(port_id) else {
            debug!(port_id, "Deleted port unknown to topology");
            return Ok(());
        };
        if !port.status.is_active() || self.driver.ignore_port(&port) {
            return Ok(());
        }
        let tables = self.store.snapshot();
        self.driver.detach_port(&*tables, &port)?;
        Ok(())
    }

    fn try_router_interface_added(&self, router_id: &str, network_id: &str) -> Result<(), EventError> {
        if !self.driver.topology().network_has_ports(network_id) {
            return Ok(());
        }
        let tables = self.store.snapshot();
        let mut bgpvpns = tables.find_bgpvpns_for_router(router_id);
        for bgpvpn in tables.find_bgpvpns_for_network(network_id) {
            if !bgpvpns.iter().any(|b| b.id == bgpvpn.id) {
                bgpvpns.push(bgpvpn);
            }
        }
        settle(
            bgpvpns
                .iter()
                .map(|bgpvpn| self.driver.push_update_on(bgpvpn, vec![network_id.to_string()]))
                .collect(),
        )?;
        Ok(())
    }

    fn try_router_interface_removed(&self, router_id: &str, network_id: &str) -> Result<(), EventError> {
        if !self.driver.topology().network_has_ports(network_id) {
            return Ok(());
        }
        let tables = self.store.snapshot();
        let direct = tables.find_bgpvpns_for_network(network_id);
        let mut results: Vec<_> = tables
            .find_bgpvpns_for_router(router_id)
            .iter()
            .filter(|bgpvpn| !direct.iter().any(|d| d.id == bgpvpn.id))
            .map(|bgpvpn| self.driver.push_delete_on(bgpvpn, vec![network_id.to_string()]))
            .collect();
        results.extend(
            direct
                .iter()
                .map(|bgpvpn| self.driver.push_update_on(bgpvpn, vec![network_id.to_string()])),
        );
        settle(results)?;
        Ok(())
    }
}

fn l3_bgpvpns(bgpvpns: Vec<Bgpvpn>) -> Vec<Bgpvpn> {
    bgpvpns
        .into_iter()
        .filter(|b| b.vpn_type == VpnType::L3)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DriverConfig;
    use crate::memory_store::MemoryStore;
    use crate::notifier::Notification;
    use crate::error::NotifyResult;
    use crate::topology::MemoryTopology;
    use crate::wire::{BgpvpnWire, PortBgpvpnInfo};
    use bgpvpn_types::{
        BgpvpnRequest, FixedIp, NetworkAssociationRequest, PortStatus, RouterAssociationRequest,
    };
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<Notification>>,
    }

    impl Recorder {
        fn ops(&self) -> Vec<&'static str> {
            self.sent.lock().drain(..).map(|n| n.op()).collect()
        }
    }

    impl NotificationChannel for Recorder {
        fn push_update(&self, bgpvpn: &BgpvpnWire) -> NotifyResult {
            self.sent.lock().push(Notification::Update { bgpvpn: bgpvpn.clone() });
            Ok(())
        }

        fn push_delete(&self, bgpvpn: &BgpvpnWire) -> NotifyResult {
            self.sent.lock().push(Notification::Delete { bgpvpn: bgpvpn.clone() });
            Ok(())
        }

        fn attach_port(&self, info: &PortBgpvpnInfo, host: &str) -> NotifyResult {
            self.sent.lock().push(Notification::Attach {
                port: info.clone(),
                host: host.into(),
            });
            Ok(())
        }

        fn detach_port(&self, info: &PortBgpvpnInfo, host: &str) -> NotifyResult {
            self.sent.lock().push(Notification::Detach {
                port: info.clone(),
                host: host.into(),
            });
            Ok(())
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        topology: Arc<MemoryTopology>,
        recorder: Arc<Recorder>,
        reactor: TopologyEventReactor<MemoryStore, Arc<MemoryTopology>, Arc<Recorder>>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let topology = Arc::new(MemoryTopology::new());
        let recorder = Arc::new(Recorder::default());
        let driver = Arc::new(BagpipeDriver::new(
            topology.clone(),
            recorder.clone(),
            DriverConfig::default(),
        ));
        let reactor = TopologyEventReactor::new(store.clone(), driver);
        Fixture {
            store,
            topology,
            recorder,
            reactor,
        }
    }

    fn port(id: &str, network_id: &str, status: PortStatus) -> Port {
        Port {
            id: id.into(),
            network_id: network_id.into(),
            mac_address: "fa:16:3e:00:00:01".parse().unwrap(),
            fixed_ips: vec![FixedIp {
                subnet_id: "s1".into(),
                ip_address: "10.0.0.5".parse().unwrap(),
            }],
            device_owner: "compute:nova".into(),
            status,
            host_id: "compute-1".into(),
            admin_state_up: true,
        }
    }

    fn l3(f: &Fixture, id: &str) {
        f.store
            .transaction(|tables| {
                tables.create_bgpvpn(&BgpvpnRequest {
                    id: Some(id.into()),
                    tenant_id: "t1".into(),
                    route_targets: vec!["64512:1".parse().unwrap()],
                    ..Default::default()
                })
            })
            .unwrap();
    }

    #[test]
    fn test_port_created_attaches_active_port() {
        let f = fixture();
        l3(&f, "b1");
        f.store
            .transaction(|t| t.create_net_assoc("b1", &NetworkAssociationRequest::new("n1")))
            .unwrap();

        f.reactor.port_created(&port("p0", "n1", PortStatus::Down));
        assert!(f.recorder.ops().is_empty());

        f.reactor.port_created(&port("p1", "n1", PortStatus::Active));
        assert_eq!(f.recorder.ops(), vec!["attach_port"]);
    }

    #[test]
    fn test_port_updated_follows_status() {
        let f = fixture();
        l3(&f, "b1");
        f.store
            .transaction(|t| t.create_net_assoc("b1", &NetworkAssociationRequest::new("n1")))
            .unwrap();
        let down = port("p1", "n1", PortStatus::Down);
        let active = port("p1", "n1", PortStatus::Active);

        f.reactor.port_updated(&down, &down);
        assert!(f.recorder.ops().is_empty());

        f.reactor.port_updated(&active, &down);
        assert_eq!(f.recorder.ops(), vec!["attach_port"]);

        f.reactor.port_updated(&down, &active);
        assert_eq!(f.recorder.ops(), vec!["detach_port"]);

        let build = port("p1", "n1", PortStatus::Build);
        f.reactor.port_updated(&build, &down);
        assert!(f.recorder.ops().is_empty());
    }

    #[test]
    fn test_port_deleted_detaches() {
        let f = fixture();
        l3(&f, "b1");
        f.store
            .transaction(|t| t.create_net_assoc("b1", &NetworkAssociationRequest::new("n1")))
            .unwrap();
        f.topology.upsert_port(port("p1", "n1", PortStatus::Active));

        f.reactor.port_deleted("p1");
        assert_eq!(f.recorder.ops(), vec!["detach_port"]);

        f.reactor.port_deleted("unknown");
        assert!(f.recorder.ops().is_empty());
    }

    #[test]
    fn test_router_interface_ambiguity_vetoed() {
        let f = fixture();
        l3(&f, "b1");
        l3(&f, "b2");
        f.store
            .transaction(|t| {
                t.create_router_assoc("b1", &RouterAssociationRequest::new("r1"))?;
                t.create_net_assoc("b2", &NetworkAssociationRequest::new("n1"))
            })
            .unwrap();

        let err = f.reactor.router_interface_before_add("r1", "n1").unwrap_err();
        assert!(matches!(err, BgpvpnError::Conflict { .. }));
        assert!(f.reactor.router_interface_before_add("r1", "n2").is_ok());
    }

    #[test]
    fn test_router_interface_same_bgpvpn_allowed() {
        let f = fixture();
        l3(&f, "b1");
        f.store
            .transaction(|t| {
                t.create_router_assoc("b1", &RouterAssociationRequest::new("r1"))?;
                t.create_net_assoc("b1", &NetworkAssociationRequest::new("n1"))
            })
            .unwrap();
        assert!(f.reactor.router_interface_before_add("r1", "n1").is_ok());
    }

    #[test]
    fn test_router_interface_added_and_removed() {
        let f = fixture();
        l3(&f, "b1");
        f.store
            .transaction(|t| t.create_router_assoc("b1", &RouterAssociationRequest::new("r1")))
            .unwrap();

        f.reactor.router_interface_added("r1", "n1");
        assert!(f.recorder.ops().is_empty(), "no ports on n1 yet");

        f.topology.upsert_port(port("p1", "n1", PortStatus::Active));
        f.topology.add_router_interface("r1", "n1");
        f.reactor.router_interface_added("r1", "n1");
        assert_eq!(f.recorder.ops(), vec!["push_update"]);

        f.topology.remove_router_interface("r1", "n1");
        f.reactor.router_interface_removed("r1", "n1");
        assert_eq!(f.recorder.ops(), vec!["push_delete"]);
    }

    #[test]
    fn test_router_interface_removed_keeps_direct_association() {
        let f = fixture();
        l3(&f, "b1");
        f.store
            .transaction(|t| {
                t.create_router_assoc("b1", &RouterAssociationRequest::new("r1"))?;
                t.create_net_assoc("b1", &NetworkAssociationRequest::new("n1"))
            })
            .unwrap();
        f.topology.upsert_port(port("p1", "n1", PortStatus::Active));

        f.reactor.router_interface_removed("r1", "n1");
        assert_eq!(f.recorder.ops(), vec!["push_update"]);
    }
}
