//! Command stream consumed by `bgpvpnd`.
//!
//! Each line of input is one JSON [`Command`], tagged by `command`:
//!
//! ```text
//! {"command":"create_bgpvpn","bgpvpn":{"id":"b1","tenant_id":"t1","route_targets":["64512:1"]}}
//! {"command":"create_port","port":{"id":"p1","network_id":"n1","mac_address":"fa:16:3e:00:00:01","status":"ACTIVE"}}
//! {"command":"create_net_assoc","bgpvpn_id":"b1","association":{"network_id":"n1"}}
//! ```
//!
//! API commands go through the [`AssociationLifecycle`]; topology commands
//! update the in-memory topology and notify the [`TopologyEventReactor`].

use std::sync::Arc;

use bgpvpn_types::{
    BgpvpnId, BgpvpnRequest, BgpvpnUpdate, Network, NetworkAssociationRequest, NetworkId, Port,
    PortAssociationRequest, PortAssociationUpdate, PortId, PortStatus, RouterAssociationRequest,
    RouterAssociationUpdate, RouterId, Subnet,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::driver::BagpipeDriver;
use crate::error::{BgpvpnError, BgpvpnResult};
use crate::lifecycle::AssociationLifecycle;
use crate::memory_store::MemoryStore;
use crate::notifier::NotificationChannel;
use crate::reactor::TopologyEventReactor;
use crate::topology::MemoryTopology;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    CreateBgpvpn {
        bgpvpn: BgpvpnRequest,
    },
    UpdateBgpvpn {
        id: BgpvpnId,
        changes: BgpvpnUpdate,
    },
    DeleteBgpvpn {
        id: BgpvpnId,
    },
    ShowBgpvpn {
        id: BgpvpnId,
    },
    ListBgpvpns,

    CreateNetAssoc {
        bgpvpn_id: BgpvpnId,
        association: NetworkAssociationRequest,
    },
    DeleteNetAssoc {
        bgpvpn_id: BgpvpnId,
        id: String,
    },

    CreateRouterAssoc {
        bgpvpn_id: BgpvpnId,
        association: RouterAssociationRequest,
    },
    UpdateRouterAssoc {
        bgpvpn_id: BgpvpnId,
        id: String,
        changes: RouterAssociationUpdate,
    },
    DeleteRouterAssoc {
        bgpvpn_id: BgpvpnId,
        id: String,
    },

    CreatePortAssoc {
        bgpvpn_id: BgpvpnId,
        association: PortAssociationRequest,
    },
    UpdatePortAssoc {
        bgpvpn_id: BgpvpnId,
        id: String,
        changes: PortAssociationUpdate,
    },
    DeletePortAssoc {
        bgpvpn_id: BgpvpnId,
        id: String,
    },

    AddNetwork {
        network: Network,
    },
    AddSubnet {
        subnet: Subnet,
    },
    CreatePort {
        port: Port,
    },
    /// Replaces a port; treated as creation if the port is unknown.
    UpdatePort {
        port: Port,
    },
    SetPortStatus {
        port_id: PortId,
        status: PortStatus,
    },
    DeletePort {
        port_id: PortId,
    },
    AddRouterInterface {
        router_id: RouterId,
        network_id: NetworkId,
    },
    RemoveRouterInterface {
        router_id: RouterId,
        network_id: NetworkId,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::CreateBgpvpn { .. } => "create_bgpvpn",
            Command::UpdateBgpvpn { .. } => "update_bgpvpn",
            Command::DeleteBgpvpn { .. } => "delete_bgpvpn",
            Command::ShowBgpvpn { .. } => "show_bgpvpn",
            Command::ListBgpvpns => "list_bgpvpns",
            Command::CreateNetAssoc { .. } => "create_net_assoc",
            Command::DeleteNetAssoc { .. } => "delete_net_assoc",
            Command::CreateRouterAssoc { .. } => "create_router_assoc",
            Command::UpdateRouterAssoc { .. } => "update_router_assoc",
            Command::DeleteRouterAssoc { .. } => "delete_router_assoc",
            Command::CreatePortAssoc { .. } => "create_port_assoc",
            Command::UpdatePortAssoc { .. } => "update_port_assoc",
            Command::DeletePortAssoc { .. } => "delete_port_assoc",
            Command::AddNetwork { .. } => "add_network",
            Command::AddSubnet { .. } => "add_subnet",
            Command::CreatePort { .. } => "create_port",
            Command::UpdatePort { .. } => "update_port",
            Command::SetPortStatus { .. } => "set_port_status",
            Command::DeletePort { .. } => "delete_port",
            Command::AddRouterInterface { .. } => "add_router_interface",
            Command::RemoveRouterInterface { .. } => "remove_router_interface",
        }
    }
}

/// Driver type wired by [`CommandProcessor`].
pub type MemoryDriver<N> = BagpipeDriver<Arc<MemoryTopology>, N>;

/// Applies commands against an in-memory store and topology.
pub struct CommandProcessor<N> {
    lifecycle: AssociationLifecycle<MemoryStore, MemoryDriver<N>>,
    reactor: TopologyEventReactor<MemoryStore, Arc<MemoryTopology>, N>,
    topology: Arc<MemoryTopology>,
}

/// Counters returned by [`CommandProcessor::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub applied: usize,
    pub rejected: usize,
    pub malformed: usize,
}

impl<N: NotificationChannel> CommandProcessor<N> {
    pub fn new(channel: N, config: DriverConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let topology = Arc::new(MemoryTopology::new());
        let driver = Arc::new(BagpipeDriver::new(topology.clone(), channel, config));
        Self {
            lifecycle: AssociationLifecycle::new(store.clone(), driver.clone()),
            reactor: TopologyEventReactor::new(store, driver),
            topology,
        }
    }

    pub fn lifecycle(&self) -> &AssociationLifecycle<MemoryStore, MemoryDriver<N>> {
        &self.lifecycle
    }

    pub fn reactor(&self) -> &TopologyEventReactor<MemoryStore, Arc<MemoryTopology>, N> {
        &self.reactor
    }

    pub fn topology(&self) -> &Arc<MemoryTopology> {
        &self.topology
    }

    /// Applies one command. Returns the resulting object, if the command
    /// produces one.
    pub fn apply(&self, command: Command) -> BgpvpnResult<Option<Value>> {
        let lifecycle = &self.lifecycle;
        match command {
            Command::CreateBgpvpn { bgpvpn } => to_value(lifecycle.create_bgpvpn(&bgpvpn)?),
            Command::UpdateBgpvpn { id, changes } => to_value(lifecycle.update_bgpvpn(&id, &changes)?),
            Command::DeleteBgpvpn { id } => lifecycle.delete_bgpvpn(&id).map(|()| None),
            Command::ShowBgpvpn { id } => to_value(lifecycle.get_bgpvpn(&id)?),
            Command::ListBgpvpns => to_value(lifecycle.list_bgpvpns()),

            Command::CreateNetAssoc {
                bgpvpn_id,
                association,
            } => to_value(lifecycle.create_net_assoc(&bgpvpn_id, &association)?),
            Command::DeleteNetAssoc { bgpvpn_id, id } => {
                lifecycle.delete_net_assoc(&bgpvpn_id, &id).map(|()| None)
            }

            Command::CreateRouterAssoc {
                bgpvpn_id,
                association,
            } => to_value(lifecycle.create_router_assoc(&bgpvpn_id, &association)?),
            Command::UpdateRouterAssoc {
                bgpvpn_id,
                id,
                changes,
            } => to_value(lifecycle.update_router_assoc(&bgpvpn_id, &id, &changes)?),
            Command::DeleteRouterAssoc { bgpvpn_id, id } => {
                lifecycle.delete_router_assoc(&bgpvpn_id, &id).map(|()| None)
            }

            Command::CreatePortAssoc {
                bgpvpn_id,
                association,
            } => to_value(lifecycle.create_port_assoc(&bgpvpn_id, &association)?),
            Command::UpdatePortAssoc {
                bgpvpn_id,
                id,
                changes,
            } => to_value(lifecycle.update_port_assoc(&bgpvpn_id, &id, &changes)?),
            Command::DeletePortAssoc { bgpvpn_id, id } => {
                lifecycle.delete_port_assoc(&bgpvpn_id, &id).map(|()| None)
            }

            Command::AddNetwork { network } => {
                self.topology.add_network(network);
                Ok(None)
            }
            Command::AddSubnet { subnet } => {
                self.topology.add_subnet(subnet);
                Ok(None)
            }
            Command::CreatePort { port } | Command::UpdatePort { port } => {
                match self.topology.upsert_port(port.clone()) {
                    Some(original) => self.reactor.port_updated(&port, &original),
                    None => self.reactor.port_created(&port),
                }
                Ok(None)
            }
            Command::SetPortStatus { port_id, status } => {
                let (updated, original) = self
                    .topology
                    .set_port_status(&port_id, status)
                    .ok_or_else(|| BgpvpnError::not_found("port", port_id.clone()))?;
                self.reactor.port_updated(&updated, &original);
                Ok(None)
            }
            Command::DeletePort { port_id } => {
                self.reactor.port_deleted(&port_id);
                self.topology
                    .remove_port(&port_id)
                    .ok_or_else(|| BgpvpnError::not_found("port", port_id))?;
                Ok(None)
            }
            Command::AddRouterInterface {
                router_id,
                network_id,
            } => {
                self.reactor
                    .router_interface_before_add(&router_id, &network_id)?;
                if self.topology.add_router_interface(&router_id, &network_id) {
                    self.reactor.router_interface_added(&router_id, &network_id);
                } else {
                    debug!(%router_id, %network_id, "Router interface already present");
                }
                Ok(None)
            }
            Command::RemoveRouterInterface {
                router_id,
                network_id,
            } => {
                if !self.topology.remove_router_interface(&router_id, &network_id) {
                    return Err(BgpvpnError::not_found(
                        "router interface",
                        format!("{}:{}", router_id, network_id),
                    ));
                }
                self.reactor.router_interface_removed(&router_id, &network_id);
                Ok(None)
            }
        }
    }

    /// Parses and applies one input line. Blank lines and `#` comments are
    /// skipped.
    pub fn apply_line(&self, line: &str, summary: &mut RunSummary) {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return;
        }

        let command: Command = match serde_json::from_str(line) {
            Ok(command) => command,
            Err(e) => {
                warn!(error = %e, "Malformed command, skipping");
                summary.malformed += 1;
                return;
            }
        };

        let name = command.name();
        match self.apply(command) {
            Ok(Some(output)) => {
                info!(command = name, %output, "Command applied");
                summary.applied += 1;
            }
            Ok(None) => {
                info!(command = name, "Command applied");
                summary.applied += 1;
            }
            Err(e) => {
                warn!(command = name, error = %e, kind = e.kind(), "Command rejected");
                summary.rejected += 1;
            }
        }
    }

    /// Applies every line of `reader` until end of input.
    pub async fn run<R>(&self, reader: R) -> std::io::Result<RunSummary>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut summary = RunSummary::default();
        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            self.apply_line(&line, &mut summary);
        }
        Ok(summary)
    }
}

fn to_value<T: Serialize>(value: T) -> BgpvpnResult<Option<Value>> {
    Ok(serde_json::to_value(value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::LoggingChannel;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn processor() -> CommandProcessor<LoggingChannel> {
        CommandProcessor::new(LoggingChannel, DriverConfig::default())
    }

    #[test]
    fn test_command_tagging() {
        let command: Command = serde_json::from_value(json!({
            "command": "create_net_assoc",
            "bgpvpn_id": "b1",
            "association": {"network_id": "n1"}
        }))
        .unwrap();
        assert_eq!(
            command,
            Command::CreateNetAssoc {
                bgpvpn_id: "b1".into(),
                association: NetworkAssociationRequest::new("n1"),
            }
        );
        assert_eq!(command.name(), "create_net_assoc");

        let list: Command = serde_json::from_str(r#"{"command":"list_bgpvpns"}"#).unwrap();
        assert_eq!(list, Command::ListBgpvpns);
    }

    #[test]
    fn test_apply_create_and_show() {
        let p = processor();
        let created = p
            .apply(Command::CreateBgpvpn {
                bgpvpn: BgpvpnRequest {
                    id: Some("b1".into()),
                    tenant_id: "t1".into(),
                    ..Default::default()
                },
            })
            .unwrap()
            .unwrap();
        assert_eq!(created["id"], "b1");

        let shown = p.apply(Command::ShowBgpvpn { id: "b1".into() }).unwrap().unwrap();
        assert_eq!(shown["tenant_id"], "t1");

        let err = p.apply(Command::DeleteBgpvpn { id: "nope".into() }).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_set_status_of_unknown_port() {
        let p = processor();
        let err = p
            .apply(Command::SetPortStatus {
                port_id: "p1".into(),
                status: PortStatus::Active,
            })
            .unwrap_err();
        assert_eq!(err, BgpvpnError::not_found("port", "p1"));
    }

    #[test]
    fn test_remove_unknown_router_interface() {
        let p = processor();
        let err = p
            .apply(Command::RemoveRouterInterface {
                router_id: "r1".into(),
                network_id: "n1".into(),
            })
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_run_counts_lines() {
        let input = r#"
# comment
{"command":"create_bgpvpn","bgpvpn":{"id":"b1","tenant_id":"t1","route_targets":["64512:1"]}}
{"command":"create_net_assoc","bgpvpn_id":"b1","association":{"network_id":"n1"}}
{"command":"create_net_assoc","bgpvpn_id":"b1","association":{"network_id":"n1"}}
not json
"#;
        let p = processor();
        let summary = p.run(input.as_bytes()).await.unwrap();
        assert_eq!(
            summary,
            RunSummary {
                applied: 2,
                rejected: 1,
                malformed: 1,
            }
        );
        assert_eq!(p.lifecycle().get_bgpvpn("b1").unwrap().networks, vec!["n1".to_string()]);
    }
}
