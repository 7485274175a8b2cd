//! Driver harness: store, topology, lifecycle and reactor wired to a
//! [`RecordingAgent`].

use std::sync::Arc;

use bgpvpn_bagpipe::command::MemoryDriver;
use bgpvpn_bagpipe::{
    AssociationLifecycle, BgpvpnResult, Command, CommandProcessor, DriverConfig, MemoryStore,
    MemoryTopology, RunSummary,
};
use bgpvpn_types::{Bgpvpn, BgpvpnRequest, Network, Port, PortStatus};
use serde_json::Value;

use crate::agent::RecordingAgent;
use crate::fixtures::network_fixtures;

pub struct BagpipeHarness {
    agent: Arc<RecordingAgent>,
    processor: CommandProcessor<Arc<RecordingAgent>>,
}

impl Default for BagpipeHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl BagpipeHarness {
    pub fn new() -> Self {
        Self::with_config(DriverConfig::default())
    }

    pub fn with_config(config: DriverConfig) -> Self {
        let agent = Arc::new(RecordingAgent::new());
        let processor = CommandProcessor::new(agent.clone(), config);
        Self { agent, processor }
    }

    pub fn agent(&self) -> &RecordingAgent {
        &self.agent
    }

    pub fn lifecycle(&self) -> &AssociationLifecycle<MemoryStore, MemoryDriver<Arc<RecordingAgent>>> {
        self.processor.lifecycle()
    }

    pub fn topology(&self) -> &MemoryTopology {
        self.processor.topology()
    }

    pub fn apply(&self, command: Command) -> BgpvpnResult<Option<Value>> {
        self.processor.apply(command)
    }

    /// Adds a tenant network with its `10.0.0.0/24` subnet.
    pub fn add_network(&self, network: Network) {
        let subnet = network_fixtures::subnet(&network.id);
        self.topology().add_network(network);
        self.topology().add_subnet(subnet);
    }

    pub fn create_bgpvpn(&self, request: BgpvpnRequest) -> BgpvpnResult<Bgpvpn> {
        self.lifecycle().create_bgpvpn(&request)
    }

    /// Plugs a port through the command path, so the reactor sees it.
    pub fn plug_port(&self, port: Port) {
        self.apply(Command::CreatePort { port })
            .unwrap_or_else(|e| panic!("create_port failed: {}", e));
    }

    pub fn set_port_status(&self, port_id: &str, status: PortStatus) -> BgpvpnResult<()> {
        self.apply(Command::SetPortStatus {
            port_id: port_id.to_string(),
            status,
        })
        .map(|_| ())
    }

    pub fn add_router_interface(&self, router_id: &str, network_id: &str) -> BgpvpnResult<()> {
        self.apply(Command::AddRouterInterface {
            router_id: router_id.to_string(),
            network_id: network_id.to_string(),
        })
        .map(|_| ())
    }

    pub fn remove_router_interface(&self, router_id: &str, network_id: &str) -> BgpvpnResult<()> {
        self.apply(Command::RemoveRouterInterface {
            router_id: router_id.to_string(),
            network_id: network_id.to_string(),
        })
        .map(|_| ())
    }

    /// Feeds a JSON-lines command script through the daemon input path.
    pub async fn run_script(&self, script: &str) -> std::io::Result<RunSummary> {
        self.processor.run(script.as_bytes()).await
    }
}
