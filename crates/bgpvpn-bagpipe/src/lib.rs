//! BaGPipe BGPVPN driver.
//!
//! Tracks BGPVPNs and their network, router and port associations, and tells
//! the BGP agent on each compute host which VPNs its ports must join.
//!
//! The pieces, bottom-up:
//!
//! - [`projector`]: folds BGPVPN route targets into per-type import/export lists
//! - [`diff`]: field-level difference of two resource snapshots
//! - [`store`] / [`memory_store`]: transactional association tables
//! - [`lifecycle`]: precommit/postcommit orchestration of every mutation
//! - [`driver`]: the BaGPipe hooks; validation and notification decisions
//! - [`reactor`]: reactions to port and router interface events
//! - [`notifier`]: the push interface to the agent
//! - [`command`]: the JSON command stream driven by `bgpvpnd`

pub mod audit;
pub mod command;
pub mod config;
pub mod diff;
pub mod driver;
pub mod error;
pub mod lifecycle;
pub mod memory_store;
pub mod notifier;
pub mod projector;
pub mod reactor;
pub mod store;
pub mod topology;
pub mod wire;

pub use audit::{init_logging, AuditCategory, AuditOutcome, AuditRecord};
pub use command::{Command, CommandProcessor, RunSummary};
pub use config::{BagpipeConfig, DriverConfig, LogFormat, LoggingConfig, DEFAULT_CONFIG_PATH};
pub use diff::{diff, diff_resources, Difference};
pub use driver::BagpipeDriver;
pub use error::{
    BgpvpnError, BgpvpnResult, ConfigError, EventError, NotificationError, NotifyResult,
};
pub use lifecycle::{AssociationLifecycle, LifecycleHooks, NullHooks};
pub use memory_store::{MemoryStore, MemoryTables};
pub use notifier::{LoggingChannel, Notification, NotificationChannel};
pub use projector::{project, RouteTargetLists, VpnRouteTargets};
pub use reactor::TopologyEventReactor;
pub use store::{AssociationStore, AssociationTables};
pub use topology::{MemoryTopology, Topology};
pub use wire::{BgpvpnWire, PortBgpvpnInfo, Readvertise, StaticRoute};
