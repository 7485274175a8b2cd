//! Push interface to the BGP signalling agent.
//!
//! [`NotificationChannel`] calls return a [`NotifyResult`]. Callers log a
//! failed push and carry on; a push error never aborts a lifecycle mutation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::NotifyResult;
use crate::wire::{BgpvpnWire, PortBgpvpnInfo};

/// Agent-facing notifications.
pub trait NotificationChannel: Send + Sync {
    /// A BGPVPN's route targets changed, or it was bound to a network.
    fn push_update(&self, bgpvpn: &BgpvpnWire) -> NotifyResult;

    /// A BGPVPN no longer applies to a network.
    fn push_delete(&self, bgpvpn: &BgpvpnWire) -> NotifyResult;

    /// Plugs a port into the VPNs it reaches. Sent to the agent on `host`.
    fn attach_port(&self, info: &PortBgpvpnInfo, host: &str) -> NotifyResult;

    fn detach_port(&self, info: &PortBgpvpnInfo, host: &str) -> NotifyResult;
}

impl<N: NotificationChannel + ?Sized> NotificationChannel for Arc<N> {
    fn push_update(&self, bgpvpn: &BgpvpnWire) -> NotifyResult {
        (**self).push_update(bgpvpn)
    }

    fn push_delete(&self, bgpvpn: &BgpvpnWire) -> NotifyResult {
        (**self).push_delete(bgpvpn)
    }

    fn attach_port(&self, info: &PortBgpvpnInfo, host: &str) -> NotifyResult {
        (**self).attach_port(info, host)
    }

    fn detach_port(&self, info: &PortBgpvpnInfo, host: &str) -> NotifyResult {
        (**self).detach_port(info, host)
    }
}

/// One notification, as recorded or logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Notification {
    Update {
        bgpvpn: BgpvpnWire,
    },
    Delete {
        bgpvpn: BgpvpnWire,
    },
    Attach {
        port: PortBgpvpnInfo,
        host: String,
    },
    Detach {
        port: PortBgpvpnInfo,
        host: String,
    },
}

impl Notification {
    pub fn op(&self) -> &'static str {
        match self {
            Notification::Update { .. } => "push_update",
            Notification::Delete { .. } => "push_delete",
            Notification::Attach { .. } => "attach_port",
            Notification::Detach { .. } => "detach_port",
        }
    }
}

/// Channel that writes every notification as a JSON line under the
/// `agent` tracing target. Never fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingChannel;

impl LoggingChannel {
    fn emit(&self, notification: Notification) -> NotifyResult {
        let payload = serde_json::to_string(&notification).unwrap_or_default();
        info!(target: "agent", op = notification.op(), %payload, "Agent notification");
        Ok(())
    }
}

impl NotificationChannel for LoggingChannel {
    fn push_update(&self, bgpvpn: &BgpvpnWire) -> NotifyResult {
        self.emit(Notification::Update {
            bgpvpn: bgpvpn.clone(),
        })
    }

    fn push_delete(&self, bgpvpn: &BgpvpnWire) -> NotifyResult {
        self.emit(Notification::Delete {
            bgpvpn: bgpvpn.clone(),
        })
    }

    fn attach_port(&self, info: &PortBgpvpnInfo, host: &str) -> NotifyResult {
        self.emit(Notification::Attach {
            port: info.clone(),
            host: host.to_string(),
        })
    }

    fn detach_port(&self, info: &PortBgpvpnInfo, host: &str) -> NotifyResult {
        self.emit(Notification::Detach {
            port: info.clone(),
            host: host.to_string(),
        })
    }
}
