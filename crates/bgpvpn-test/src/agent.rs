//! Recording stand-in for the BGP agent.

use bgpvpn_bagpipe::{
    BgpvpnWire, Notification, NotificationChannel, NotificationError, NotifyResult, PortBgpvpnInfo,
};
use parking_lot::Mutex;

/// Records every notification it receives, in order.
///
/// Operations named with [`RecordingAgent::fail_on`] are still recorded,
/// then reported as a transport failure.
#[derive(Debug, Default)]
pub struct RecordingAgent {
    sent: Mutex<Vec<Notification>>,
    failing: Mutex<Vec<&'static str>>,
}

impl RecordingAgent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `op` (`push_update`, `attach_port`, ...) fail from now on.
    pub fn fail_on(&self, op: &'static str) {
        self.failing.lock().push(op);
    }

    /// Snapshot of the notifications received so far.
    pub fn notifications(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }

    /// Drains the notifications received so far.
    pub fn take(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.sent.lock())
    }

    /// Operation names of the notifications received so far.
    pub fn ops(&self) -> Vec<&'static str> {
        self.sent.lock().iter().map(Notification::op).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }

    fn record(&self, notification: Notification) -> NotifyResult {
        let op = notification.op();
        self.sent.lock().push(notification);
        if self.failing.lock().contains(&op) {
            return Err(NotificationError::transport(op, "agent unreachable"));
        }
        Ok(())
    }
}

impl NotificationChannel for RecordingAgent {
    fn push_update(&self, bgpvpn: &BgpvpnWire) -> NotifyResult {
        self.record(Notification::Update {
            bgpvpn: bgpvpn.clone(),
        })
    }

    fn push_delete(&self, bgpvpn: &BgpvpnWire) -> NotifyResult {
        self.record(Notification::Delete {
            bgpvpn: bgpvpn.clone(),
        })
    }

    fn attach_port(&self, info: &PortBgpvpnInfo, host: &str) -> NotifyResult {
        self.record(Notification::Attach {
            port: info.clone(),
            host: host.to_string(),
        })
    }

    fn detach_port(&self, info: &PortBgpvpnInfo, host: &str) -> NotifyResult {
        self.record(Notification::Detach {
            port: info.clone(),
            host: host.to_string(),
        })
    }
}
