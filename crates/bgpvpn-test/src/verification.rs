//! Verification helpers over the notifications recorded by a
//! [`RecordingAgent`]

use bgpvpn_bagpipe::{BgpvpnWire, Notification, PortBgpvpnInfo};
use thiserror::Error;

use crate::agent::RecordingAgent;

/// Verification error types
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("Expected notifications {expected:?}, got {actual:?}")]
    OpsMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("No {op} for bgpvpn '{bgpvpn_id}' on network '{network_id}'")]
    PushNotFound {
        op: &'static str,
        bgpvpn_id: String,
        network_id: String,
    },

    #[error("No {op} for port '{port_id}'")]
    PortNotFound { op: &'static str, port_id: String },
}

/// Result type for verification operations
pub type VerifyResult<T> = Result<T, VerificationError>;

pub struct NotificationVerifier<'a> {
    agent: &'a RecordingAgent,
}

impl<'a> NotificationVerifier<'a> {
    pub fn new(agent: &'a RecordingAgent) -> Self {
        Self { agent }
    }

    /// Verifies the exact sequence of operations received.
    pub fn assert_ops(&self, expected: &[&str]) -> VerifyResult<()> {
        let actual = self.agent.ops();
        if actual != expected {
            return Err(VerificationError::OpsMismatch {
                expected: expected.iter().map(|s| s.to_string()).collect(),
                actual: actual.iter().map(|s| s.to_string()).collect(),
            });
        }
        Ok(())
    }

    pub fn assert_silent(&self) -> VerifyResult<()> {
        self.assert_ops(&[])
    }

    pub fn push_update(&self, bgpvpn_id: &str, network_id: &str) -> VerifyResult<BgpvpnWire> {
        self.find_push("push_update", bgpvpn_id, network_id)
    }

    pub fn push_delete(&self, bgpvpn_id: &str, network_id: &str) -> VerifyResult<BgpvpnWire> {
        self.find_push("push_delete", bgpvpn_id, network_id)
    }

    /// The last attach payload of `port_id`, with the host it was sent to.
    pub fn attach(&self, port_id: &str) -> VerifyResult<(PortBgpvpnInfo, String)> {
        self.agent
            .notifications()
            .into_iter()
            .rev()
            .find_map(|n| match n {
                Notification::Attach { port, host } if port.id == port_id => Some((port, host)),
                _ => None,
            })
            .ok_or_else(|| VerificationError::PortNotFound {
                op: "attach_port",
                port_id: port_id.to_string(),
            })
    }

    pub fn detach(&self, port_id: &str) -> VerifyResult<(PortBgpvpnInfo, String)> {
        self.agent
            .notifications()
            .into_iter()
            .rev()
            .find_map(|n| match n {
                Notification::Detach { port, host } if port.id == port_id => Some((port, host)),
                _ => None,
            })
            .ok_or_else(|| VerificationError::PortNotFound {
                op: "detach_port",
                port_id: port_id.to_string(),
            })
    }

    fn find_push(&self, op: &'static str, bgpvpn_id: &str, network_id: &str) -> VerifyResult<BgpvpnWire> {
        self.agent
            .notifications()
            .into_iter()
            .filter(|n| n.op() == op)
            .find_map(|n| match n {
                Notification::Update { bgpvpn } | Notification::Delete { bgpvpn }
                    if bgpvpn.id == bgpvpn_id && bgpvpn.network_id == network_id =>
                {
                    Some(bgpvpn)
                }
                _ => None,
            })
            .ok_or_else(|| VerificationError::PushNotFound {
                op,
                bgpvpn_id: bgpvpn_id.to_string(),
                network_id: network_id.to_string(),
            })
    }
}
