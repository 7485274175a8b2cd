//! Scenario test infrastructure for the BaGPipe BGPVPN driver
//!
//! Provides:
//! - A recording agent standing in for the BGP agent on compute hosts
//! - Fixtures for ports, networks and BGPVPN requests
//! - A harness wiring the driver to an in-memory store and topology
//! - Verification helpers over the recorded notifications

mod agent;
pub mod fixtures;
mod harness;
mod verification;

pub use agent::RecordingAgent;
pub use fixtures::*;
pub use harness::BagpipeHarness;
pub use verification::*;
