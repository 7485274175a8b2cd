//! Route target projection.
//!
//! Maps the route-target configuration of a set of BGPVPNs onto the shape
//! the BGP agent consumes: import/export lists keyed by `<type>vpn`.
//!
//! ```text
//! [{type: l3, route_targets: [A], import_targets: [B], export_targets: [C]},
//!  {type: l3, route_targets: [D]}]
//!   =>
//! {l3vpn: {import_rt: [A, B, D], export_rt: [A, C, D]}}
//! ```
//!
//! Entries are concatenated in input order and never deduplicated: the
//! agent protocol is sensitive to the exact lists it receives.

use std::collections::BTreeMap;

use bgpvpn_types::{Bgpvpn, VpnType};
use serde::{Deserialize, Serialize};

/// VPN types the agent currently consumes. `l2vpn` entries are dropped.
pub const EMITTED_VPN_TYPES: &[VpnType] = &[VpnType::L3];

/// Import and export route targets of one VPN type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTargetLists {
    pub import_rt: Vec<String>,
    pub export_rt: Vec<String>,
}

impl RouteTargetLists {
    /// Returns true if neither list carries a route target.
    pub fn is_empty(&self) -> bool {
        self.import_rt.is_empty() && self.export_rt.is_empty()
    }
}

/// Route targets keyed by VPN type wire key (`l3vpn`).
pub type VpnRouteTargets = BTreeMap<String, RouteTargetLists>;

/// Projects `bgpvpns` onto agent route-target lists, keeping only `l3vpn`.
pub fn project<'a, I>(bgpvpns: I) -> VpnRouteTargets
where
    I: IntoIterator<Item = &'a Bgpvpn>,
{
    project_for(EMITTED_VPN_TYPES, bgpvpns)
}

/// Projects `bgpvpns`, keeping only the VPN types listed in `emitted`.
pub fn project_for<'a, I>(emitted: &[VpnType], bgpvpns: I) -> VpnRouteTargets
where
    I: IntoIterator<Item = &'a Bgpvpn>,
{
    let mut by_type: BTreeMap<VpnType, RouteTargetLists> = BTreeMap::new();

    for bgpvpn in bgpvpns {
        let lists = by_type.entry(bgpvpn.vpn_type).or_default();

        for rt in &bgpvpn.route_targets {
            lists.import_rt.push(rt.to_string());
            lists.export_rt.push(rt.to_string());
        }
        lists
            .import_rt
            .extend(bgpvpn.import_targets.iter().map(ToString::to_string));
        lists
            .export_rt
            .extend(bgpvpn.export_targets.iter().map(ToString::to_string));
    }

    by_type
        .into_iter()
        .filter(|(vpn_type, _)| emitted.contains(vpn_type))
        .map(|(vpn_type, lists)| (vpn_type.wire_key().to_string(), lists))
        .collect()
}
