//! BGP route target (extended community) values.

use crate::ParseError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

/// Matches `<administrator>:<assigned number>`, administrator being an ASN
/// or a dotted IPv4 address.
static ROUTE_TARGET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?P<asn>[0-9]{1,10})|(?P<ip>[0-9]{1,3}(?:\.[0-9]{1,3}){3})):(?P<nn>[0-9]{1,10})$")
        .expect("Invalid regex pattern")
});

/// A route target in `ASN:NN` form.
///
/// Accepted encodings follow RFC 4360 / RFC 5668:
/// - 2-byte ASN with a 4-byte assigned number (`64512:1`)
/// - 4-byte ASN with a 2-byte assigned number (`4200000000:1`)
/// - IPv4 administrator with a 2-byte assigned number (`192.0.2.1:10`)
///
/// The original textual form is preserved so that values reach the agent
/// exactly as the tenant wrote them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RouteTarget(String);

impl RouteTarget {
    /// Returns the route target as written.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RouteTarget {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseError::InvalidRouteTarget(s.to_string());
        let caps = ROUTE_TARGET_RE.captures(s).ok_or_else(invalid)?;
        let nn: u64 = caps["nn"].parse().map_err(|_| invalid())?;

        if let Some(asn) = caps.name("asn") {
            let asn: u64 = asn.as_str().parse().map_err(|_| invalid())?;
            let valid = (asn <= u16::MAX as u64 && nn <= u32::MAX as u64)
                || (asn <= u32::MAX as u64 && nn <= u16::MAX as u64);
            if !valid {
                return Err(invalid());
            }
        } else if let Some(ip) = caps.name("ip") {
            ip.as_str().parse::<Ipv4Addr>().map_err(|_| invalid())?;
            if nn > u16::MAX as u64 {
                return Err(invalid());
            }
        }

        Ok(RouteTarget(s.to_string()))
    }
}

impl TryFrom<String> for RouteTarget {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl TryFrom<&str> for RouteTarget {
    type Error = ParseError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<RouteTarget> for String {
    fn from(rt: RouteTarget) -> String {
        rt.0
    }
}
