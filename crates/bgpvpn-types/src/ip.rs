//! IP prefix type used by prefix routes of port associations.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// An IP prefix in CIDR notation (e.g., 10.0.0.0/24 or 2001:db8::/32).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct IpPrefix {
    address: IpAddr,
    prefix_len: u8,
}

impl IpPrefix {
    /// Creates a new IP prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix length is invalid for the address type
    /// (>32 for IPv4, >128 for IPv6).
    pub fn new(address: IpAddr, prefix_len: u8) -> Result<Self, ParseError> {
        let max_len = match address {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };

        if prefix_len > max_len {
            return Err(ParseError::InvalidIpPrefix(format!(
                "prefix length {} exceeds maximum {} for address type",
                prefix_len, max_len
            )));
        }

        Ok(IpPrefix {
            address,
            prefix_len,
        })
    }

    /// Returns the network address of this prefix.
    pub const fn address(&self) -> &IpAddr {
        &self.address
    }

    /// Returns the prefix length in bits.
    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// Returns true if this is an IPv4 prefix.
    pub const fn is_ipv4(&self) -> bool {
        self.address.is_ipv4()
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for IpPrefix {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr_str, len_str) = s
            .rsplit_once('/')
            .ok_or_else(|| ParseError::InvalidIpPrefix(s.to_string()))?;

        let address: IpAddr = addr_str
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;
        let prefix_len: u8 = len_str
            .parse()
            .map_err(|_| ParseError::InvalidIpPrefix(s.to_string()))?;

        IpPrefix::new(address, prefix_len)
    }
}

impl TryFrom<String> for IpPrefix {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<IpPrefix> for String {
    fn from(prefix: IpPrefix) -> String {
        prefix.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ip_prefix_parse() {
        let prefix: IpPrefix = "10.0.0.0/24".parse().unwrap();
        assert!(prefix.is_ipv4());
        assert_eq!(prefix.prefix_len(), 24);

        let v6_prefix: IpPrefix = "2001:db8::/32".parse().unwrap();
        assert!(!v6_prefix.is_ipv4());
        assert_eq!(v6_prefix.prefix_len(), 32);
    }

    #[test]
    fn test_invalid_prefix() {
        assert!("10.0.0.0/33".parse::<IpPrefix>().is_err());
        assert!("2001:db8::/129".parse::<IpPrefix>().is_err());
        assert!("10.0.0.0".parse::<IpPrefix>().is_err());
        assert!("not-an-ip/8".parse::<IpPrefix>().is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let prefix: IpPrefix = "192.168.0.0/16".parse().unwrap();
        let json = serde_json::to_string(&prefix).unwrap();
        assert_eq!(json, "\"192.168.0.0/16\"");
        assert!(serde_json::from_str::<IpPrefix>("\"192.168.0.0/40\"").is_err());
    }
}
