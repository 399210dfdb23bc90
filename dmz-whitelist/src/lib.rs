use std::fmt::{self, Display};
use std::net::{AddrParseError, IpAddr};
use std::str::FromStr;

use ipnetwork::{IpNetwork, IpNetworkError};
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid address: {0}")]
    InvalidAddress(#[from] AddrParseError),

    #[error("invalid prefix length: {0}")]
    InvalidPrefix(String),

    #[error("invalid ip network: {0}")]
    InvalidNetwork(#[from] IpNetworkError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Ordered, deduplicated list of CIDR ranges as stored in a whitelist
/// annotation. Entries keep the order in which they were first seen.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AddressSet {
    entries: Vec<IpNetwork>,
}

impl AddressSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from comma separated text. Tokens that are not a valid
    /// address or CIDR range are logged and skipped.
    pub fn parse(text: &str) -> Self {
        text.split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .filter_map(|token| match parse_entry(token) {
                Ok(network) => Some(network),
                Err(e) => {
                    warn!("address {} won't be added to the whitelist: {}", token, e);
                    None
                }
            })
            .collect()
    }

    /// Entries of `self` followed by the entries of `other` not already present.
    pub fn union(&self, other: &AddressSet) -> AddressSet {
        let mut out = self.clone();
        for network in other.iter() {
            out.insert(*network);
        }
        out
    }

    /// Entries of `self` that do not appear in `other`.
    pub fn difference(&self, other: &AddressSet) -> AddressSet {
        self.iter()
            .filter(|network| !other.contains(network))
            .copied()
            .collect()
    }

    /// Comma joined canonical text, empty for an empty set.
    pub fn serialize(&self) -> String {
        self.to_string()
    }

    /// Appends `network` unless it is already present.
    pub fn insert(&mut self, network: IpNetwork) -> bool {
        if self.contains(&network) {
            return false;
        }
        self.entries.push(network);
        true
    }

    pub fn contains(&self, network: &IpNetwork) -> bool {
        self.entries.contains(network)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IpNetwork> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<IpNetwork> for AddressSet {
    fn from_iter<T: IntoIterator<Item = IpNetwork>>(iter: T) -> Self {
        let mut set = AddressSet::new();
        for network in iter {
            set.insert(network);
        }
        set
    }
}

impl Display for AddressSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, network) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{network}")?;
        }
        Ok(())
    }
}

impl FromStr for AddressSet {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(AddressSet::parse(s))
    }
}

/// Parses a single whitelist token. A bare address becomes a single host
/// range (/32 for IPv4, /128 for IPv6). Host bits are kept as written.
pub fn parse_entry(token: &str) -> Result<IpNetwork> {
    let Some((addr, prefix)) = token.split_once('/') else {
        let ip = IpAddr::from_str(token)?;
        return Ok(IpNetwork::from(ip));
    };
    let ip = IpAddr::from_str(addr)?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidPrefix(prefix.into()));
    }
    let prefix = prefix
        .parse::<u8>()
        .map_err(|_| Error::InvalidPrefix(prefix.into()))?;
    Ok(IpNetwork::new(ip, prefix)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(set: &AddressSet) -> Vec<String> {
        set.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_parse_normalizes_bare_addresses() {
        let set = AddressSet::parse("1.2.3.4,8.8.8.0/28");
        assert_eq!(entries(&set), vec!["1.2.3.4/32", "8.8.8.0/28"]);

        let set = AddressSet::parse("2001:db8::1, 2001:db8::/32");
        assert_eq!(entries(&set), vec!["2001:db8::1/128", "2001:db8::/32"]);
    }

    #[test]
    fn test_parse_empty() {
        assert!(AddressSet::parse("").is_empty());
        assert!(AddressSet::parse(" , ,").is_empty());
        assert_eq!(AddressSet::parse("").serialize(), "");
    }

    #[test]
    fn test_parse_drops_invalid_tokens() {
        let set = AddressSet::parse(
            "1.2.3.4,5.5.5,8.8.8.8,non-valid.3.4,1.1.1.1/33,2.2.2.2/+8,3.3.3.3/",
        );
        assert_eq!(entries(&set), vec!["1.2.3.4/32", "8.8.8.8/32"]);
    }

    #[test]
    fn test_parse_trims_and_dedups() {
        let set =
            AddressSet::parse(" 1.2.3.0/28 ,8.8.8.0/28,5.5.5.5, 8.8.8.0/28,1.2.3.4,5.5.5.5/32");
        assert_eq!(
            entries(&set),
            vec!["1.2.3.0/28", "8.8.8.0/28", "5.5.5.5/32", "1.2.3.4/32"]
        );
    }

    #[test]
    fn test_host_bits_are_preserved() {
        let set = AddressSet::parse("8.8.8.1/28");
        assert_eq!(set.serialize(), "8.8.8.1/28");
        assert!(!set.contains(&parse_entry("8.8.8.0/28").expect("entry")));
    }

    #[test]
    fn test_union_keeps_first_seen_order() {
        let a = AddressSet::parse("1.2.3.4,4.4.4.4");
        let b = AddressSet::parse("8.8.8.8,1.2.3.4,9.9.9.9");
        assert_eq!(
            a.union(&b).serialize(),
            "1.2.3.4/32,4.4.4.4/32,8.8.8.8/32,9.9.9.9/32"
        );
        assert_eq!(
            b.union(&a).serialize(),
            "8.8.8.8/32,1.2.3.4/32,9.9.9.9/32,4.4.4.4/32"
        );
    }

    #[test]
    fn test_difference() {
        let set = AddressSet::parse("1.2.3.4/32,4.4.4.4,8.8.8.8");
        let out = set.difference(&AddressSet::parse("4.4.4.4/32,3.3.3.3/28"));
        assert_eq!(out.serialize(), "1.2.3.4/32,8.8.8.8/32");
        assert_eq!(set.difference(&AddressSet::new()), set);
        assert!(AddressSet::new().difference(&set).is_empty());
    }

    #[test]
    fn test_serialize() {
        let set = AddressSet::parse("1.2.3.4/32,4.4.4.4,8.8.8.8");
        assert_eq!(set.serialize(), "1.2.3.4/32,4.4.4.4/32,8.8.8.8/32");
    }

    #[test]
    fn test_parse_serialize_roundtrip() {
        let inputs = [
            "1.2.3.4, bogus ,10.0.0.0/8,1.2.3.4/32,2001:db8::1",
            "",
            "192.168.1.7/24",
        ];
        for input in inputs {
            let set = AddressSet::parse(input);
            let text = set.serialize();
            assert_eq!(AddressSet::parse(&text), set);
            assert_eq!(AddressSet::parse(&text).serialize(), text);
        }
    }

    #[test]
    fn test_parse_entry_errors() {
        assert!(matches!(parse_entry("1.2.3"), Err(Error::InvalidAddress(_))));
        assert!(matches!(parse_entry("1.2.3.4/x"), Err(Error::InvalidPrefix(_))));
        assert!(matches!(parse_entry("1.2.3.4/40"), Err(Error::InvalidNetwork(_))));
        assert!(matches!(parse_entry("10/8"), Err(Error::InvalidAddress(_))));
    }
}
