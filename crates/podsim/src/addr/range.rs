use core::{fmt, str::FromStr};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use crate::{Error, Result};

/// A contiguous block of addresses written as `base/prefix_len`.
///
/// Unlike a strict network prefix, the base keeps whatever host bits it was
/// written with: `10.0.0.1/24` contains `10.0.0.0` through `10.0.0.255` but
/// [`AddrRange::nth`] starts counting at `10.0.0.1`. Containment always uses
/// the masked network.
///
/// # Example
/// ```
/// use podsim::AddrRange;
///
/// let range: AddrRange = "10.0.0.1/24".parse().unwrap();
/// assert_eq!(range.nth(0), Some("10.0.0.1".parse().unwrap()));
/// assert_eq!(range.nth(254), Some("10.0.0.255".parse().unwrap()));
/// assert_eq!(range.nth(255), None);
/// assert!(range.contains("10.0.0.0".parse().unwrap()));
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AddrRange {
    base: IpAddr,
    prefix_len: u8,
}

impl AddrRange {
    /// Creates a range from a base address and prefix length.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRange`] if `prefix_len` is longer than the
    /// address family allows (32 for IPv4, 128 for IPv6).
    pub fn new(base: IpAddr, prefix_len: u8) -> Result<Self> {
        let max = max_prefix_len(base);
        if prefix_len > max {
            return Err(Error::InvalidRange {
                input: format!("{base}/{prefix_len}"),
                reason: format!("prefix length must be at most {max}"),
            });
        }
        Ok(Self { base, prefix_len })
    }

    /// The address the range was written with.
    pub const fn base(&self) -> IpAddr {
        self.base
    }

    pub const fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    /// The base with its host bits cleared.
    pub fn network(&self) -> IpAddr {
        match self.base {
            IpAddr::V4(base) => {
                IpAddr::V4(Ipv4Addr::from(u32::from(base) & mask_v4(self.prefix_len)))
            }
            IpAddr::V6(base) => {
                IpAddr::V6(Ipv6Addr::from(u128::from(base) & mask_v6(self.prefix_len)))
            }
        }
    }

    /// Reports whether `addr` falls inside the masked network.
    ///
    /// IPv4-mapped IPv6 addresses are compared as IPv4. Addresses of the
    /// other family are never contained.
    pub fn contains(&self, addr: IpAddr) -> bool {
        match (self.base, self.canonicalize(addr)) {
            (IpAddr::V4(base), IpAddr::V4(addr)) => {
                let mask = mask_v4(self.prefix_len);
                u32::from(base) & mask == u32::from(addr) & mask
            }
            (IpAddr::V6(base), IpAddr::V6(addr)) => {
                let mask = mask_v6(self.prefix_len);
                u128::from(base) & mask == u128::from(addr) & mask
            }
            _ => false,
        }
    }

    /// Lowers IPv4-mapped IPv6 addresses to IPv4 when the range is IPv4.
    pub(crate) fn canonicalize(&self, addr: IpAddr) -> IpAddr {
        match self.base {
            IpAddr::V4(_) => addr.to_canonical(),
            IpAddr::V6(_) => addr,
        }
    }

    /// Returns the address `offset` past the base, or `None` once that
    /// address leaves the range.
    pub fn nth(&self, offset: u64) -> Option<IpAddr> {
        let addr = add_to_low_bits(self.base, offset);
        self.contains(addr).then_some(addr)
    }
}

/// Adds `offset` to the low 64 bits of `addr`, wrapping on overflow.
///
/// IPv4 addresses are lifted to their IPv4-mapped IPv6 form for the addition
/// so both families share one code path, and lowered back when the result is
/// still mapped.
pub(crate) fn add_to_low_bits(addr: IpAddr, offset: u64) -> IpAddr {
    let mut octets = match addr {
        IpAddr::V4(addr) => addr.to_ipv6_mapped().octets(),
        IpAddr::V6(addr) => addr.octets(),
    };

    let mut low = [0_u8; 8];
    low.copy_from_slice(&octets[8..]);
    let low = u64::from_be_bytes(low).wrapping_add(offset);
    octets[8..].copy_from_slice(&low.to_be_bytes());

    let out = Ipv6Addr::from(octets);
    match addr {
        IpAddr::V4(_) => IpAddr::V6(out).to_canonical(),
        IpAddr::V6(_) => IpAddr::V6(out),
    }
}

const fn max_prefix_len(addr: IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn mask_v4(prefix_len: u8) -> u32 {
    u32::MAX
        .checked_shl(32 - u32::from(prefix_len))
        .unwrap_or(0)
}

fn mask_v6(prefix_len: u8) -> u128 {
    u128::MAX
        .checked_shl(128 - u32::from(prefix_len))
        .unwrap_or(0)
}

impl FromStr for AddrRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidRange {
            input: s.to_owned(),
            reason: reason.to_owned(),
        };

        let (base, prefix_len) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| invalid("missing '/' prefix length"))?;
        let base: IpAddr = base.parse().map_err(|_| invalid("malformed address"))?;
        let prefix_len: u8 = prefix_len
            .parse()
            .map_err(|_| invalid("malformed prefix length"))?;

        Self::new(base, prefix_len).map_err(|_| invalid("prefix length too long"))
    }
}

impl fmt::Display for AddrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix_len)
    }
}
