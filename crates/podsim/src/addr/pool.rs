use std::collections::HashSet;
use std::net::IpAddr;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{AddrRange, Error, Result, lock::Mutex};

/// A thread-safe allocator of unique addresses from one [`AddrRange`].
///
/// Released addresses are recycled before new ones are generated. New
/// addresses come from a cursor walking forward from the range's base, so
/// freshly generated addresses are strictly increasing. Recycled addresses
/// come back in no particular order.
///
/// Every operation runs under a single lock covering the allocated set, the
/// free set and the cursor, so a release can never interleave with an acquire
/// half-way.
///
/// # Example
/// ```
/// use podsim::AddrPool;
///
/// let pool = AddrPool::from_cidr("10.0.0.1/24").unwrap();
///
/// let a = pool.acquire().unwrap();
/// assert_eq!(a.to_string(), "10.0.0.1");
///
/// pool.release(a);
/// assert_eq!(pool.acquire().unwrap(), a);
/// ```
pub struct AddrPool {
    range: AddrRange,
    #[cfg(feature = "cache-padded")]
    state: crossbeam_utils::CachePadded<Mutex<PoolState>>,
    #[cfg(not(feature = "cache-padded"))]
    state: Mutex<PoolState>,
}

#[derive(Default)]
struct PoolState {
    allocated: HashSet<IpAddr>,
    free: HashSet<IpAddr>,
    cursor: u64,
}

impl PoolState {
    /// Advances the cursor to the next address that was never handed out and
    /// is not marked as used.
    fn next_unused(&mut self, range: &AddrRange) -> Option<IpAddr> {
        loop {
            let candidate = range.nth(self.cursor)?;
            self.cursor = self.cursor.checked_add(1)?;

            if !self.allocated.contains(&candidate) {
                return Some(candidate);
            }
        }
    }
}

impl AddrPool {
    pub fn new(range: AddrRange) -> Self {
        let state = Mutex::new(PoolState::default());
        Self {
            range,
            #[cfg(feature = "cache-padded")]
            state: crossbeam_utils::CachePadded::new(state),
            #[cfg(not(feature = "cache-padded"))]
            state,
        }
    }

    /// Parses `cidr` (e.g. `"10.0.0.1/16"`) and creates a pool over it.
    ///
    /// # Errors
    /// Returns [`Error::InvalidRange`] if `cidr` is malformed.
    pub fn from_cidr(cidr: &str) -> Result<Self> {
        Ok(Self::new(cidr.parse()?))
    }

    pub const fn range(&self) -> &AddrRange {
        &self.range
    }

    /// Hands out an address that is not currently allocated.
    ///
    /// Any previously released address is preferred. Otherwise the next
    /// address after the cursor is generated, skipping addresses registered
    /// through [`AddrPool::mark_used`].
    ///
    /// # Errors
    /// Returns [`Error::RangeExhausted`] when nothing is free and the cursor
    /// has walked past the end of the range.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self), fields(range = %self.range)))]
    pub fn acquire(&self) -> Result<IpAddr> {
        let mut state = self.state.lock();

        let addr = match state.free.iter().next().copied() {
            Some(addr) => addr,
            None => state
                .next_unused(&self.range)
                .ok_or_else(|| Error::RangeExhausted {
                    range: self.range.to_string(),
                })?,
        };

        state.free.remove(&addr);
        state.allocated.insert(addr);
        Ok(addr)
    }

    /// Returns `addr` to the pool for reuse.
    ///
    /// Addresses outside the range are ignored and `false` is returned, so a
    /// caller can hand back addresses from an unrelated allocator without
    /// checking where they came from.
    pub fn release(&self, addr: IpAddr) -> bool {
        let addr = self.range.canonicalize(addr);
        if !self.range.contains(addr) {
            #[cfg(feature = "tracing")]
            tracing::trace!(%addr, range = %self.range, "ignoring release of foreign address");
            return false;
        }

        let mut state = self.state.lock();
        state.allocated.remove(&addr);
        state.free.insert(addr);
        true
    }

    /// Records `addr` as in use without going through [`AddrPool::acquire`].
    ///
    /// Used to adopt addresses observed on existing objects. The address is
    /// also withdrawn from the free set so a later acquire cannot hand it to a
    /// second owner. Addresses outside the range are ignored and `false` is
    /// returned.
    pub fn mark_used(&self, addr: IpAddr) -> bool {
        let addr = self.range.canonicalize(addr);
        if !self.range.contains(addr) {
            #[cfg(feature = "tracing")]
            tracing::trace!(%addr, range = %self.range, "ignoring foreign address marked as used");
            return false;
        }

        let mut state = self.state.lock();
        state.free.remove(&addr);
        state.allocated.insert(addr);
        true
    }

    pub fn is_allocated(&self, addr: IpAddr) -> bool {
        let addr = self.range.canonicalize(addr);
        self.state.lock().allocated.contains(&addr)
    }

    pub fn allocated_len(&self) -> usize {
        self.state.lock().allocated.len()
    }

    pub fn free_len(&self) -> usize {
        self.state.lock().free.len()
    }
}
