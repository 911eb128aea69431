use crate::{AddrPool, AddrRange, Error};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Mutex;
use std::thread::scope;

fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[test]
fn range_parses_and_displays() {
    let range: AddrRange = "10.0.0.1/24".parse().unwrap();
    assert_eq!(range.base(), ip("10.0.0.1"));
    assert_eq!(range.prefix_len(), 24);
    assert_eq!(range.network(), ip("10.0.0.0"));
    assert_eq!(range.to_string(), "10.0.0.1/24");

    let range: AddrRange = "fd00::1/64".parse().unwrap();
    assert_eq!(range.network(), ip("fd00::"));
    assert_eq!(range.to_string(), "fd00::1/64");
}

#[test]
fn range_network_clears_host_bits() {
    let cases = [
        ("10.1.2.3/0", "0.0.0.0"),
        ("10.1.2.3/20", "10.1.0.0"),
        ("10.1.2.3/32", "10.1.2.3"),
        ("fd00:1:2:3::9/0", "::"),
        ("fd00:1:2:3::9/56", "fd00:1:2::"),
        ("fd00:1:2:3::9/128", "fd00:1:2:3::9"),
    ];
    for (range, network) in cases {
        let range: AddrRange = range.parse().unwrap();
        assert_eq!(range.network(), ip(network), "{range}");
    }
}

#[test]
fn range_rejects_malformed_input() {
    for input in ["10.0.0.1", "10.0.0.1/33", "fd00::/129", "not-an-ip/8", "10.0.0.1/x", ""] {
        let err = input.parse::<AddrRange>().unwrap_err();
        assert!(
            matches!(err, Error::InvalidRange { .. }),
            "{input:?} produced {err:?}"
        );
    }
}

#[test]
fn range_contains_uses_masked_network() {
    let range: AddrRange = "10.0.0.1/24".parse().unwrap();
    assert!(range.contains(ip("10.0.0.0")));
    assert!(range.contains(ip("10.0.0.255")));
    assert!(!range.contains(ip("10.0.1.0")));
    assert!(range.contains(ip("::ffff:10.0.0.7")));
    assert!(!range.contains(ip("fd00::1")));

    let everything: AddrRange = "0.0.0.0/0".parse().unwrap();
    assert!(everything.contains(ip("255.255.255.255")));
}

#[test]
fn range_nth_walks_low_bits() {
    let range: AddrRange = "10.0.0.250/16".parse().unwrap();
    assert_eq!(range.nth(0), Some(ip("10.0.0.250")));
    assert_eq!(range.nth(6), Some(ip("10.0.1.0")));

    let range: AddrRange = "fd00::ffff:ffff:ffff:ffff/48".parse().unwrap();
    // The low 64 bits wrap without carrying into the upper half.
    assert_eq!(range.nth(1), Some(ip("fd00::")));
}

#[test]
fn sequential_acquire_is_unique_and_in_range() {
    let pool = AddrPool::from_cidr("10.0.0.1/24").unwrap();
    let mut seen = HashSet::new();

    let mut last = None;
    for _ in 0..200 {
        let addr = pool.acquire().unwrap();
        assert!(pool.range().contains(addr));
        assert!(seen.insert(addr), "duplicate {addr}");
        if let Some(last) = last {
            assert!(addr > last);
        }
        last = Some(addr);
    }
    assert_eq!(pool.allocated_len(), 200);
}

#[test]
fn release_then_acquire_reuses_address() {
    let pool = AddrPool::from_cidr("10.0.0.1/24").unwrap();
    let a = pool.acquire().unwrap();
    assert!(pool.release(a));
    assert!(!pool.is_allocated(a));
    assert_eq!(pool.free_len(), 1);

    assert_eq!(pool.acquire().unwrap(), a);
    assert_eq!(pool.free_len(), 0);
    assert!(pool.is_allocated(a));
}

#[test]
fn foreign_addresses_are_ignored() {
    let pool = AddrPool::from_cidr("10.0.0.1/24").unwrap();
    assert!(!pool.release(ip("192.168.0.1")));
    assert!(!pool.mark_used(ip("fd00::1")));
    assert_eq!(pool.free_len(), 0);
    assert_eq!(pool.allocated_len(), 0);
}

#[test]
fn mapped_addresses_are_stored_as_ipv4() {
    let pool = AddrPool::from_cidr("10.0.0.1/24").unwrap();
    assert!(pool.mark_used(ip("::ffff:10.0.0.1")));
    assert!(pool.is_allocated(ip("10.0.0.1")));
    assert_eq!(pool.acquire().unwrap(), ip("10.0.0.2"));

    assert!(pool.release(ip("::ffff:10.0.0.2")));
    assert_eq!(pool.acquire().unwrap(), ip("10.0.0.2"));
}

#[test]
fn mark_used_is_skipped_by_generator() {
    let pool = AddrPool::from_cidr("10.0.0.1/24").unwrap();
    assert!(pool.mark_used(ip("10.0.0.1")));
    assert!(pool.mark_used(ip("10.0.0.2")));

    assert_eq!(pool.acquire().unwrap(), ip("10.0.0.3"));
}

#[test]
fn mark_used_withdraws_free_entry() {
    let pool = AddrPool::from_cidr("10.0.0.1/24").unwrap();
    let a = pool.acquire().unwrap();
    pool.release(a);

    assert!(pool.mark_used(a));
    assert_eq!(pool.free_len(), 0);
    assert_ne!(pool.acquire().unwrap(), a);
}

#[test]
fn exhausted_range_reports_error_until_release() {
    let pool = AddrPool::from_cidr("10.0.0.0/30").unwrap();
    let addrs: Vec<_> = (0..4).map(|_| pool.acquire().unwrap()).collect();
    assert_eq!(addrs.last(), Some(&ip("10.0.0.3")));

    assert!(matches!(
        pool.acquire(),
        Err(Error::RangeExhausted { range }) if range == "10.0.0.0/30"
    ));

    pool.release(addrs[1]);
    assert_eq!(pool.acquire().unwrap(), addrs[1]);
}

#[test]
fn ipv6_pool_generates_sequentially() {
    let pool = AddrPool::from_cidr("fd00::/64").unwrap();
    assert_eq!(pool.acquire().unwrap(), ip("fd00::"));
    assert_eq!(pool.acquire().unwrap(), ip("fd00::1"));
    assert_eq!(pool.acquire().unwrap(), ip("fd00::2"));
}

#[test]
fn concurrent_acquire_is_unique() {
    const THREADS: usize = 10;
    const PER_THREAD: usize = 10;

    let pool = AddrPool::from_cidr("10.0.0.1/24").unwrap();
    let seen = Mutex::new(HashSet::with_capacity(THREADS * PER_THREAD));

    scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..PER_THREAD {
                    let addr = pool.acquire().unwrap();
                    assert!(seen.lock().unwrap().insert(addr));
                }
            });
        }
    });

    let seen = seen.into_inner().unwrap();
    assert_eq!(seen.len(), THREADS * PER_THREAD);
    assert!(seen.iter().all(|addr| pool.range().contains(*addr)));
}

#[test]
fn concurrent_churn_never_double_allocates() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 500;

    let pool = AddrPool::from_cidr("10.1.0.0/28").unwrap();
    let held = Mutex::new(HashSet::new());

    scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                for _ in 0..ROUNDS {
                    let addr = pool.acquire().unwrap();
                    assert!(held.lock().unwrap().insert(addr), "{addr} handed out twice");
                    assert!(held.lock().unwrap().remove(&addr));
                    pool.release(addr);
                }
            });
        }
    });

    assert_eq!(pool.allocated_len(), 0);
    assert!(pool.free_len() <= THREADS);
}
