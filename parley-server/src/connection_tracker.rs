//! Connection tracking for DoS protection
//!
//! Limits how many signaling connections a single IP address may hold open,
//! so one host cannot exhaust relay resources.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex};

/// Tracks active connections per IP address
///
/// A limit of 0 means unlimited connections are allowed.
#[derive(Debug)]
pub struct ConnectionTracker {
    /// Map of IP addresses to their current connection count
    connections: Arc<Mutex<HashMap<IpAddr, usize>>>,
    /// Maximum connections allowed per IP (0 = unlimited)
    max_connections_per_ip: usize,
}

impl ConnectionTracker {
    /// Create a new connection tracker with the specified limit
    #[must_use]
    pub fn new(max_connections_per_ip: usize) -> Self {
        Self {
            connections: Arc::new(Mutex::new(HashMap::new())),
            max_connections_per_ip,
        }
    }

    /// Try to acquire a connection slot for the given IP
    ///
    /// Returns `None` if the IP has reached its connection limit. The
    /// returned guard releases the slot when dropped.
    pub fn try_acquire(&self, ip: IpAddr) -> Option<ConnectionGuard> {
        let max = self.max_connections_per_ip;
        let mut connections = self
            .connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let count = connections.entry(ip).or_insert(0);

        // 0 means unlimited
        if max > 0 && *count >= max {
            return None;
        }

        *count += 1;
        Some(ConnectionGuard {
            ip,
            connections: self.connections.clone(),
        })
    }

    /// Current connection count for an IP
    pub fn connection_count(&self, ip: IpAddr) -> usize {
        let connections = self
            .connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        connections.get(&ip).copied().unwrap_or(0)
    }
}

/// RAII guard that releases a connection slot when dropped
///
/// Slots are released even if the connection handler panics or returns early.
#[derive(Debug)]
pub struct ConnectionGuard {
    ip: IpAddr,
    connections: Arc<Mutex<HashMap<IpAddr, usize>>>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let mut connections = self
            .connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(count) = connections.get_mut(&self.ip) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                connections.remove(&self.ip);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn ip(last: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(192, 168, 1, last))
    }

    #[test]
    fn test_acquire_and_release() {
        let tracker = ConnectionTracker::new(2);

        let guard1 = tracker.try_acquire(ip(1));
        assert!(guard1.is_some());
        let guard2 = tracker.try_acquire(ip(1));
        assert!(guard2.is_some());
        assert_eq!(tracker.connection_count(ip(1)), 2);

        // Rejected at the limit
        assert!(tracker.try_acquire(ip(1)).is_none());

        drop(guard1);
        assert_eq!(tracker.connection_count(ip(1)), 1);
        assert!(tracker.try_acquire(ip(1)).is_some());
    }

    #[test]
    fn test_limits_are_per_ip() {
        let tracker = ConnectionTracker::new(1);
        let _g1 = tracker.try_acquire(ip(1)).unwrap();
        let _g2 = tracker.try_acquire(ip(2)).unwrap();
        let _g3 = tracker
            .try_acquire(IpAddr::V6(Ipv6Addr::LOCALHOST))
            .unwrap();
        assert!(tracker.try_acquire(ip(1)).is_none());
    }

    #[test]
    fn test_zero_means_unlimited() {
        let tracker = ConnectionTracker::new(0);
        let guards: Vec<_> = (0..100).filter_map(|_| tracker.try_acquire(ip(1))).collect();
        assert_eq!(guards.len(), 100);
        drop(guards);
        assert_eq!(tracker.connection_count(ip(1)), 0);
    }
}
