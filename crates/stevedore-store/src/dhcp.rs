use crate::models::DHCP_BUCKET;
use crate::records::RecordStore;
use crate::StoreError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use stevedore_schema::DhcpSection;
use tracing::{debug, warn};

const LEASES_KEY: &str = "leases";

/// Source of network addresses for services.
pub trait AddressPool: Send + Sync {
    /// Check out the next free address.
    fn lease(&self) -> Result<String, StoreError>;

    /// Give an address back. Empty and unleased addresses are ignored.
    fn return_address(&self, ip: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LeaseTable {
    leased: BTreeSet<Ipv4Addr>,
}

/// Address pool over an inclusive IPv4 range, with leases persisted in the
/// record store.
pub struct DhcpPool {
    store: RecordStore,
    start: Ipv4Addr,
    end: Ipv4Addr,
}

impl DhcpPool {
    pub fn new(store: RecordStore, range: DhcpSection) -> Self {
        Self {
            store,
            start: range.start,
            end: range.end,
        }
    }

    fn load(&self) -> Result<LeaseTable, StoreError> {
        self.store.get_or_default(DHCP_BUCKET, LEASES_KEY)
    }

    fn save(&self, table: &LeaseTable) -> Result<(), StoreError> {
        self.store.put(DHCP_BUCKET, LEASES_KEY, table)
    }

    pub fn leased(&self) -> Result<Vec<Ipv4Addr>, StoreError> {
        Ok(self.load()?.leased.into_iter().collect())
    }
}

impl AddressPool for DhcpPool {
    fn lease(&self) -> Result<String, StoreError> {
        let mut table = self.load()?;
        let free = (u32::from(self.start)..=u32::from(self.end))
            .map(Ipv4Addr::from)
            .find(|ip| !table.leased.contains(ip))
            .ok_or(StoreError::PoolExhausted {
                start: self.start,
                end: self.end,
            })?;
        table.leased.insert(free);
        self.save(&table)?;
        debug!("leased {free}");
        Ok(free.to_string())
    }

    fn return_address(&self, ip: &str) -> Result<(), StoreError> {
        if ip.is_empty() {
            debug!("ignoring return of empty address");
            return Ok(());
        }
        let addr: Ipv4Addr = ip
            .parse()
            .map_err(|_| StoreError::InvalidAddress(ip.to_owned()))?;
        let mut table = self.load()?;
        if !table.leased.remove(&addr) {
            warn!("address {addr} is not leased; ignoring return");
            return Ok(());
        }
        self.save(&table)?;
        debug!("returned {addr}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StoreLayout;

    fn test_pool(start: [u8; 4], end: [u8; 4]) -> (tempfile::TempDir, DhcpPool) {
        let dir = tempfile::tempdir().unwrap();
        let layout = StoreLayout::new(dir.path());
        layout.initialize().unwrap();
        let pool = DhcpPool::new(
            RecordStore::new(layout),
            DhcpSection {
                start: Ipv4Addr::from(start),
                end: Ipv4Addr::from(end),
            },
        );
        (dir, pool)
    }

    #[test]
    fn leases_are_sequential_and_unique() {
        let (_dir, pool) = test_pool([10, 0, 0, 1], [10, 0, 0, 10]);
        assert_eq!(pool.lease().unwrap(), "10.0.0.1");
        assert_eq!(pool.lease().unwrap(), "10.0.0.2");
        assert_eq!(pool.leased().unwrap().len(), 2);
    }

    #[test]
    fn returned_address_is_reused() {
        let (_dir, pool) = test_pool([10, 0, 0, 1], [10, 0, 0, 10]);
        let first = pool.lease().unwrap();
        pool.lease().unwrap();
        pool.return_address(&first).unwrap();
        assert_eq!(pool.lease().unwrap(), first);
    }

    #[test]
    fn exhaustion_is_reported() {
        let (_dir, pool) = test_pool([10, 0, 0, 1], [10, 0, 0, 2]);
        pool.lease().unwrap();
        pool.lease().unwrap();
        assert!(matches!(
            pool.lease(),
            Err(StoreError::PoolExhausted { .. })
        ));
    }

    #[test]
    fn empty_and_unleased_returns_are_ignored() {
        let (_dir, pool) = test_pool([10, 0, 0, 1], [10, 0, 0, 10]);
        let ip = pool.lease().unwrap();
        pool.return_address("").unwrap();
        pool.return_address("10.0.0.9").unwrap();
        pool.return_address(&ip).unwrap();
        pool.return_address(&ip).unwrap();
        assert!(pool.leased().unwrap().is_empty());
    }

    #[test]
    fn invalid_address_is_rejected() {
        let (_dir, pool) = test_pool([10, 0, 0, 1], [10, 0, 0, 10]);
        assert!(matches!(
            pool.return_address("not-an-ip"),
            Err(StoreError::InvalidAddress(_))
        ));
    }

    #[test]
    fn leases_survive_reopen() {
        let (dir, pool) = test_pool([10, 0, 0, 1], [10, 0, 0, 10]);
        pool.lease().unwrap();
        drop(pool);
        let reopened = DhcpPool::new(
            RecordStore::new(StoreLayout::new(dir.path())),
            DhcpSection {
                start: Ipv4Addr::new(10, 0, 0, 1),
                end: Ipv4Addr::new(10, 0, 0, 10),
            },
        );
        assert_eq!(reopened.lease().unwrap(), "10.0.0.2");
    }
}
