use crate::backend::{ContainerBackend, ContainerSpec};
use crate::network::NetworkProvider;
use crate::RuntimeError;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use stevedore_store::{AddressPool, StoreError};

fn guard<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Call log shared by the mocks: every call is recorded as
/// `"<op> <args...>"`, and ops registered through `fail_on` error out.
#[derive(Default)]
struct Recorder {
    calls: Mutex<Vec<String>>,
    failing: Mutex<BTreeSet<String>>,
}

impl Recorder {
    fn record(&self, op: &str, args: &[&str]) -> bool {
        let mut line = op.to_owned();
        for a in args {
            line.push(' ');
            line.push_str(a);
        }
        guard(&self.calls).push(line);
        guard(&self.failing).contains(op)
    }

    fn calls(&self) -> Vec<String> {
        guard(&self.calls).clone()
    }

    fn fail_on(&self, op: &str) {
        guard(&self.failing).insert(op.to_owned());
    }
}

/// In-memory container backend. Containers live for the lifetime of the
/// value; removing an unknown container reports `ContainerNotFound`.
#[derive(Default)]
pub struct MockBackend {
    containers: Mutex<BTreeMap<String, ContainerSpec>>,
    recorder: Recorder,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call to `op` fail.
    pub fn fail_on(&self, op: &str) {
        self.recorder.fail_on(op);
    }

    pub fn calls(&self) -> Vec<String> {
        self.recorder.calls()
    }

    pub fn containers(&self) -> Vec<String> {
        guard(&self.containers).keys().cloned().collect()
    }
}

impl ContainerBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn create_container(&self, spec: &ContainerSpec) -> Result<(), RuntimeError> {
        if self.recorder.record("create_container", &[&spec.name]) {
            return Err(RuntimeError::ExecFailed(format!(
                "mock create of {} failed",
                spec.name
            )));
        }
        guard(&self.containers).insert(spec.name.clone(), spec.clone());
        Ok(())
    }

    fn remove_container(&self, name: &str) -> Result<(), RuntimeError> {
        if self.recorder.record("remove_container", &[name]) {
            return Err(RuntimeError::ExecFailed(format!(
                "mock removal of {name} failed"
            )));
        }
        match guard(&self.containers).remove(name) {
            Some(_) => Ok(()),
            None => Err(RuntimeError::ContainerNotFound(name.to_owned())),
        }
    }
}

#[derive(Default)]
pub struct MockNetwork {
    recorder: Recorder,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, op: &str) {
        self.recorder.fail_on(op);
    }

    pub fn calls(&self) -> Vec<String> {
        self.recorder.calls()
    }

    fn check(&self, op: &str, args: &[&str]) -> Result<(), RuntimeError> {
        if self.recorder.record(op, args) {
            Err(RuntimeError::NetworkFailed(format!("mock {op} failed")))
        } else {
            Ok(())
        }
    }
}

impl NetworkProvider for MockNetwork {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn add_address(&self, ip: &str) -> Result<(), RuntimeError> {
        self.check("add_address", &[ip])
    }

    fn remove_address(&self, ip: &str) -> Result<(), RuntimeError> {
        self.check("remove_address", &[ip])
    }

    fn add_nat(&self, external_ip: &str, internal_ip: &str) -> Result<(), RuntimeError> {
        self.check("add_nat", &[external_ip, internal_ip])
    }

    fn remove_nat(&self, external_ip: &str, internal_ip: &str) -> Result<(), RuntimeError> {
        self.check("remove_nat", &[external_ip, internal_ip])
    }
}

/// In-memory address pool handing out `10.10.0.N` in order.
#[derive(Default)]
pub struct MockPool {
    next: Mutex<u8>,
    leased: Mutex<BTreeSet<String>>,
    returned: Mutex<Vec<String>>,
    recorder: Recorder,
}

impl MockPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, op: &str) {
        self.recorder.fail_on(op);
    }

    /// Every address passed to `return_address`, in call order.
    pub fn returned(&self) -> Vec<String> {
        guard(&self.returned).clone()
    }

    pub fn leased(&self) -> Vec<String> {
        guard(&self.leased).iter().cloned().collect()
    }
}

impl AddressPool for MockPool {
    fn lease(&self) -> Result<String, StoreError> {
        if self.recorder.record("lease", &[]) {
            return Err(StoreError::Io(std::io::Error::other("mock lease failed")));
        }
        let mut next = guard(&self.next);
        *next = next.checked_add(1).ok_or_else(|| StoreError::PoolExhausted {
            start: [10, 10, 0, 1].into(),
            end: [10, 10, 0, 255].into(),
        })?;
        let ip = format!("10.10.0.{}", *next);
        guard(&self.leased).insert(ip.clone());
        Ok(ip)
    }

    fn return_address(&self, ip: &str) -> Result<(), StoreError> {
        if self.recorder.record("return_address", &[ip]) {
            return Err(StoreError::Io(std::io::Error::other(
                "mock return_address failed",
            )));
        }
        guard(&self.returned).push(ip.to_owned());
        guard(&self.leased).remove(ip);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> ContainerSpec {
        ContainerSpec {
            name: name.to_owned(),
            image: "nginx".to_owned(),
            hostname: "web".to_owned(),
            ip: None,
            env: Vec::new(),
        }
    }

    #[test]
    fn mock_backend_lifecycle() {
        let backend = MockBackend::new();
        backend.create_container(&spec("c1")).unwrap();
        assert_eq!(backend.containers(), vec!["c1"]);
        backend.remove_container("c1").unwrap();
        assert!(backend.containers().is_empty());
        assert_eq!(
            backend.calls(),
            vec!["create_container c1", "remove_container c1"]
        );
    }

    #[test]
    fn mock_backend_missing_container() {
        let backend = MockBackend::new();
        assert!(matches!(
            backend.remove_container("ghost"),
            Err(RuntimeError::ContainerNotFound(_))
        ));
    }

    #[test]
    fn mock_backend_injected_failure() {
        let backend = MockBackend::new();
        backend.fail_on("create_container");
        assert!(backend.create_container(&spec("c1")).is_err());
        assert!(backend.containers().is_empty());
    }

    #[test]
    fn mock_network_records_and_fails() {
        let net = MockNetwork::new();
        net.remove_nat("1.1.1.1", "2.2.2.2").unwrap();
        net.fail_on("remove_address");
        assert!(net.remove_address("1.1.1.1").is_err());
        assert_eq!(
            net.calls(),
            vec!["remove_nat 1.1.1.1 2.2.2.2", "remove_address 1.1.1.1"]
        );
    }

    #[test]
    fn mock_pool_leases_and_returns() {
        let pool = MockPool::new();
        let a = pool.lease().unwrap();
        let b = pool.lease().unwrap();
        assert_eq!(a, "10.10.0.1");
        assert_eq!(b, "10.10.0.2");
        pool.return_address(&a).unwrap();
        assert_eq!(pool.returned(), vec!["10.10.0.1"]);
        assert_eq!(pool.leased(), vec!["10.10.0.2"]);
    }
}
