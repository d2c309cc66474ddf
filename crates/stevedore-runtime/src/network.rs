use crate::RuntimeError;
use std::process::Command;
use tracing::debug;

/// Host-side address and NAT management for service addresses.
pub trait NetworkProvider: Send + Sync {
    fn name(&self) -> &str;

    fn add_address(&self, ip: &str) -> Result<(), RuntimeError>;

    fn remove_address(&self, ip: &str) -> Result<(), RuntimeError>;

    fn add_nat(&self, external_ip: &str, internal_ip: &str) -> Result<(), RuntimeError>;

    fn remove_nat(&self, external_ip: &str, internal_ip: &str) -> Result<(), RuntimeError>;
}

pub fn select_network(
    name: &str,
    interface: &str,
) -> Result<Box<dyn NetworkProvider>, RuntimeError> {
    match name {
        "host" => Ok(Box::new(HostNetwork::with_interface(interface))),
        "mock" => Ok(Box::new(crate::mock::MockNetwork::new())),
        other => Err(RuntimeError::BackendUnavailable(other.to_owned())),
    }
}

/// Network provider shelling out to `ip` and `iptables`. Addresses are bound
/// to `interface` and mapped with DNAT/SNAT rules in the `nat` table.
///
/// Empty addresses are skipped, so a zero-value service record can be torn
/// down without touching the host.
pub struct HostNetwork {
    interface: String,
}

impl Default for HostNetwork {
    fn default() -> Self {
        Self {
            interface: "lo".to_owned(),
        }
    }
}

impl HostNetwork {
    pub fn with_interface(interface: &str) -> Self {
        Self {
            interface: interface.to_owned(),
        }
    }

    fn address_args(&self, action: &str, ip: &str) -> Vec<String> {
        vec![
            "addr".to_owned(),
            action.to_owned(),
            format!("{ip}/32"),
            "dev".to_owned(),
            self.interface.clone(),
        ]
    }

    fn nat_rules(flag: &str, external_ip: &str, internal_ip: &str) -> [Vec<String>; 2] {
        let dnat = [
            "-t", "nat", flag, "PREROUTING", "-d", external_ip, "-j", "DNAT",
            "--to-destination", internal_ip,
        ];
        let snat = [
            "-t", "nat", flag, "POSTROUTING", "-s", internal_ip, "-j", "SNAT",
            "--to-source", external_ip,
        ];
        [
            dnat.iter().map(|s| (*s).to_owned()).collect(),
            snat.iter().map(|s| (*s).to_owned()).collect(),
        ]
    }
}

fn run_tool(program: &str, args: &[String]) -> Result<(), RuntimeError> {
    debug!("{program} {}", args.join(" "));
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| RuntimeError::NetworkFailed(format!("{program}: {e}")))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(RuntimeError::NetworkFailed(format!(
            "{program} {} exited with code {}: {}",
            args.join(" "),
            output.status.code().unwrap_or(1),
            String::from_utf8_lossy(&output.stderr).trim()
        )))
    }
}

impl NetworkProvider for HostNetwork {
    fn name(&self) -> &'static str {
        "host"
    }

    fn add_address(&self, ip: &str) -> Result<(), RuntimeError> {
        if ip.is_empty() {
            return Ok(());
        }
        run_tool("ip", &self.address_args("add", ip))
    }

    fn remove_address(&self, ip: &str) -> Result<(), RuntimeError> {
        if ip.is_empty() {
            return Ok(());
        }
        run_tool("ip", &self.address_args("del", ip))
    }

    fn add_nat(&self, external_ip: &str, internal_ip: &str) -> Result<(), RuntimeError> {
        if external_ip.is_empty() || internal_ip.is_empty() {
            return Ok(());
        }
        for rule in Self::nat_rules("-A", external_ip, internal_ip) {
            run_tool("iptables", &rule)?;
        }
        Ok(())
    }

    fn remove_nat(&self, external_ip: &str, internal_ip: &str) -> Result<(), RuntimeError> {
        if external_ip.is_empty() || internal_ip.is_empty() {
            return Ok(());
        }
        for rule in Self::nat_rules("-D", external_ip, internal_ip) {
            run_tool("iptables", &rule)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_valid_providers() {
        assert_eq!(select_network("host", "eth1").unwrap().name(), "host");
        assert_eq!(select_network("mock", "lo").unwrap().name(), "mock");
        assert!(select_network("bogus", "lo").is_err());
    }

    #[test]
    fn address_args_bind_to_interface() {
        let net = HostNetwork::with_interface("eth1");
        assert_eq!(
            net.address_args("add", "10.0.0.5"),
            vec!["addr", "add", "10.0.0.5/32", "dev", "eth1"]
        );
    }

    #[test]
    fn nat_rules_pair_dnat_and_snat() {
        let [dnat, snat] = HostNetwork::nat_rules("-D", "10.0.0.5", "172.18.0.2");
        assert!(dnat.contains(&"PREROUTING".to_owned()));
        assert_eq!(dnat.last().map(String::as_str), Some("172.18.0.2"));
        assert!(snat.contains(&"POSTROUTING".to_owned()));
        assert_eq!(snat.last().map(String::as_str), Some("10.0.0.5"));
        assert_eq!(dnat[2], "-D");
    }

    #[test]
    fn empty_addresses_are_noops() {
        let net = HostNetwork::default();
        assert!(net.remove_nat("", "").is_ok());
        assert!(net.remove_address("").is_ok());
        assert!(net.add_address("").is_ok());
    }
}
