//! Network intent file.
//!
//! Loads the inventory, credentials, VLAN table and routing intent from a
//! TOML file and validates the network invariants before any device is
//! touched. Everything is read once and treated as read-only for the run.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use crate::error::{ConfigError, Result};
use crate::model::{
    DeviceDescriptor, DeviceRole, EdgeRouterIntent, NetworkIntent, RemoteRouterIntent, TrunkPolicy,
    VlanDefinition,
};
use crate::platform::Dialect;
use crate::session::SshConnector;
use crate::transport::HostKeyVerification;

/// Run-wide options (`[run]`).
#[derive(Debug, Clone, Deserialize)]
pub struct RunOptions {
    /// Audit log file, appended to and never truncated.
    #[serde(default = "default_audit_log")]
    pub audit_log: PathBuf,

    /// Devices configured at the same time. 1 keeps the run sequential.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

/// Timeouts in seconds (`[timeouts]`).
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Timeouts {
    /// SSH connect and authentication
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,

    /// Each command step or verification read
    #[serde(default = "default_command_secs")]
    pub command_secs: u64,

    /// Opening and elevating a session, end to end
    #[serde(default = "default_session_secs")]
    pub session_secs: u64,
}

impl Timeouts {
    /// SSH connect and authentication timeout.
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    /// Per-step and per-read timeout.
    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    /// Session open plus elevation timeout.
    pub fn session(&self) -> Duration {
        Duration::from_secs(self.session_secs)
    }
}

/// SSH options shared by every device (`[ssh]`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SshOptions {
    /// Host key verification mode
    #[serde(default)]
    pub host_key_verification: HostKeyVerification,

    /// known_hosts file (default `~/.ssh/known_hosts`)
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,

    /// Offer SHA-1 key exchange and `ssh-rsa` host keys for old firmware
    #[serde(default)]
    pub legacy_algorithms: bool,
}

/// Login credentials for one dialect (`[credentials.<dialect>]`).
#[derive(Debug, Deserialize)]
pub struct Credentials {
    /// Login user
    pub username: String,

    /// Login password, or the private key passphrase
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub password: Option<SecretString>,

    /// Privilege escalation secret (`enable` on IOS)
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub secret: Option<SecretString>,

    /// Private key file; `password` is then used as its passphrase
    #[serde(default)]
    pub private_key: Option<PathBuf>,
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        let copy = |s: &SecretString| SecretString::from(s.expose_secret().to_string());
        Self {
            username: self.username.clone(),
            password: self.password.as_ref().map(copy),
            secret: self.secret.as_ref().map(copy),
            private_key: self.private_key.clone(),
        }
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> std::result::Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.map(SecretString::from))
}

/// Trunk uplink section (`[trunk]`).
#[derive(Debug, Clone, Deserialize)]
struct TrunkSection {
    interface: String,

    /// Reserved/native ids allowed in addition to the VLAN table
    #[serde(default)]
    reserved: Vec<u16>,
}

/// Device entry under `[[switches]]` or `[[routers]]`.
#[derive(Debug, Clone, Deserialize)]
struct DeviceEntry {
    name: String,
    address: String,
    #[serde(default = "default_ssh_port")]
    port: u16,
    #[serde(default)]
    dialect: Option<Dialect>,
    #[serde(default)]
    role: Option<DeviceRole>,
}

/// On-disk layout of the intent file.
#[derive(Debug, Deserialize)]
struct NetworkFile {
    #[serde(default)]
    run: RunOptions,
    #[serde(default)]
    timeouts: Timeouts,
    #[serde(default)]
    ssh: SshOptions,
    #[serde(default)]
    credentials: HashMap<String, Credentials>,
    #[serde(default)]
    vlans: Vec<VlanDefinition>,
    trunk: TrunkSection,
    #[serde(default)]
    switches: Vec<DeviceEntry>,
    #[serde(default)]
    routers: Vec<DeviceEntry>,
    #[serde(default)]
    edge_router: EdgeRouterIntent,
    #[serde(default)]
    remote_router: Option<RemoteRouterIntent>,
    #[serde(default)]
    markers: HashMap<String, Vec<String>>,
}

fn default_audit_log() -> PathBuf {
    PathBuf::from("segnet-audit.log")
}

fn default_concurrency() -> usize {
    1
}

fn default_connect_secs() -> u64 {
    30
}

fn default_command_secs() -> u64 {
    30
}

fn default_session_secs() -> u64 {
    60
}

fn default_ssh_port() -> u16 {
    22
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            audit_log: default_audit_log(),
            concurrency: default_concurrency(),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            command_secs: default_command_secs(),
            session_secs: default_session_secs(),
        }
    }
}

/// Validated network configuration.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub run: RunOptions,
    pub timeouts: Timeouts,
    pub ssh: SshOptions,
    credentials: HashMap<Dialect, Credentials>,
    intent: NetworkIntent,
    switches: Vec<DeviceDescriptor>,
    routers: Vec<DeviceDescriptor>,
    markers: HashMap<Dialect, Vec<String>>,
}

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(message.into())
}

impl NetworkConfig {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::parse(&text, path)?;
        debug!(
            "loaded {}: {} VLANs, {} switches, {} routers",
            path.display(),
            config.intent.vlans.len(),
            config.switches.len(),
            config.routers.len()
        );
        Ok(config)
    }

    /// Parse and validate config text. `path` is only used in errors.
    pub fn parse(text: &str, path: impl AsRef<Path>) -> Result<Self> {
        let file: NetworkFile = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Ok(Self::validate(file)?)
    }

    fn validate(file: NetworkFile) -> std::result::Result<Self, ConfigError> {
        if file.run.concurrency == 0 {
            return Err(invalid("run.concurrency must be at least 1"));
        }
        for (key, secs) in [
            ("connect_secs", file.timeouts.connect_secs),
            ("command_secs", file.timeouts.command_secs),
            ("session_secs", file.timeouts.session_secs),
        ] {
            if secs == 0 {
                return Err(invalid(format!("timeouts.{key} must be at least 1")));
            }
        }

        validate_vlans(&file.vlans)?;
        if let Some(id) = file.trunk.reserved.iter().find(|id| !(1..=4094).contains(*id)) {
            return Err(invalid(format!("reserved VLAN id {id} out of range 1-4094")));
        }
        let trunk = TrunkPolicy::derive(&file.trunk.interface, &file.vlans, &file.trunk.reserved);
        if trunk.allowed.is_empty() {
            return Err(invalid("trunk allows no VLANs"));
        }
        if !trunk.covers(&file.vlans) {
            return Err(invalid("trunk does not allow every VLAN"));
        }

        validate_edge_router(&file.edge_router, &file.vlans)?;

        let switches = file
            .switches
            .into_iter()
            .map(switch_descriptor)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let routers = file
            .routers
            .into_iter()
            .map(router_descriptor)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut names = HashSet::new();
        for device in switches.iter().chain(&routers) {
            if !names.insert(device.name.as_str()) {
                return Err(invalid(format!("duplicate device name '{}'", device.name)));
            }
        }

        let has_remote = routers.iter().any(|r| r.role == DeviceRole::RemoteRouter);
        let remote_router = match (file.remote_router, has_remote) {
            (None, true) => {
                return Err(invalid(
                    "remote routers are listed but [remote_router] is missing",
                ));
            }
            (Some(mut remote), _) => {
                if remote.destinations.is_empty() {
                    remote.destinations = file
                        .edge_router
                        .routed_vlans
                        .iter()
                        .map(|r| r.gateway.network())
                        .collect();
                }
                Some(remote)
            }
            (None, false) => None,
        };

        let mut credentials = HashMap::new();
        for (name, creds) in file.credentials {
            let dialect: Dialect = name
                .parse()
                .map_err(|_| invalid(format!("unknown dialect '{name}' in [credentials]")))?;
            credentials.insert(dialect, creds);
        }
        for device in switches.iter().chain(&routers) {
            if !credentials.contains_key(&device.dialect) {
                return Err(invalid(format!(
                    "no [credentials.{}] for device '{}'",
                    device.dialect, device.name
                )));
            }
        }

        let mut markers = HashMap::new();
        for (name, set) in file.markers {
            let dialect: Dialect = name
                .parse()
                .map_err(|_| invalid(format!("unknown dialect '{name}' in [markers]")))?;
            if set.is_empty() || set.iter().any(|m| m.is_empty()) {
                return Err(invalid(format!(
                    "[markers.{name}] must list at least one non-empty marker"
                )));
            }
            markers.insert(dialect, set);
        }

        Ok(Self {
            run: file.run,
            timeouts: file.timeouts,
            ssh: file.ssh,
            credentials,
            intent: NetworkIntent {
                vlans: file.vlans,
                trunk,
                edge_router: file.edge_router,
                remote_router,
            },
            switches,
            routers,
            markers,
        })
    }

    /// Static intent shared by every plan.
    pub fn intent(&self) -> &NetworkIntent {
        &self.intent
    }

    /// Switch inventory, in file order.
    pub fn switches(&self) -> &[DeviceDescriptor] {
        &self.switches
    }

    /// Router inventory, in file order.
    pub fn routers(&self) -> &[DeviceDescriptor] {
        &self.routers
    }

    /// Every device, switches first.
    pub fn devices(&self) -> impl Iterator<Item = &DeviceDescriptor> {
        self.switches.iter().chain(&self.routers)
    }

    /// Rejection markers for a dialect: the configured set, or the built-in one.
    pub fn markers_for(&self, dialect: Dialect) -> Vec<String> {
        self.markers
            .get(&dialect)
            .cloned()
            .unwrap_or_else(|| dialect.definition().failed_when_contains)
    }

    /// Rejection markers for every supported dialect.
    pub fn marker_sets(&self) -> HashMap<Dialect, Vec<String>> {
        Dialect::ALL
            .into_iter()
            .map(|d| (d, self.markers_for(d)))
            .collect()
    }

    /// SSH session connector using this file's credentials and options.
    pub fn connector(&self) -> SshConnector {
        SshConnector::new(self.credentials.clone(), self.ssh.clone(), self.timeouts)
    }
}

fn validate_vlans(vlans: &[VlanDefinition]) -> std::result::Result<(), ConfigError> {
    let mut ids = BTreeSet::new();
    let mut ports = HashMap::new();

    for vlan in vlans {
        if !(1..=4094).contains(&vlan.id) {
            return Err(invalid(format!("VLAN id {} out of range 1-4094", vlan.id)));
        }
        if !ids.insert(vlan.id) {
            return Err(invalid(format!("duplicate VLAN id {}", vlan.id)));
        }
        if vlan.name.trim().is_empty() {
            return Err(invalid(format!("VLAN {} has no name", vlan.id)));
        }
        for port in &vlan.ports {
            if let Some(other) = ports.insert(port.as_str(), vlan.id) {
                return Err(invalid(format!(
                    "port {port} bound to both VLAN {other} and VLAN {}",
                    vlan.id
                )));
            }
        }
    }
    Ok(())
}

fn validate_edge_router(
    edge: &EdgeRouterIntent,
    vlans: &[VlanDefinition],
) -> std::result::Result<(), ConfigError> {
    let mut seen = HashSet::new();

    for routed in &edge.routed_vlans {
        let Some(vlan) = vlans.iter().find(|v| v.id == routed.vlan) else {
            return Err(invalid(format!(
                "routed VLAN {} is not in the VLAN table",
                routed.vlan
            )));
        };
        // names become RouterOS interface and pool names
        if vlan.name.chars().any(char::is_whitespace) {
            return Err(invalid(format!(
                "routed VLAN {} name '{}' contains whitespace",
                vlan.id, vlan.name
            )));
        }
        if !seen.insert(routed.vlan) {
            return Err(invalid(format!("VLAN {} routed twice", routed.vlan)));
        }

        if let Some(ref dhcp) = routed.dhcp {
            let subnet = routed.gateway.network();
            if !subnet.contains(dhcp.range_start) || !subnet.contains(dhcp.range_end) {
                return Err(invalid(format!(
                    "DHCP range {}-{} for VLAN {} is outside {subnet}",
                    dhcp.range_start, dhcp.range_end, routed.vlan
                )));
            }
            if dhcp.range_start > dhcp.range_end {
                return Err(invalid(format!(
                    "DHCP range {}-{} for VLAN {} is reversed",
                    dhcp.range_start, dhcp.range_end, routed.vlan
                )));
            }
        }
    }
    Ok(())
}

fn switch_descriptor(entry: DeviceEntry) -> std::result::Result<DeviceDescriptor, ConfigError> {
    let role = entry.role.unwrap_or(DeviceRole::AccessSwitch);
    if role != DeviceRole::AccessSwitch {
        return Err(invalid(format!(
            "switch '{}' must have role access_switch",
            entry.name
        )));
    }
    descriptor(entry, role, Dialect::CiscoIos)
}

fn router_descriptor(entry: DeviceEntry) -> std::result::Result<DeviceDescriptor, ConfigError> {
    let role = entry.role.unwrap_or(DeviceRole::EdgeRouter);
    if role == DeviceRole::AccessSwitch {
        return Err(invalid(format!(
            "router '{}' cannot have role access_switch",
            entry.name
        )));
    }
    descriptor(entry, role, Dialect::MikrotikRouteros)
}

/// Plans are written in one dialect per role, so the device must speak it.
fn descriptor(
    entry: DeviceEntry,
    role: DeviceRole,
    expected: Dialect,
) -> std::result::Result<DeviceDescriptor, ConfigError> {
    let dialect = entry.dialect.unwrap_or(expected);
    if dialect != expected {
        return Err(invalid(format!(
            "device '{}' ({role}) must use dialect {expected}, not {dialect}",
            entry.name
        )));
    }
    Ok(DeviceDescriptor {
        name: entry.name,
        role,
        address: entry.address,
        port: entry.port,
        dialect,
    })
}

#[cfg(test)]
pub(crate) const LAB_CONFIG: &str = r#"
[run]
audit_log = "lab-audit.log"

[ssh]
legacy_algorithms = true
host_key_verification = "disabled"

[credentials.cisco_ios]
username = "admin"
password = "admin"
secret = "admin"

[credentials.mikrotik_routeros]
username = "admin"
password = "admin"

[[vlans]]
id = 250
name = "Ventas"
ports = ["e0/1"]

[[vlans]]
id = 251
name = "Tecnica"
ports = ["e0/3"]

[[vlans]]
id = 252
name = "Visitantes"
ports = ["e1/1"]

[trunk]
interface = "e0/0"
reserved = [1499]

[[switches]]
name = "Switch57"
address = "10.10.14.2"

[[switches]]
name = "Switch56"
address = "10.10.14.3"

[[routers]]
name = "R1"
address = "10.10.14.1"
role = "edge_router"

[[routers]]
name = "R2"
address = "10.10.14.4"
role = "remote_router"

[edge_router]
parent_interface = "ether2"

[[edge_router.routed_vlans]]
vlan = 250
gateway = "10.10.14.33/27"
nat = true
dhcp = { range_start = "10.10.14.34", range_end = "10.10.14.60" }

[[edge_router.routed_vlans]]
vlan = 251
gateway = "10.10.14.65/28"
nat = true

[[edge_router.routed_vlans]]
vlan = 252
gateway = "10.10.14.81/29"

[remote_router]
next_hop = "10.10.14.1"
"#;

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::plan::fixtures::lab_intent;

    fn parse(text: &str) -> Result<NetworkConfig> {
        NetworkConfig::parse(text, "test.toml")
    }

    fn invalid_message(text: &str) -> String {
        match parse(text) {
            Err(crate::Error::Config(ConfigError::Invalid(message))) => message,
            other => panic!("expected invalid config, got {other:?}"),
        }
    }

    #[test]
    fn test_lab_config() {
        let config = parse(LAB_CONFIG).unwrap();
        let expected = lab_intent();

        assert_eq!(config.intent().vlans, expected.vlans);
        assert_eq!(config.intent().trunk, expected.trunk);
        assert_eq!(config.intent().edge_router, expected.edge_router);
        assert_eq!(config.intent().remote_router, expected.remote_router);

        let names: Vec<_> = config.devices().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["Switch57", "Switch56", "R1", "R2"]);
        assert_eq!(config.switches()[0].dialect, Dialect::CiscoIos);
        assert_eq!(config.routers()[1].role, DeviceRole::RemoteRouter);
        assert_eq!(config.routers()[1].dialect, Dialect::MikrotikRouteros);

        assert_eq!(config.run.audit_log, PathBuf::from("lab-audit.log"));
        assert_eq!(config.run.concurrency, 1);
        assert_eq!(config.timeouts.command(), Duration::from_secs(30));
        assert!(config.ssh.legacy_algorithms);
        assert_eq!(config.ssh.host_key_verification, HostKeyVerification::Disabled);
    }

    #[test]
    fn test_reserved_overlap_deduplicated() {
        let text = LAB_CONFIG.replace("reserved = [1499]", "reserved = [1499, 250]");
        let config = parse(&text).unwrap();
        assert_eq!(config.intent().trunk.allowed_list(), "250,251,252,1499");
    }

    #[test]
    fn test_empty_trunk_rejected() {
        let text = "[trunk]\ninterface = \"e0/0\"\n";
        assert!(invalid_message(text).contains("trunk allows no VLANs"));
    }

    #[test]
    fn test_reserved_id_out_of_range_rejected() {
        let text = LAB_CONFIG.replace("reserved = [1499]", "reserved = [1499, 0]");
        assert!(invalid_message(&text).contains("reserved VLAN id 0 out of range"));

        let text = LAB_CONFIG.replace("reserved = [1499]", "reserved = [4095]");
        assert!(invalid_message(&text).contains("reserved VLAN id 4095 out of range"));
    }

    #[test]
    fn test_routed_vlan_name_with_whitespace_rejected() {
        let text = LAB_CONFIG.replace("name = \"Ventas\"", "name = \"Ventas Norte\"");
        assert!(invalid_message(&text).contains("name 'Ventas Norte' contains whitespace"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let text = format!("{LAB_CONFIG}\n[timeouts]\ncommand_secs = 0\n");
        assert!(invalid_message(&text).contains("timeouts.command_secs must be at least 1"));
    }

    #[test]
    fn test_duplicate_vlan_rejected() {
        let text = LAB_CONFIG.replace("id = 251", "id = 250");
        assert!(invalid_message(&text).contains("duplicate VLAN id 250"));
    }

    #[test]
    fn test_unknown_routed_vlan_rejected() {
        let text = LAB_CONFIG.replace("vlan = 252", "vlan = 999");
        assert!(invalid_message(&text).contains("routed VLAN 999"));
    }

    #[test]
    fn test_dhcp_range_outside_subnet_rejected() {
        let text = LAB_CONFIG.replace("range_end = \"10.10.14.60\"", "range_end = \"10.10.14.70\"");
        assert!(invalid_message(&text).contains("outside 10.10.14.32/27"));
    }

    #[test]
    fn test_duplicate_device_name_rejected() {
        let text = LAB_CONFIG.replace("name = \"Switch56\"", "name = \"Switch57\"");
        assert!(invalid_message(&text).contains("duplicate device name"));
    }

    #[test]
    fn test_dialect_must_match_role() {
        let text = LAB_CONFIG.replace(
            "address = \"10.10.14.3\"",
            "address = \"10.10.14.3\"\ndialect = \"mikrotik_routeros\"",
        );
        assert!(invalid_message(&text).contains("must use dialect cisco_ios"));
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let text = LAB_CONFIG.replace(
            "[credentials.mikrotik_routeros]\nusername = \"admin\"\npassword = \"admin\"\n",
            "",
        );
        assert!(invalid_message(&text).contains("no [credentials.mikrotik_routeros] for device 'R1'"));
    }

    #[test]
    fn test_unknown_credentials_dialect_rejected() {
        let text = LAB_CONFIG.replace("[credentials.mikrotik_routeros]", "[credentials.junos]");
        assert!(invalid_message(&text).contains("unknown dialect 'junos'"));
    }

    #[test]
    fn test_remote_router_requires_section() {
        let text = LAB_CONFIG.replace("[remote_router]\nnext_hop = \"10.10.14.1\"\n", "");
        assert!(invalid_message(&text).contains("[remote_router] is missing"));
    }

    #[test]
    fn test_marker_overrides() {
        let config = parse(LAB_CONFIG).unwrap();
        assert!(config
            .markers_for(Dialect::CiscoIos)
            .contains(&"Invalid input".to_string()));

        let text = format!("{LAB_CONFIG}\n[markers]\ncisco_ios = [\"% Invalid\", \"% Incomplete\"]\n");
        let config = parse(&text).unwrap();
        assert_eq!(
            config.markers_for(Dialect::CiscoIos),
            ["% Invalid", "% Incomplete"]
        );
        assert_eq!(
            config.markers_for(Dialect::MikrotikRouteros),
            Dialect::MikrotikRouteros.definition().failed_when_contains
        );
        assert_eq!(config.marker_sets().len(), 2);
    }

    #[test]
    fn test_empty_marker_set_rejected() {
        let text = format!("{LAB_CONFIG}\n[markers]\ncisco_ios = []\n");
        assert!(invalid_message(&text).contains("[markers.cisco_ios]"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = parse("[trunk\n").unwrap_err();
        assert!(err.to_string().contains("test.toml"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(LAB_CONFIG.as_bytes()).unwrap();
        let config = NetworkConfig::load(file.path()).unwrap();
        assert_eq!(config.switches().len(), 2);

        let connector = config.connector();
        assert!(format!("{connector:?}").contains("SshConnector"));
    }

    #[test]
    fn test_demo_config_parses() {
        let config = parse(include_str!("../../demos/network.toml")).unwrap();
        assert_eq!(config.devices().count(), 4);
        assert_eq!(config.intent().remote_router, lab_intent().remote_router);
    }

    #[test]
    fn test_load_missing_file() {
        let err = NetworkConfig::load("/nonexistent/segnet.toml").unwrap_err();
        assert!(matches!(err, crate::Error::Config(ConfigError::Read { .. })));
    }
}
