//! Network intent and plan data types.
//!
//! Everything here is immutable once built: device descriptors and intent
//! come from the config file, command steps from the plan builders.

use std::collections::BTreeSet;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::platform::Dialect;

/// What a device does in the network; selects its plan builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    /// Layer-2 switch with access ports and a trunk uplink.
    AccessSwitch,
    /// Primary router: VLAN sub-interfaces, NAT, DHCP.
    EdgeRouter,
    /// Secondary router reaching the VLAN subnets through the edge router.
    RemoteRouter,
}

impl fmt::Display for DeviceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DeviceRole::AccessSwitch => "access switch",
            DeviceRole::EdgeRouter => "edge router",
            DeviceRole::RemoteRouter => "remote router",
        })
    }
}

/// A manageable device from the inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Inventory name, unique across the network.
    pub name: String,

    /// Role of the device.
    pub role: DeviceRole,

    /// Management address (IP or hostname).
    pub address: String,

    /// SSH port.
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// CLI dialect spoken by the device.
    pub dialect: Dialect,
}

fn default_ssh_port() -> u16 {
    22
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}

/// A VLAN and the access ports bound to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanDefinition {
    /// 802.1Q id, unique across the network.
    pub id: u16,

    /// Human name, also used as the router sub-interface name.
    pub name: String,

    /// Switch ports placed in access mode on this VLAN.
    #[serde(default)]
    pub ports: Vec<String>,
}

/// Uplink trunk interface and the VLAN ids allowed across it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrunkPolicy {
    /// Uplink interface identifier.
    pub interface: String,

    /// Allowed VLAN ids, VLAN table plus reserved ids.
    pub allowed: BTreeSet<u16>,
}

impl TrunkPolicy {
    /// Derive the policy from the VLAN table and the reserved/native ids.
    pub fn derive(interface: impl Into<String>, vlans: &[VlanDefinition], reserved: &[u16]) -> Self {
        let allowed = vlans
            .iter()
            .map(|v| v.id)
            .chain(reserved.iter().copied())
            .collect();
        Self {
            interface: interface.into(),
            allowed,
        }
    }

    /// Whether every VLAN in the table may cross the trunk.
    pub fn covers(&self, vlans: &[VlanDefinition]) -> bool {
        vlans.iter().all(|v| self.allowed.contains(&v.id))
    }

    /// Allowed ids in ascending order, comma-joined.
    pub fn allowed_list(&self) -> String {
        self.allowed
            .iter()
            .map(u16::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// An IPv4 network in CIDR form, host bits zero (`10.10.14.32/27`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Network {
    address: Ipv4Addr,
    prefix: u8,
}

/// An interface address with its prefix length (`10.10.14.33/27`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Interface {
    address: Ipv4Addr,
    prefix: u8,
}

fn parse_cidr(s: &str) -> Result<(Ipv4Addr, u8), ConfigError> {
    let invalid = || ConfigError::Invalid(format!("'{s}' is not an IPv4 address/prefix"));
    let (addr, prefix) = s.split_once('/').ok_or_else(invalid)?;
    let address = addr.trim().parse::<Ipv4Addr>().map_err(|_| invalid())?;
    let prefix = prefix.trim().parse::<u8>().map_err(|_| invalid())?;
    if prefix > 32 {
        return Err(invalid());
    }
    Ok((address, prefix))
}

fn mask(prefix: u8) -> u32 {
    u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0)
}

impl Ipv4Network {
    /// Build a network, zeroing any host bits.
    pub fn new(address: Ipv4Addr, prefix: u8) -> Self {
        let prefix = prefix.min(32);
        Self {
            address: Ipv4Addr::from(u32::from(address) & mask(prefix)),
            prefix,
        }
    }

    /// Network address.
    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    /// Prefix length.
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Whether `ip` lies inside this network.
    pub fn contains(&self, ip: Ipv4Addr) -> bool {
        u32::from(ip) & mask(self.prefix) == u32::from(self.address)
    }
}

impl FromStr for Ipv4Network {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, prefix) = parse_cidr(s)?;
        let network = Self::new(address, prefix);
        if network.address != address {
            return Err(ConfigError::Invalid(format!(
                "'{s}' has host bits set (network is {network})"
            )));
        }
        Ok(network)
    }
}

impl Ipv4Interface {
    /// Interface address.
    pub fn address(&self) -> Ipv4Addr {
        self.address
    }

    /// The network this address belongs to.
    pub fn network(&self) -> Ipv4Network {
        Ipv4Network::new(self.address, self.prefix)
    }
}

impl FromStr for Ipv4Interface {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, prefix) = parse_cidr(s)?;
        Ok(Self { address, prefix })
    }
}

macro_rules! cidr_string_conversions {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}/{}", self.address, self.prefix)
            }
        }

        impl TryFrom<String> for $ty {
            type Error = ConfigError;

            fn try_from(s: String) -> Result<Self, Self::Error> {
                s.parse()
            }
        }

        impl From<$ty> for String {
            fn from(value: $ty) -> String {
                value.to_string()
            }
        }
    };
}

cidr_string_conversions!(Ipv4Network);
cidr_string_conversions!(Ipv4Interface);

/// A DHCP lease pool served on a routed VLAN.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpPool {
    /// First leasable address.
    pub range_start: Ipv4Addr,

    /// Last leasable address.
    pub range_end: Ipv4Addr,

    /// Lease time in RouterOS notation.
    #[serde(default = "default_lease_time")]
    pub lease_time: String,

    /// DNS server handed out with leases.
    #[serde(default = "default_dns_server")]
    pub dns_server: Ipv4Addr,
}

fn default_lease_time() -> String {
    "1h".to_string()
}

fn default_dns_server() -> Ipv4Addr {
    Ipv4Addr::new(8, 8, 8, 8)
}

/// A VLAN routed by the edge router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutedVlan {
    /// VLAN id; must exist in the VLAN table.
    pub vlan: u16,

    /// Gateway address of the sub-interface.
    pub gateway: Ipv4Interface,

    /// Masquerade this subnet on the way out.
    #[serde(default)]
    pub nat: bool,

    /// Serve DHCP on this VLAN.
    #[serde(default)]
    pub dhcp: Option<DhcpPool>,
}

/// Routing intent for the edge router.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRouterIntent {
    /// Physical interface carrying the tagged VLANs.
    #[serde(default = "default_parent_interface")]
    pub parent_interface: String,

    /// VLANs to route, in configuration order.
    #[serde(default)]
    pub routed_vlans: Vec<RoutedVlan>,
}

fn default_parent_interface() -> String {
    "ether2".to_string()
}

/// Routing intent for remote routers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRouterIntent {
    /// The edge router address used as next hop.
    pub next_hop: Ipv4Addr,

    /// Subnets reached through the next hop.
    #[serde(default)]
    pub destinations: Vec<Ipv4Network>,
}

/// All static intent the plan builders draw from.
#[derive(Debug, Clone)]
pub struct NetworkIntent {
    /// VLAN table.
    pub vlans: Vec<VlanDefinition>,

    /// Trunk uplink policy.
    pub trunk: TrunkPolicy,

    /// Edge router intent.
    pub edge_router: EdgeRouterIntent,

    /// Remote router intent, if any remote router exists.
    pub remote_router: Option<RemoteRouterIntent>,
}

impl NetworkIntent {
    /// Look up a VLAN by id.
    pub fn vlan(&self, id: u16) -> Option<&VlanDefinition> {
        self.vlans.iter().find(|v| v.id == id)
    }
}

/// What a command step configures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// Declare a VLAN on a switch.
    DeclareVlan { vlan: u16 },
    /// Bind an access port to a VLAN.
    BindAccessPort { port: String, vlan: u16 },
    /// Configure the trunk uplink.
    Trunk { interface: String, allowed: Vec<u16> },
    /// Create a router VLAN sub-interface.
    SubInterface { vlan: u16 },
    /// Assign the gateway address to a sub-interface.
    Address { vlan: u16 },
    /// Source NAT for a subnet.
    Masquerade { subnet: Ipv4Network },
    /// DHCP address pool.
    DhcpPool { vlan: u16 },
    /// DHCP server on a sub-interface.
    DhcpServer { vlan: u16 },
    /// DHCP network options.
    DhcpNetwork { vlan: u16 },
    /// Static route towards the edge router.
    StaticRoute { destination: Ipv4Network },
}

/// One atomic unit of configuration: commands applied together.
///
/// Always holds at least one command; the constructor takes the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandStep {
    label: String,
    kind: StepKind,
    commands: Vec<String>,
}

impl CommandStep {
    /// Create a step with its first command.
    pub fn new(label: impl Into<String>, kind: StepKind, first: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind,
            commands: vec![first.into()],
        }
    }

    /// Append a command to the step.
    pub fn then(mut self, command: impl Into<String>) -> Self {
        self.commands.push(command.into());
        self
    }

    /// Human label used in reports and the audit log.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// What this step configures.
    pub fn kind(&self) -> &StepKind {
        &self.kind
    }

    /// Commands in send order.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }
}
