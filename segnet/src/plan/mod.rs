//! Configuration plan builders.
//!
//! A plan is the ordered list of [`CommandStep`]s applied to one device.
//! Plans are pure functions of the device role and the static
//! [`NetworkIntent`]: no I/O, no dependence on device state. Each role has
//! its own [`PlanBuilder`] variant.

mod access_switch;
mod edge_router;
mod remote_router;

pub use access_switch::AccessSwitchPlan;
pub use edge_router::EdgeRouterPlan;
pub use remote_router::RemoteRouterPlan;

use crate::model::{CommandStep, DeviceDescriptor, DeviceRole, NetworkIntent};

/// Builds the ordered configuration plan for one device role.
pub trait PlanBuilder: Send + Sync {
    /// Produce the steps to apply, in order.
    fn build(&self, intent: &NetworkIntent) -> Vec<CommandStep>;
}

/// Plan builder for a role.
pub fn builder_for(role: DeviceRole) -> &'static dyn PlanBuilder {
    match role {
        DeviceRole::AccessSwitch => &AccessSwitchPlan,
        DeviceRole::EdgeRouter => &EdgeRouterPlan,
        DeviceRole::RemoteRouter => &RemoteRouterPlan,
    }
}

/// Build the plan for a device.
pub fn build_plan(device: &DeviceDescriptor, intent: &NetworkIntent) -> Vec<CommandStep> {
    builder_for(device.role).build(intent)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::model::{
        DeviceDescriptor, DeviceRole, DhcpPool, EdgeRouterIntent, NetworkIntent,
        RemoteRouterIntent, RoutedVlan, TrunkPolicy, VlanDefinition,
    };
    use crate::platform::Dialect;

    pub fn vlan(id: u16, name: &str, ports: &[&str]) -> VlanDefinition {
        VlanDefinition {
            id,
            name: name.to_string(),
            ports: ports.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn device(name: &str, role: DeviceRole, address: &str) -> DeviceDescriptor {
        let dialect = match role {
            DeviceRole::AccessSwitch => Dialect::CiscoIos,
            _ => Dialect::MikrotikRouteros,
        };
        DeviceDescriptor {
            name: name.to_string(),
            role,
            address: address.to_string(),
            port: 22,
            dialect,
        }
    }

    /// The three-VLAN lab network.
    pub fn lab_intent() -> NetworkIntent {
        let vlans = vec![
            vlan(250, "Ventas", &["e0/1"]),
            vlan(251, "Tecnica", &["e0/3"]),
            vlan(252, "Visitantes", &["e1/1"]),
        ];
        let trunk = TrunkPolicy::derive("e0/0", &vlans, &[1499]);
        let edge_router = EdgeRouterIntent {
            parent_interface: "ether2".to_string(),
            routed_vlans: vec![
                RoutedVlan {
                    vlan: 250,
                    gateway: "10.10.14.33/27".parse().unwrap(),
                    nat: true,
                    dhcp: Some(DhcpPool {
                        range_start: "10.10.14.34".parse().unwrap(),
                        range_end: "10.10.14.60".parse().unwrap(),
                        lease_time: "1h".to_string(),
                        dns_server: "8.8.8.8".parse().unwrap(),
                    }),
                },
                RoutedVlan {
                    vlan: 251,
                    gateway: "10.10.14.65/28".parse().unwrap(),
                    nat: true,
                    dhcp: None,
                },
                RoutedVlan {
                    vlan: 252,
                    gateway: "10.10.14.81/29".parse().unwrap(),
                    nat: false,
                    dhcp: None,
                },
            ],
        };
        let remote_router = RemoteRouterIntent {
            next_hop: "10.10.14.1".parse().unwrap(),
            destinations: vec![
                "10.10.14.32/27".parse().unwrap(),
                "10.10.14.64/28".parse().unwrap(),
                "10.10.14.80/29".parse().unwrap(),
            ],
        };
        NetworkIntent {
            vlans,
            trunk,
            edge_router,
            remote_router: Some(remote_router),
        }
    }
}
