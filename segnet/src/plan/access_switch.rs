//! Access switch plan (Cisco IOS syntax).
//!
//! Order: every VLAN declaration, then every access-port binding, then the
//! single trunk step. Some IOS releases reject `switchport trunk allowed
//! vlan` for a VLAN that has not been declared yet.

use super::PlanBuilder;
use crate::model::{CommandStep, NetworkIntent, StepKind};

/// Plan builder for [`DeviceRole::AccessSwitch`](crate::model::DeviceRole::AccessSwitch).
pub struct AccessSwitchPlan;

impl PlanBuilder for AccessSwitchPlan {
    fn build(&self, intent: &NetworkIntent) -> Vec<CommandStep> {
        let declarations = intent.vlans.iter().map(|vlan| {
            CommandStep::new(
                format!("VLAN {}", vlan.id),
                StepKind::DeclareVlan { vlan: vlan.id },
                format!("vlan {}", vlan.id),
            )
            .then(format!("name {}", vlan.name))
        });

        let bindings = intent.vlans.iter().flat_map(|vlan| {
            vlan.ports.iter().map(move |port| {
                CommandStep::new(
                    format!("interface {port}"),
                    StepKind::BindAccessPort {
                        port: port.clone(),
                        vlan: vlan.id,
                    },
                    format!("interface {port}"),
                )
                .then("switchport mode access")
                .then(format!("switchport access vlan {}", vlan.id))
                .then("no shutdown")
            })
        });

        let trunk = &intent.trunk;
        let trunk_step = CommandStep::new(
            format!("trunk {}", trunk.interface),
            StepKind::Trunk {
                interface: trunk.interface.clone(),
                allowed: trunk.allowed.iter().copied().collect(),
            },
            format!("interface {}", trunk.interface),
        )
        .then("switchport mode trunk")
        .then(format!("switchport trunk allowed vlan {}", trunk.allowed_list()))
        .then("no shutdown");

        declarations
            .chain(bindings)
            .chain(std::iter::once(trunk_step))
            .collect()
    }
}
