//! Edge router plan (RouterOS syntax).
//!
//! Order: sub-interface and address per routed VLAN, then masquerade rules,
//! then DHCP pool/server/network per leasing VLAN. NAT and DHCP reference
//! the sub-interfaces by name, so those come first.

use super::PlanBuilder;
use crate::model::{CommandStep, NetworkIntent, RoutedVlan, StepKind};

/// Plan builder for [`DeviceRole::EdgeRouter`](crate::model::DeviceRole::EdgeRouter).
pub struct EdgeRouterPlan;

/// Sub-interface name for a routed VLAN: the VLAN's name from the table.
fn interface_name(intent: &NetworkIntent, routed: &RoutedVlan) -> String {
    intent
        .vlan(routed.vlan)
        .map(|v| v.name.clone())
        .unwrap_or_else(|| format!("vlan{}", routed.vlan))
}

impl PlanBuilder for EdgeRouterPlan {
    fn build(&self, intent: &NetworkIntent) -> Vec<CommandStep> {
        let edge = &intent.edge_router;
        let mut steps = Vec::new();

        for routed in &edge.routed_vlans {
            let name = interface_name(intent, routed);
            steps.push(CommandStep::new(
                format!("vlan interface {name}"),
                StepKind::SubInterface { vlan: routed.vlan },
                format!(
                    "/interface vlan add name={name} vlan-id={} interface={}",
                    routed.vlan, edge.parent_interface
                ),
            ));
            steps.push(CommandStep::new(
                format!("address {} on {name}", routed.gateway),
                StepKind::Address { vlan: routed.vlan },
                format!("/ip address add address={} interface={name}", routed.gateway),
            ));
        }

        for routed in edge.routed_vlans.iter().filter(|r| r.nat) {
            let name = interface_name(intent, routed);
            let subnet = routed.gateway.network();
            steps.push(CommandStep::new(
                format!("NAT {name}"),
                StepKind::Masquerade { subnet },
                format!(
                    "/ip firewall nat add chain=srcnat src-address={subnet} action=masquerade comment=\"NAT {name}\""
                ),
            ));
        }

        for routed in &edge.routed_vlans {
            let Some(ref dhcp) = routed.dhcp else {
                continue;
            };
            let name = interface_name(intent, routed);
            let slug = name.to_lowercase();
            let pool = format!("pool_{slug}");
            let server = format!("dhcp_{slug}");

            steps.push(CommandStep::new(
                format!("DHCP pool {pool}"),
                StepKind::DhcpPool { vlan: routed.vlan },
                format!(
                    "/ip pool add name={pool} ranges={}-{}",
                    dhcp.range_start, dhcp.range_end
                ),
            ));
            steps.push(CommandStep::new(
                format!("DHCP server {server}"),
                StepKind::DhcpServer { vlan: routed.vlan },
                format!(
                    "/ip dhcp-server add name={server} interface={name} address-pool={pool} lease-time={} disabled=no",
                    dhcp.lease_time
                ),
            ));
            steps.push(CommandStep::new(
                format!("DHCP network {}", routed.gateway.network()),
                StepKind::DhcpNetwork { vlan: routed.vlan },
                format!(
                    "/ip dhcp-server network add address={} gateway={} dns-server={}",
                    routed.gateway.network(),
                    routed.gateway.address(),
                    dhcp.dns_server
                ),
            ));
        }

        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::fixtures::lab_intent;

    fn all_commands(plan: &[CommandStep]) -> Vec<String> {
        plan.iter().flat_map(|s| s.commands().to_vec()).collect()
    }

    #[test]
    fn test_lab_edge_router_plan() {
        let plan = EdgeRouterPlan.build(&lab_intent());
        assert_eq!(
            all_commands(&plan),
            vec![
                "/interface vlan add name=Ventas vlan-id=250 interface=ether2",
                "/ip address add address=10.10.14.33/27 interface=Ventas",
                "/interface vlan add name=Tecnica vlan-id=251 interface=ether2",
                "/ip address add address=10.10.14.65/28 interface=Tecnica",
                "/interface vlan add name=Visitantes vlan-id=252 interface=ether2",
                "/ip address add address=10.10.14.81/29 interface=Visitantes",
                "/ip firewall nat add chain=srcnat src-address=10.10.14.32/27 action=masquerade comment=\"NAT Ventas\"",
                "/ip firewall nat add chain=srcnat src-address=10.10.14.64/28 action=masquerade comment=\"NAT Tecnica\"",
                "/ip pool add name=pool_ventas ranges=10.10.14.34-10.10.14.60",
                "/ip dhcp-server add name=dhcp_ventas interface=Ventas address-pool=pool_ventas lease-time=1h disabled=no",
                "/ip dhcp-server network add address=10.10.14.32/27 gateway=10.10.14.33 dns-server=8.8.8.8",
            ]
        );
    }

    #[test]
    fn test_sections_ordered() {
        let plan = EdgeRouterPlan.build(&lab_intent());
        let last_address = plan
            .iter()
            .rposition(|s| matches!(s.kind(), StepKind::Address { .. }))
            .unwrap();
        let first_nat = plan
            .iter()
            .position(|s| matches!(s.kind(), StepKind::Masquerade { .. }))
            .unwrap();
        let last_nat = plan
            .iter()
            .rposition(|s| matches!(s.kind(), StepKind::Masquerade { .. }))
            .unwrap();
        let first_dhcp = plan
            .iter()
            .position(|s| matches!(s.kind(), StepKind::DhcpPool { .. }))
            .unwrap();
        assert!(last_address < first_nat);
        assert!(last_nat < first_dhcp);
    }

    #[test]
    fn test_empty_intent_builds_empty_plan() {
        let mut intent = lab_intent();
        intent.edge_router.routed_vlans.clear();
        assert!(EdgeRouterPlan.build(&intent).is_empty());
    }
}
