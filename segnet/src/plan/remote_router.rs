//! Remote router plan: static routes to the VLAN subnets via the edge router.

use super::PlanBuilder;
use crate::model::{CommandStep, NetworkIntent, StepKind};

/// Plan builder for [`DeviceRole::RemoteRouter`](crate::model::DeviceRole::RemoteRouter).
pub struct RemoteRouterPlan;

impl PlanBuilder for RemoteRouterPlan {
    fn build(&self, intent: &NetworkIntent) -> Vec<CommandStep> {
        let Some(ref remote) = intent.remote_router else {
            return Vec::new();
        };

        remote
            .destinations
            .iter()
            .map(|destination| {
                CommandStep::new(
                    format!("route {destination} via {}", remote.next_hop),
                    StepKind::StaticRoute {
                        destination: *destination,
                    },
                    format!(
                        "/ip route add dst-address={destination} gateway={}",
                        remote.next_hop
                    ),
                )
            })
            .collect()
    }
}
