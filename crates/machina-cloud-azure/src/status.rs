//! Instance view to instance status mapping
//!
//! Azure reports a list of status entries per VM. A settled VM has two: the
//! provisioning state followed by the power state. A VM that is still being
//! provisioned or torn down reports only the provisioning state, so fewer
//! than two entries are read as "in flight". That reading is an observation
//! of how ARM behaves, not something the API documents.

use crate::models::InstanceView;
use machina_cloud::InstanceStatus;
use tracing::warn;

pub fn instance_status(view: &InstanceView) -> InstanceStatus {
    let statuses = match view.statuses.as_deref() {
        Some(statuses) if !statuses.is_empty() => statuses,
        _ => return InstanceStatus::Unknown,
    };

    if statuses.len() < 2 {
        return match statuses[0].code.as_deref() {
            Some("ProvisioningState/deleting") => InstanceStatus::Deleting,
            Some("ProvisioningState/creating") => InstanceStatus::Creating,
            None | Some("") => {
                warn!("Azure provisioning status has no code");
                InstanceStatus::Unknown
            }
            Some(code) => {
                warn!(code, "Unknown Azure provisioning status");
                InstanceStatus::Unknown
            }
        };
    }

    match statuses[1].code.as_deref() {
        Some("PowerState/running") => InstanceStatus::Running,
        Some("PowerState/starting") => InstanceStatus::Creating,
        None | Some("") => {
            warn!("Azure power status has no code");
            InstanceStatus::Unknown
        }
        Some(code) => {
            warn!(code, "Unknown Azure power status");
            InstanceStatus::Unknown
        }
    }
}
