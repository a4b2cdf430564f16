//! Equipment group records carried on the `equipmentGroups` channel.
//!
//! Only the fields the monitoring core reads or writes are typed; everything
//! else the dashboard stores on a record is kept in `extra` and written back
//! unchanged.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::Timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentGroup {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub services: Vec<EquipmentService>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentService {
    pub id: String,
    #[serde(default)]
    pub enclave: String,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_color: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<Timestamp>,
    #[serde(default)]
    pub history: Vec<ServiceStatusHistory>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EquipmentService {
    /// Human label used in event log categories, e.g. `"SIPR Email"`.
    pub fn label(&self) -> String {
        [self.enclave.as_str(), self.service_name.as_str()]
            .iter()
            .filter(|s| !s.is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A previous status of a service, newest first in `EquipmentService::history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatusHistory {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub timestamp: Option<Timestamp>,
}

/// Where a service lives and what it was before a status change.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceLocation {
    pub group_name: String,
    pub service_label: String,
    pub status: String,
}

/// Locate a service by id across all groups.
pub fn find_service(groups: &[EquipmentGroup], service_id: &str) -> Option<ServiceLocation> {
    groups.iter().find_map(|group| {
        group
            .services
            .iter()
            .find(|s| s.id == service_id)
            .map(|service| ServiceLocation {
                group_name: group.name.clone(),
                service_label: service.label(),
                status: service.status.clone(),
            })
    })
}

/// Set a service's status, pushing the previous status onto its history.
///
/// Returns the service's location and *previous* status when a change was
/// made, or `None` if the service does not exist or already has `status`.
pub fn apply_service_status(
    groups: &mut [EquipmentGroup],
    service_id: &str,
    status: &str,
    color: &str,
    at: Timestamp,
) -> Option<ServiceLocation> {
    for group in groups.iter_mut() {
        let Some(service) = group.services.iter_mut().find(|s| s.id == service_id) else {
            continue;
        };
        if service.status == status {
            return None;
        }

        let previous = ServiceStatusHistory {
            status: service.status.clone(),
            notes: service.notes.clone(),
            timestamp: service.last_updated,
        };
        service.history.insert(0, previous);

        let location = ServiceLocation {
            group_name: group.name.clone(),
            service_label: service.label(),
            status: std::mem::replace(&mut service.status, status.to_string()),
        };
        service.status_color = Some(color.to_string());
        service.last_updated = Some(at);
        return Some(location);
    }
    None
}
