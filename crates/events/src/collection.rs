//! Item-level edits to list channels.
//!
//! `equipmentGroups`, `personnelLocations` and `issues` carry lists of
//! objects keyed by a string `"id"`. Editing one item through
//! [`BroadcastHub::modify`] leaves every other item as it currently is, so
//! an operator editing one group never overwrites a status the monitoring
//! engine has just written to another.

use opswatch_core::channel::Channel;
use opswatch_core::error::CoreError;
use opswatch_core::types::Version;
use serde_json::Value;

use crate::hub::{BroadcastHub, Writer};

/// Insert `item` under `id`, or replace the item already stored there.
///
/// Items keep their position; new items go to the end. An `"id"` in the
/// body must match `id`.
pub async fn upsert_item(
    hub: &BroadcastHub,
    channel: &Channel,
    id: &str,
    mut item: Value,
    writer: &Writer,
) -> Result<Version, CoreError> {
    ensure_keyed(channel)?;
    let Some(fields) = item.as_object_mut() else {
        return Err(CoreError::Validation(format!("{channel} items must be objects")));
    };
    match fields.get("id") {
        Some(Value::String(given)) if given != id => {
            return Err(CoreError::Validation(format!(
                "item id {given} does not match {id}"
            )));
        }
        Some(Value::String(_)) | None => {}
        Some(_) => return Err(CoreError::Validation("item id must be a string".into())),
    }
    fields.insert("id".into(), Value::String(id.to_string()));

    let version = hub
        .modify(channel, writer, |current| {
            let mut items = current.as_array().cloned().unwrap_or_default();
            match items.iter_mut().find(|existing| has_id(existing, id)) {
                Some(existing) => *existing = item,
                None => items.push(item),
            }
            Ok(Some(Value::Array(items)))
        })
        .await?
        .ok_or_else(|| CoreError::Internal("item upsert was dropped".into()))?;

    tracing::debug!(channel = %channel, item_id = id, version, "Channel item upserted");
    Ok(version)
}

/// Remove the item stored under `id`.
pub async fn remove_item(
    hub: &BroadcastHub,
    channel: &Channel,
    id: &str,
    writer: &Writer,
) -> Result<Version, CoreError> {
    ensure_keyed(channel)?;
    let version = hub
        .modify(channel, writer, |current| {
            let mut items = current.as_array().cloned().unwrap_or_default();
            let before = items.len();
            items.retain(|existing| !has_id(existing, id));
            if items.len() == before {
                return Err(CoreError::NotFound {
                    entity: "channel item",
                    id: id.to_string(),
                });
            }
            Ok(Some(Value::Array(items)))
        })
        .await?
        .ok_or_else(|| CoreError::Internal("item removal was dropped".into()))?;

    tracing::debug!(channel = %channel, item_id = id, version, "Channel item removed");
    Ok(version)
}

fn ensure_keyed(channel: &Channel) -> Result<(), CoreError> {
    match channel {
        Channel::EquipmentGroups | Channel::PersonnelLocations | Channel::Issues => Ok(()),
        other => Err(CoreError::Validation(format!(
            "{other} does not hold items keyed by id"
        ))),
    }
}

fn has_id(item: &Value, id: &str) -> bool {
    item.get("id").and_then(Value::as_str) == Some(id)
}
