use chrono::Utc;
use santa_common::keys::iso_timestamp;
use santa_common::{HolidayEvent, Keyed, NewHolidayEvent, UserId};
use serde_json::Value;
use tracing::info;

use crate::error::{SantaError, SantaResult};
use crate::store::{decode_children, Subscription};
use crate::{paths, State};

pub fn add(state: &State, owner: &UserId, event: NewHolidayEvent) -> SantaResult<String> {
    if event.title.trim().is_empty() {
        return Err(SantaError::Validation("Event title is required".to_string()));
    }
    let record = HolidayEvent {
        details: event,
        created: iso_timestamp(Utc::now()),
    };
    let id = state.store().push(&paths::events_of(owner)?, &record)?;
    info!(owner = %owner, event = %id, "event planned");
    Ok(id)
}

pub fn remove(state: &State, owner: &UserId, event_id: &str) -> SantaResult<()> {
    let path = paths::events_of(owner)?.child(event_id)?;
    if !state.store().exists(&path)? {
        return Err(SantaError::NotFound(format!("event {event_id}")));
    }
    state.store().remove(path)?;
    info!(owner = %owner, event = event_id, "event removed");
    Ok(())
}

/// Upcoming first, by date.
pub fn list(state: &State, owner: &UserId) -> SantaResult<Vec<Keyed<HolidayEvent>>> {
    Ok(list_from_snapshot(state.store().get(&paths::events_of(owner)?)?))
}

pub fn list_from_snapshot(snapshot: Value) -> Vec<Keyed<HolidayEvent>> {
    let mut events: Vec<Keyed<HolidayEvent>> = decode_children(snapshot)
        .into_iter()
        .map(|(id, value)| Keyed { id, value })
        .collect();
    events.sort_by(|a, b| a.value.details.date.cmp(&b.value.details.date));
    events
}

pub fn subscribe(state: &State, owner: &UserId) -> SantaResult<Subscription> {
    Ok(state.store().subscribe(paths::events_of(owner)?))
}
