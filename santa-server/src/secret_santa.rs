use std::collections::BTreeMap;

use chrono::Utc;
use santa_common::keys::iso_timestamp;
use santa_common::{GroupId, GroupListing, GroupStatus, Identity, NewGroup, SecretSantaGroup, UserId};
use serde_json::Value;
use tracing::info;

use crate::error::{SantaError, SantaResult};
use crate::store::{decode_children, Subscription, Update};
use crate::{paths, State};

pub fn create(state: &State, creator: &Identity, group: NewGroup) -> SantaResult<GroupId> {
    if group.name.trim().is_empty() {
        return Err(SantaError::Validation("Group name is required".to_string()));
    }
    let record = SecretSantaGroup {
        details: group,
        creator: creator.uid.clone(),
        creator_name: creator.display_name.clone(),
        participants: BTreeMap::from([(creator.uid.0.clone(), creator.uid.clone())]),
        participant_names: BTreeMap::from([(creator.uid.0.clone(), creator.display_name.clone())]),
        created: iso_timestamp(Utc::now()),
        status: GroupStatus::Open,
    };
    let id = state.store().push(&paths::groups()?, &record)?;
    info!(creator = %creator.uid, group = %id, "group created");
    Ok(GroupId(id))
}

fn listing(id: String, group: SecretSantaGroup) -> GroupListing {
    GroupListing {
        id: GroupId(id),
        participant_count: group.participant_count(),
        group,
    }
}

pub fn get(state: &State, id: &GroupId) -> SantaResult<GroupListing> {
    let group: Option<SecretSantaGroup> = state.store().get_as(&paths::group(id.as_ref())?)?;
    group
        .map(|group| listing(id.0.clone(), group))
        .ok_or_else(|| SantaError::NotFound(format!("group {id}")))
}

/// Groups `member` takes part in.
pub fn list(state: &State, member: &UserId) -> SantaResult<Vec<GroupListing>> {
    Ok(list_from_snapshot(state.store().get(&paths::groups()?)?, member))
}

pub fn list_from_snapshot(snapshot: Value, member: &UserId) -> Vec<GroupListing> {
    decode_children::<SecretSantaGroup>(snapshot)
        .into_iter()
        .filter(|(_, group)| group.has_participant(member))
        .map(|(id, group)| listing(id, group))
        .collect()
}

pub fn subscribe(state: &State) -> SantaResult<Subscription> {
    Ok(state.store().subscribe(paths::groups()?))
}

pub async fn join(state: &State, member: &Identity, id: &GroupId) -> SantaResult<()> {
    let _guard = state.lock_groups().await;
    let group = paths::group(id.as_ref())?;
    if !state.store().exists(&group)? {
        return Err(SantaError::NotFound(format!("group {id}")));
    }
    let update = Update::default()
        .set(group.child("participants")?.child(&member.uid)?, &member.uid)?
        .set(group.child("participantNames")?.child(&member.uid)?, &member.display_name)?;
    state.store().apply(update)?;
    info!(member = %member.uid, group = %id, "joined group");
    Ok(())
}

pub async fn delete(state: &State, requester: &UserId, id: &GroupId) -> SantaResult<()> {
    let _guard = state.lock_groups().await;
    let group = get(state, id)?;
    if &group.group.creator != requester {
        return Err(SantaError::Forbidden);
    }
    state.store().remove(paths::group(id.as_ref())?)?;
    info!(group = %id, "group deleted");
    Ok(())
}
