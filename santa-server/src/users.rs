use santa_common::keys::now_iso;
use santa_common::{Identity, UserId, UserProfile};
use tracing::debug;

use crate::error::{SantaError, SantaResult};
use crate::{paths, State};

/// Overwrites the caller's profile snapshot. Called whenever a session loads.
pub fn ensure_profile(state: &State, identity: &Identity) -> SantaResult<UserProfile> {
    let profile = identity.profile(now_iso());
    state.store().set(paths::user(&identity.uid)?, &profile)?;
    debug!(uid = %identity.uid, "profile saved");
    Ok(profile)
}

pub fn find_profile(state: &State, uid: &UserId) -> SantaResult<Option<UserProfile>> {
    Ok(state.store().get_as(&paths::user(uid)?)?)
}

pub fn profile(state: &State, uid: &UserId) -> SantaResult<UserProfile> {
    find_profile(state, uid)?.ok_or_else(|| SantaError::UnknownUser(uid.clone()))
}
