use santa_common::{Keyed, Notification, NotificationStatus, UserId};
use tracing::debug;

use crate::error::{SantaError, SantaResult};
use crate::{paths, State};

/// The caller's notifications, newest first.
pub fn list(state: &State, recipient: &UserId) -> SantaResult<Vec<Keyed<Notification>>> {
    Ok(state
        .store()
        .children::<Notification>(&paths::notifications_of(recipient)?)?
        .into_iter()
        .rev()
        .map(|(id, value)| Keyed { id, value })
        .collect())
}

pub fn mark_read(state: &State, recipient: &UserId, key: &str) -> SantaResult<()> {
    let path = paths::notification(recipient, key)?;
    if !state.store().exists(&path)? {
        return Err(SantaError::NotFound(format!("notification {key}")));
    }
    state.store().set(path.child("status")?, NotificationStatus::Read)?;
    debug!(recipient = %recipient, key, "notification read");
    Ok(())
}
