use santa_common::UserId;

use crate::store::{Result, StorePath};

pub const USERS: &str = "users";
pub const FRIENDS: &str = "friends";
pub const NOTIFICATIONS: &str = "notifications";
pub const MEMORIES: &str = "memories";
pub const WISHLISTS: &str = "wishlists";
pub const EVENTS: &str = "events";
pub const GROUPS: &str = "secretSantaGroups";

pub fn user(uid: &UserId) -> Result<StorePath> {
    StorePath::new([USERS, uid.as_ref()])
}

pub fn friends_of(owner: &UserId) -> Result<StorePath> {
    StorePath::new([FRIENDS, owner.as_ref()])
}

/// `owner`'s record describing `other`.
pub fn relationship(owner: &UserId, other: &UserId) -> Result<StorePath> {
    StorePath::new([FRIENDS, owner.as_ref(), other.as_ref()])
}

pub fn notifications_of(recipient: &UserId) -> Result<StorePath> {
    StorePath::new([NOTIFICATIONS, recipient.as_ref()])
}

pub fn notification(recipient: &UserId, key: &str) -> Result<StorePath> {
    StorePath::new([NOTIFICATIONS, recipient.as_ref(), key])
}

pub fn memories() -> Result<StorePath> {
    StorePath::new([MEMORIES])
}

pub fn memory(id: &str) -> Result<StorePath> {
    StorePath::new([MEMORIES, id])
}

pub fn wishlist_of(owner: &UserId) -> Result<StorePath> {
    StorePath::new([WISHLISTS, owner.as_ref()])
}

pub fn events_of(owner: &UserId) -> Result<StorePath> {
    StorePath::new([EVENTS, owner.as_ref()])
}

pub fn groups() -> Result<StorePath> {
    StorePath::new([GROUPS])
}

pub fn group(id: &str) -> Result<StorePath> {
    StorePath::new([GROUPS, id])
}
