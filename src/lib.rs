pub mod keys;
pub mod share;
pub mod views;

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Headers the upstream identity proxy sets on every request.
pub mod headers {
    pub const UID: &str = "x-santa-uid";
    pub const NAME: &str = "x-santa-name";
    pub const EMAIL: &str = "x-santa-email";
    pub const PHOTO: &str = "x-santa-photo";
}

macro_rules! id_type {
    ($name:ident) => {
        #[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Debug, Serialize, Deserialize, Default)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

id_type!(UserId);
id_type!(MemoryId);
id_type!(GroupId);

/// The signed-in user as handed over by the identity provider.
#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: UserId,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, rename = "photoURL")]
    pub photo_url: String,
}

impl Identity {
    pub fn profile(&self, last_updated: impl Into<String>) -> UserProfile {
        UserProfile {
            uid: self.uid.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            photo_url: self.photo_url.clone(),
            last_updated: last_updated.into(),
        }
    }
}

/// Snapshot stored at `users/{uid}`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: UserId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, rename = "photoURL")]
    pub photo_url: String,
    #[serde(default)]
    pub last_updated: String,
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipStatus {
    /// Outgoing request, waiting on the other side.
    Sent,
    /// Incoming request, actionable by the owner.
    Pending,
    Accepted,
}

/// One user's side of a friend connection, stored at `friends/{owner}/{other}`.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipRecord {
    pub uid: UserId,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, rename = "photoURL")]
    pub photo_url: String,
    pub status: RelationshipStatus,
    pub timestamp: String,
}

impl RelationshipRecord {
    /// Describes `other` as seen from the owner's side.
    pub fn describing(other: &UserProfile, status: RelationshipStatus, timestamp: impl Into<String>) -> Self {
        Self {
            uid: other.uid.clone(),
            email: other.email.clone(),
            display_name: other.display_name.clone(),
            photo_url: other.photo_url.clone(),
            status,
            timestamp: timestamp.into(),
        }
    }
}

#[derive(Eq, PartialEq, Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FriendAccepted,
    MemoryTag,
}

#[derive(Eq, PartialEq, Clone, Copy, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    #[default]
    Unread,
    Read,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub from: UserId,
    #[serde(default)]
    pub from_name: String,
    #[serde(default)]
    pub from_photo: String,
    #[serde(default)]
    pub status: NotificationStatus,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_id: Option<MemoryId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Notification {
    pub fn friend_accepted(accepter: &Identity, timestamp: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::FriendAccepted,
            from: accepter.uid.clone(),
            from_name: accepter.display_name.clone(),
            from_photo: accepter.photo_url.clone(),
            status: NotificationStatus::Unread,
            timestamp: timestamp.into(),
            memory_id: None,
            message: None,
        }
    }

    pub fn memory_tag(tagger: &Identity, memory: &MemoryId, timestamp: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::MemoryTag,
            from: tagger.uid.clone(),
            from_name: tagger.display_name.clone(),
            from_photo: tagger.photo_url.clone(),
            status: NotificationStatus::Unread,
            timestamp: timestamp.into(),
            memory_id: Some(memory.clone()),
            message: Some(format!("{} tagged you in a memory", tagger.display_name)),
        }
    }
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggedFriend {
    pub uid: UserId,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, rename = "photoURL")]
    pub photo_url: String,
}

impl From<&RelationshipRecord> for TaggedFriend {
    fn from(record: &RelationshipRecord) -> Self {
        Self {
            uid: record.uid.clone(),
            display_name: record.display_name.clone(),
            photo_url: record.photo_url.clone(),
        }
    }
}

/// A memory wall post, stored at `memories/{pushId}`.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub user_id: UserId,
    #[serde(default)]
    pub user_name: String,
    #[serde(default)]
    pub user_photo: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub timestamp: String,
    #[serde(default)]
    pub tagged_friends: Vec<TaggedFriend>,
}

impl Memory {
    pub fn is_tagged(&self, uid: &UserId) -> bool {
        self.tagged_friends.iter().any(|f| &f.uid == uid)
    }

    /// Owners and tagged friends may see a memory; nobody else.
    pub fn is_visible_to(&self, uid: &UserId) -> bool {
        &self.user_id == uid || self.is_tagged(uid)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct NewMemory {
    pub message: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct WishlistItem {
    pub name: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

#[derive(Eq, PartialEq, Clone, Copy, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    #[default]
    Party,
    Dinner,
    Activity,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct NewHolidayEvent {
    pub title: String,
    pub date: NaiveDate,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type", default)]
    pub kind: EventKind,
}

/// A planner entry, stored at `events/{uid}/{pushId}`.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct HolidayEvent {
    #[serde(flatten)]
    pub details: NewHolidayEvent,
    pub created: String,
}

#[derive(Eq, PartialEq, Clone, Copy, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroupTheme {
    #[default]
    Traditional,
    Funny,
    Handmade,
    Eco,
    Local,
}

#[derive(Eq, PartialEq, Clone, Copy, Debug, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    #[default]
    Open,
}

#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
pub struct NewGroup {
    pub name: String,
    pub budget: u32,
    pub date: NaiveDate,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub theme: GroupTheme,
}

/// A gift-exchange group, stored at `secretSantaGroups/{pushId}`.
#[derive(Clone, Debug, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretSantaGroup {
    #[serde(flatten)]
    pub details: NewGroup,
    pub creator: UserId,
    #[serde(default)]
    pub creator_name: String,
    #[serde(default)]
    pub participants: BTreeMap<String, UserId>,
    #[serde(default)]
    pub participant_names: BTreeMap<String, String>,
    pub created: String,
    #[serde(default)]
    pub status: GroupStatus,
}

impl SecretSantaGroup {
    pub fn has_participant(&self, uid: &UserId) -> bool {
        self.participants.contains_key(uid.as_ref())
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }
}

/// A stored record together with the key it lives under.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Keyed<T> {
    pub id: String,
    #[serde(flatten)]
    pub value: T,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupListing {
    pub id: GroupId,
    pub participant_count: usize,
    #[serde(flatten)]
    pub group: SecretSantaGroup,
}

/// Body of `POST /memories/{id}/tags`.
#[derive(Clone, Debug, Serialize, Deserialize, Default)]
pub struct TagRequest {
    pub friends: Vec<UserId>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Created {
    pub id: String,
}
