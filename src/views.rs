use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Memory, RelationshipRecord, RelationshipStatus, TaggedFriend, UserId};

/// A user's relationship records split by status.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct FriendPartitions {
    pub friends: Vec<RelationshipRecord>,
    pub pending: Vec<RelationshipRecord>,
    pub sent: Vec<RelationshipRecord>,
}

impl FriendPartitions {
    pub fn from_records(records: impl IntoIterator<Item = RelationshipRecord>) -> Self {
        let mut partitions = Self::default();
        for record in records {
            match record.status {
                RelationshipStatus::Accepted => partitions.friends.push(record),
                RelationshipStatus::Pending => partitions.pending.push(record),
                RelationshipStatus::Sent => partitions.sent.push(record),
            }
        }
        partitions
    }

    pub fn is_empty(&self) -> bool {
        self.friends.is_empty() && self.pending.is_empty() && self.sent.is_empty()
    }
}

/// Which friends are ticked in the tagging dialog.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct TagSelection(BTreeSet<UserId>);

impl TagSelection {
    pub fn seeded_from(memory: &Memory) -> Self {
        Self(memory.tagged_friends.iter().map(|f| f.uid.clone()).collect())
    }

    /// Flips `uid` in or out of the selection; returns whether it is now selected.
    pub fn toggle(&mut self, uid: &UserId) -> bool {
        if self.0.remove(uid) {
            false
        } else {
            self.0.insert(uid.clone());
            true
        }
    }

    pub fn contains(&self, uid: &UserId) -> bool {
        self.0.contains(uid)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_vec(&self) -> Vec<UserId> {
        self.0.iter().cloned().collect()
    }
}

/// Accepted friends who may be tagged on a memory, and who already is.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct TagCandidates {
    pub friends: Vec<TaggedFriend>,
    pub selected: TagSelection,
}
