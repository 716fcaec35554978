//! Friend requests and the mirrored relationship records behind them.
//!
//! Each connection is stored twice, once under each user, and both copies
//! are always written in the same batch:
//!
//! | step    | requester side | target side |
//! |---------|----------------|-------------|
//! | request | `sent`         | `pending`   |
//! | accept  | `accepted`     | `accepted`  |
//! | decline | removed        | removed     |

use chrono::Utc;
use santa_common::keys::{iso_timestamp, timestamp_key};
use santa_common::views::FriendPartitions;
use santa_common::{Identity, Notification, RelationshipRecord, RelationshipStatus, UserId};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{SantaError, SantaResult};
use crate::store::{decode_children, Subscription, Update};
use crate::{paths, users, State};

pub async fn send_request(state: &State, requester: &Identity, target: &UserId) -> SantaResult<()> {
    if &requester.uid == target {
        warn!(uid = %requester.uid, "friend request to self");
        return Err(SantaError::SelfRequest);
    }
    let _guard = state.lock_relationships().await;

    let mut target_profile = users::profile(state, target)?;
    if state.store().exists(&paths::relationship(&requester.uid, target)?)? {
        warn!(from = %requester.uid, to = %target, "duplicate friend request");
        return Err(SantaError::DuplicateRequest);
    }

    let now = iso_timestamp(Utc::now());
    let requester_profile = requester.profile(&now);
    target_profile.last_updated = now.clone();

    let update = Update::default()
        .set(paths::user(&requester.uid)?, &requester_profile)?
        .set(paths::user(target)?, &target_profile)?
        .set(
            paths::relationship(&requester.uid, target)?,
            RelationshipRecord::describing(&target_profile, RelationshipStatus::Sent, &now),
        )?
        .set(
            paths::relationship(target, &requester.uid)?,
            RelationshipRecord::describing(&requester_profile, RelationshipStatus::Pending, &now),
        )?;
    state.store().apply(update)?;
    info!(from = %requester.uid, to = %target, "friend request sent");
    Ok(())
}

pub async fn accept(state: &State, accepter: &Identity, requester: &UserId) -> SantaResult<()> {
    let _guard = state.lock_relationships().await;

    let requester_profile =
        users::find_profile(state, requester)?.ok_or_else(|| SantaError::MissingProfile(requester.clone()))?;
    if !has_status(state, &accepter.uid, requester, RelationshipStatus::Pending)? {
        return Err(SantaError::NoPendingRequest(requester.clone()));
    }

    let at = Utc::now();
    let now = iso_timestamp(at);
    let update = Update::default()
        .set(
            paths::relationship(&accepter.uid, requester)?,
            RelationshipRecord::describing(&requester_profile, RelationshipStatus::Accepted, &now),
        )?
        .set(
            paths::relationship(requester, &accepter.uid)?,
            RelationshipRecord::describing(&accepter.profile(&now), RelationshipStatus::Accepted, &now),
        )?
        .set(
            paths::notification(requester, &timestamp_key(at))?,
            Notification::friend_accepted(accepter, &now),
        )?;
    state.store().apply(update)?;
    info!(accepter = %accepter.uid, requester = %requester, "friend request accepted");
    Ok(())
}

pub async fn decline(state: &State, decliner: &UserId, requester: &UserId) -> SantaResult<()> {
    let _guard = state.lock_relationships().await;
    if !has_status(state, decliner, requester, RelationshipStatus::Pending)? {
        return Err(SantaError::NoPendingRequest(requester.clone()));
    }
    remove_pair(state, decliner, requester)?;
    info!(decliner = %decliner, requester = %requester, "friend request declined");
    Ok(())
}

pub async fn unfriend(state: &State, user: &UserId, friend: &UserId) -> SantaResult<()> {
    let _guard = state.lock_relationships().await;
    if !has_status(state, user, friend, RelationshipStatus::Accepted)? {
        return Err(SantaError::NotFriends(friend.clone()));
    }
    remove_pair(state, user, friend)?;
    info!(user = %user, friend = %friend, "unfriended");
    Ok(())
}

/// `viewer`'s side of the relationship with `other`, if any.
pub fn status(state: &State, viewer: &UserId, other: &UserId) -> SantaResult<Option<RelationshipStatus>> {
    let record: Option<RelationshipRecord> = state.store().get_as(&paths::relationship(viewer, other)?)?;
    Ok(record.map(|r| r.status))
}

pub fn partitions(state: &State, uid: &UserId) -> SantaResult<FriendPartitions> {
    Ok(partitions_from_snapshot(state.store().get(&paths::friends_of(uid)?)?))
}

pub fn partitions_from_snapshot(snapshot: Value) -> FriendPartitions {
    FriendPartitions::from_records(decode_children::<RelationshipRecord>(snapshot).into_values())
}

pub fn accepted_friends(state: &State, uid: &UserId) -> SantaResult<Vec<RelationshipRecord>> {
    Ok(partitions(state, uid)?.friends)
}

pub fn subscribe(state: &State, uid: &UserId) -> SantaResult<Subscription> {
    Ok(state.store().subscribe(paths::friends_of(uid)?))
}

fn has_status(state: &State, owner: &UserId, other: &UserId, expected: RelationshipStatus) -> SantaResult<bool> {
    let found = status(state, owner, other)?;
    if found != Some(expected) {
        warn!(owner = %owner, other = %other, ?found, ?expected, "relationship not in expected state");
        return Ok(false);
    }
    Ok(true)
}

fn remove_pair(state: &State, a: &UserId, b: &UserId) -> SantaResult<()> {
    let update = Update::default()
        .remove(paths::relationship(a, b)?)
        .remove(paths::relationship(b, a)?);
    state.store().apply(update)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{befriend, identity, signed_in, state};
    use santa_common::{Notification, NotificationKind};

    fn record(state: &State, owner: &str, other: &str) -> Option<RelationshipRecord> {
        state
            .store()
            .get_as(&paths::relationship(&owner.into(), &other.into()).unwrap())
            .unwrap()
    }

    #[tokio::test]
    async fn request_mirrors_sent_and_pending() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let bob = signed_in(&state, "u2", "Bob");

        send_request(&state, &alice, &bob.uid).await.unwrap();

        let outgoing = record(&state, "u1", "u2").unwrap();
        assert_eq!(outgoing.status, RelationshipStatus::Sent);
        assert_eq!(outgoing.display_name, "Bob");
        let incoming = record(&state, "u2", "u1").unwrap();
        assert_eq!(incoming.status, RelationshipStatus::Pending);
        assert_eq!(incoming.uid, alice.uid);
    }

    #[tokio::test]
    async fn request_to_self_is_refused() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let err = send_request(&state, &alice, &alice.uid).await.unwrap_err();
        assert!(matches!(err, SantaError::SelfRequest));
        assert!(record(&state, "u1", "u1").is_none());
    }

    #[tokio::test]
    async fn request_to_unknown_user_writes_nothing() {
        let state = state();
        let alice = identity("u1", "Alice");
        let err = send_request(&state, &alice, &"u2".into()).await.unwrap_err();
        assert_eq!(err.to_string(), "User hasn't used the app yet");
        assert_eq!(state.store().get(&paths::friends_of(&alice.uid).unwrap()).unwrap(), Value::Null);
        assert!(users::find_profile(&state, &alice.uid).unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_request_leaves_records_unchanged() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let bob = signed_in(&state, "u2", "Bob");
        send_request(&state, &alice, &bob.uid).await.unwrap();
        let before = (record(&state, "u1", "u2"), record(&state, "u2", "u1"));

        let err = send_request(&state, &alice, &bob.uid).await.unwrap_err();
        assert!(matches!(err, SantaError::DuplicateRequest));
        assert_eq!((record(&state, "u1", "u2"), record(&state, "u2", "u1")), before);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_admit_only_one() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        signed_in(&state, "u2", "Bob");
        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                let alice = alice.clone();
                tokio::spawn(async move { send_request(&state, &alice, &"u2".into()).await })
            })
            .collect();
        let mut accepted = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(()) => accepted += 1,
                Err(err) => assert!(matches!(err, SantaError::DuplicateRequest)),
            }
        }
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn accept_marks_both_sides_and_notifies_requester() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let bob = signed_in(&state, "u2", "Bob");
        send_request(&state, &alice, &bob.uid).await.unwrap();

        accept(&state, &bob, &alice.uid).await.unwrap();

        assert_eq!(record(&state, "u1", "u2").unwrap().status, RelationshipStatus::Accepted);
        assert_eq!(record(&state, "u2", "u1").unwrap().status, RelationshipStatus::Accepted);
        let notes = state
            .store()
            .children::<Notification>(&paths::notifications_of(&alice.uid).unwrap())
            .unwrap();
        assert_eq!(notes.len(), 1);
        let note = notes.values().next().unwrap();
        assert_eq!(note.kind, NotificationKind::FriendAccepted);
        assert_eq!(note.from, bob.uid);
        assert_eq!(note.from_name, "Bob");
    }

    #[tokio::test]
    async fn accept_without_requester_profile_changes_nothing() {
        let state = state();
        let bob = signed_in(&state, "u2", "Bob");
        let err = accept(&state, &bob, &"u1".into()).await.unwrap_err();
        assert!(matches!(err, SantaError::MissingProfile(_)));
        assert!(partitions(&state, &bob.uid).unwrap().is_empty());
    }

    #[tokio::test]
    async fn accept_requires_pending_request() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let bob = signed_in(&state, "u2", "Bob");
        send_request(&state, &alice, &bob.uid).await.unwrap();

        // the requester cannot accept their own outgoing request
        let err = accept(&state, &alice, &bob.uid).await.unwrap_err();
        assert!(matches!(err, SantaError::NoPendingRequest(_)));
        assert_eq!(record(&state, "u1", "u2").unwrap().status, RelationshipStatus::Sent);
    }

    #[tokio::test]
    async fn decline_removes_both_sides_without_notification() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let bob = signed_in(&state, "u2", "Bob");
        send_request(&state, &alice, &bob.uid).await.unwrap();

        decline(&state, &bob.uid, &alice.uid).await.unwrap();

        assert!(record(&state, "u1", "u2").is_none());
        assert!(record(&state, "u2", "u1").is_none());
        assert_eq!(state.store().get(&paths::notifications_of(&alice.uid).unwrap()).unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn unfriend_requires_accepted_relationship() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let bob = signed_in(&state, "u2", "Bob");
        send_request(&state, &alice, &bob.uid).await.unwrap();
        assert!(matches!(
            unfriend(&state, &alice.uid, &bob.uid).await.unwrap_err(),
            SantaError::NotFriends(_)
        ));

        accept(&state, &bob, &alice.uid).await.unwrap();
        unfriend(&state, &alice.uid, &bob.uid).await.unwrap();
        assert!(record(&state, "u1", "u2").is_none());
        assert!(record(&state, "u2", "u1").is_none());
    }

    #[tokio::test]
    async fn partitions_follow_status() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let bob = signed_in(&state, "u2", "Bob");
        let carol = signed_in(&state, "u3", "Carol");
        let dave = signed_in(&state, "u4", "Dave");
        befriend(&state, &alice, &bob).await;
        send_request(&state, &alice, &carol.uid).await.unwrap();
        send_request(&state, &dave, &alice.uid).await.unwrap();

        let view = partitions(&state, &alice.uid).unwrap();
        assert_eq!(view.friends.iter().map(|r| r.uid.0.as_str()).collect::<Vec<_>>(), ["u2"]);
        assert_eq!(view.sent.iter().map(|r| r.uid.0.as_str()).collect::<Vec<_>>(), ["u3"]);
        assert_eq!(view.pending.iter().map(|r| r.uid.0.as_str()).collect::<Vec<_>>(), ["u4"]);
        assert_eq!(status(&state, &alice.uid, &carol.uid).unwrap(), Some(RelationshipStatus::Sent));
        assert_eq!(status(&state, &carol.uid, &dave.uid).unwrap(), None);
    }

    #[tokio::test]
    async fn subscription_sees_incoming_request() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let bob = signed_in(&state, "u2", "Bob");
        let mut live = subscribe(&state, &bob.uid).unwrap();
        assert!(partitions_from_snapshot(live.next().await.unwrap()).is_empty());

        send_request(&state, &alice, &bob.uid).await.unwrap();
        let view = partitions_from_snapshot(live.next().await.unwrap());
        assert_eq!(view.pending.len(), 1);
        assert_eq!(view.pending[0].uid, alice.uid);
        live.cancel();
    }
}
