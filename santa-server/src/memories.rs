//! Memory wall posts and friend tagging.
//!
//! Memories live in one global collection. Every read goes through
//! [`Memory::is_visible_to`], so callers only ever receive posts they own or
//! are tagged in.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use santa_common::keys::{iso_timestamp, timestamp_key};
use santa_common::views::{TagCandidates, TagSelection};
use santa_common::{Identity, Keyed, Memory, MemoryId, NewMemory, Notification, TaggedFriend, UserId};
use serde_json::Value;
use tracing::info;

use crate::error::{SantaError, SantaResult};
use crate::store::{decode_children, Subscription, Update};
use crate::{friends, paths, State};

pub fn create(state: &State, author: &Identity, memory: NewMemory) -> SantaResult<MemoryId> {
    let message = memory.message.trim();
    if message.is_empty() {
        return Err(SantaError::Validation("A memory needs a message".to_string()));
    }
    let record = Memory {
        user_id: author.uid.clone(),
        user_name: author.display_name.clone(),
        user_photo: author.photo_url.clone(),
        message: message.to_string(),
        image_url: memory.image_url.filter(|url| !url.trim().is_empty()),
        timestamp: iso_timestamp(Utc::now()),
        tagged_friends: Vec::new(),
    };
    let id = state.store().push(&paths::memories()?, &record)?;
    info!(author = %author.uid, memory = %id, "memory shared");
    Ok(MemoryId(id))
}

/// Memories `viewer` may see, newest first.
pub fn visible(state: &State, viewer: &UserId) -> SantaResult<Vec<Keyed<Memory>>> {
    Ok(visible_from_snapshot(state.store().get(&paths::memories()?)?, viewer))
}

pub fn visible_from_snapshot(snapshot: Value, viewer: &UserId) -> Vec<Keyed<Memory>> {
    decode_children::<Memory>(snapshot)
        .into_iter()
        .rev()
        .filter(|(_, memory)| memory.is_visible_to(viewer))
        .map(|(id, value)| Keyed { id, value })
        .collect()
}

pub fn subscribe(state: &State) -> SantaResult<Subscription> {
    Ok(state.store().subscribe(paths::memories()?))
}

/// A single memory. Memories the viewer may not see are reported as missing.
pub fn get(state: &State, viewer: &UserId, id: &MemoryId) -> SantaResult<Memory> {
    let memory: Option<Memory> = state.store().get_as(&paths::memory(id.as_ref())?)?;
    memory
        .filter(|memory| memory.is_visible_to(viewer))
        .ok_or_else(|| SantaError::NotFound(format!("memory {id}")))
}

fn owned(state: &State, owner: &UserId, id: &MemoryId) -> SantaResult<Memory> {
    let memory = get(state, owner, id)?;
    if &memory.user_id != owner {
        return Err(SantaError::Forbidden);
    }
    Ok(memory)
}

pub fn tag_candidates(state: &State, owner: &UserId, id: &MemoryId) -> SantaResult<TagCandidates> {
    let memory = owned(state, owner, id)?;
    let friends = friends::accepted_friends(state, owner)?
        .iter()
        .map(TaggedFriend::from)
        .collect();
    Ok(TagCandidates {
        friends,
        selected: TagSelection::seeded_from(&memory),
    })
}

/// Replaces the memory's tag list with `selection` and notifies friends who
/// were not tagged before. Friends left out are untagged silently.
pub async fn tag(
    state: &State,
    tagger: &Identity,
    id: &MemoryId,
    selection: &[UserId],
) -> SantaResult<Vec<TaggedFriend>> {
    // friendships must not change between the check and the write
    let _guard = state.lock_relationships().await;
    let memory = owned(state, &tagger.uid, id)?;
    let candidates: BTreeMap<UserId, TaggedFriend> = friends::accepted_friends(state, &tagger.uid)?
        .iter()
        .map(|record| (record.uid.clone(), TaggedFriend::from(record)))
        .collect();

    let selection: BTreeSet<&UserId> = selection.iter().collect();
    let tagged = selection
        .into_iter()
        .map(|uid| candidates.get(uid).cloned().ok_or_else(|| SantaError::NotFriends(uid.clone())))
        .collect::<SantaResult<Vec<_>>>()?;

    let at = Utc::now();
    let now = iso_timestamp(at);
    let memory_path = paths::memory(id.as_ref())?;
    let mut update = Update::default().set(memory_path.child("taggedFriends")?, &tagged)?;
    let mut notified = 0;
    for friend in tagged.iter().filter(|friend| !memory.is_tagged(&friend.uid)) {
        update = update.set(
            paths::notification(&friend.uid, &timestamp_key(at))?,
            Notification::memory_tag(tagger, id, &now),
        )?;
        notified += 1;
    }
    state.store().apply(update)?;
    info!(memory = %id, tagged = tagged.len(), notified, "memory tags updated");
    Ok(tagged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{befriend, signed_in, state};
    use santa_common::{Notification, NotificationKind};

    fn notifications(state: &State, uid: &str) -> Vec<Notification> {
        state
            .store()
            .children::<Notification>(&paths::notifications_of(&uid.into()).unwrap())
            .unwrap()
            .into_values()
            .collect()
    }

    fn post(state: &State, author: &Identity, message: &str) -> MemoryId {
        create(
            state,
            author,
            NewMemory {
                message: message.to_string(),
                image_url: Some(String::new()),
            },
        )
        .unwrap()
    }

    fn tagged_uids(state: &State, owner: &UserId, id: &MemoryId) -> BTreeSet<String> {
        get(state, owner, id)
            .unwrap()
            .tagged_friends
            .into_iter()
            .map(|f| f.uid.0)
            .collect()
    }

    #[test]
    fn create_rejects_blank_message() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let err = create(&state, &alice, NewMemory::default()).unwrap_err();
        assert!(matches!(err, SantaError::Validation(_)));
    }

    #[test]
    fn create_drops_empty_image_url() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let id = post(&state, &alice, "Hot cocoa");
        let memory = get(&state, &alice.uid, &id).unwrap();
        assert_eq!(memory.image_url, None);
        assert_eq!(memory.user_name, "Alice");
        assert!(memory.tagged_friends.is_empty());
    }

    #[tokio::test]
    async fn only_owner_and_tagged_friends_see_a_memory() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let bob = signed_in(&state, "u2", "Bob");
        let carol = signed_in(&state, "u3", "Carol");
        befriend(&state, &alice, &bob).await;
        let id = post(&state, &alice, "Tree lighting");

        assert!(visible(&state, &bob.uid).unwrap().is_empty());
        assert!(matches!(get(&state, &bob.uid, &id), Err(SantaError::NotFound(_))));

        tag(&state, &alice, &id, &[bob.uid.clone()]).await.unwrap();
        assert_eq!(visible(&state, &bob.uid).unwrap().len(), 1);
        assert!(visible(&state, &carol.uid).unwrap().is_empty());
    }

    #[tokio::test]
    async fn visible_lists_newest_first() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        post(&state, &alice, "first");
        post(&state, &alice, "second");
        let messages: Vec<String> = visible(&state, &alice.uid)
            .unwrap()
            .into_iter()
            .map(|m| m.value.message)
            .collect();
        assert_eq!(messages, ["second", "first"]);
    }

    #[tokio::test]
    async fn tagging_sets_exactly_the_selection_and_notifies() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let bob = signed_in(&state, "u2", "Bob");
        let carol = signed_in(&state, "u3", "Carol");
        befriend(&state, &alice, &bob).await;
        befriend(&state, &alice, &carol).await;
        let id = post(&state, &alice, "Gingerbread house");

        tag(&state, &alice, &id, &[carol.uid.clone(), bob.uid.clone(), bob.uid.clone()]).await.unwrap();

        assert_eq!(tagged_uids(&state, &alice.uid, &id), BTreeSet::from(["u2".to_string(), "u3".to_string()]));
        for uid in ["u2", "u3"] {
            let notes = notifications(&state, uid);
            assert_eq!(notes.len(), 1);
            assert_eq!(notes[0].kind, NotificationKind::MemoryTag);
            assert_eq!(notes[0].memory_id.as_ref(), Some(&id));
        }
    }

    #[tokio::test]
    async fn retagging_a_subset_untags_without_new_notifications() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let bob = signed_in(&state, "u2", "Bob");
        let carol = signed_in(&state, "u3", "Carol");
        befriend(&state, &alice, &bob).await;
        befriend(&state, &alice, &carol).await;
        let id = post(&state, &alice, "Caroling");
        tag(&state, &alice, &id, &[bob.uid.clone(), carol.uid.clone()]).await.unwrap();

        tag(&state, &alice, &id, &[bob.uid.clone()]).await.unwrap();

        assert_eq!(tagged_uids(&state, &alice.uid, &id), BTreeSet::from(["u2".to_string()]));
        assert_eq!(notifications(&state, "u2").len(), 1);
        assert_eq!(notifications(&state, "u3").len(), 1);
        assert!(matches!(get(&state, &carol.uid, &id), Err(SantaError::NotFound(_))));
    }

    #[tokio::test]
    async fn only_accepted_friends_can_be_tagged() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let bob = signed_in(&state, "u2", "Bob");
        crate::friends::send_request(&state, &alice, &bob.uid).await.unwrap();
        let id = post(&state, &alice, "Snow day");

        let err = tag(&state, &alice, &id, &[bob.uid.clone()]).await.unwrap_err();
        assert!(matches!(err, SantaError::NotFriends(_)));
        assert!(tagged_uids(&state, &alice.uid, &id).is_empty());
        assert!(notifications(&state, "u2").is_empty());
    }

    #[tokio::test]
    async fn tagged_friend_cannot_retag() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let bob = signed_in(&state, "u2", "Bob");
        befriend(&state, &alice, &bob).await;
        let id = post(&state, &alice, "Skating");
        tag(&state, &alice, &id, &[bob.uid.clone()]).await.unwrap();

        let err = tag(&state, &bob, &id, &[alice.uid.clone()]).await.unwrap_err();
        assert!(matches!(err, SantaError::Forbidden));
    }

    #[tokio::test]
    async fn candidates_are_accepted_friends_with_current_tags_selected() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let bob = signed_in(&state, "u2", "Bob");
        let carol = signed_in(&state, "u3", "Carol");
        let dave = signed_in(&state, "u4", "Dave");
        befriend(&state, &alice, &bob).await;
        befriend(&state, &alice, &carol).await;
        crate::friends::send_request(&state, &alice, &dave.uid).await.unwrap();
        let id = post(&state, &alice, "Cookies");
        tag(&state, &alice, &id, &[carol.uid.clone()]).await.unwrap();

        let candidates = tag_candidates(&state, &alice.uid, &id).unwrap();
        let uids: Vec<&str> = candidates.friends.iter().map(|f| f.uid.as_ref()).collect();
        assert_eq!(uids, ["u2", "u3"]);
        assert!(candidates.selected.contains(&carol.uid));
        assert_eq!(candidates.selected.len(), 1);
    }

    #[tokio::test]
    async fn subscription_filters_by_viewer() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let bob = signed_in(&state, "u2", "Bob");
        let mut live = subscribe(&state).unwrap();
        assert!(visible_from_snapshot(live.next().await.unwrap(), &bob.uid).is_empty());

        post(&state, &alice, "Secret");
        let snapshot = live.next().await.unwrap();
        assert!(visible_from_snapshot(snapshot.clone(), &bob.uid).is_empty());
        assert_eq!(visible_from_snapshot(snapshot, &alice.uid).len(), 1);
    }

    #[tokio::test]
    async fn tagging_waits_for_pending_unfriend() {
        let state = state();
        let alice = signed_in(&state, "u1", "Alice");
        let bob = signed_in(&state, "u2", "Bob");
        befriend(&state, &alice, &bob).await;
        let id = post(&state, &alice, "Sledding");

        let guard = state.lock_relationships().await;
        let tagging = tokio::spawn({
            let (state, alice, id, bob) = (state.clone(), alice.clone(), id.clone(), bob.uid.clone());
            async move { tag(&state, &alice, &id, &[bob]).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!tagging.is_finished());
        // the unfriend commits while the tag is still queued
        let update = Update::default()
            .remove(paths::relationship(&alice.uid, &bob.uid).unwrap())
            .remove(paths::relationship(&bob.uid, &alice.uid).unwrap());
        state.store().apply(update).unwrap();
        drop(guard);

        let err = tagging.await.unwrap().unwrap_err();
        assert!(matches!(err, SantaError::NotFriends(_)));
        assert!(tagged_uids(&state, &alice.uid, &id).is_empty());
        assert!(notifications(&state, "u2").is_empty());
    }
}
