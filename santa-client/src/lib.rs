use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use santa_common::share::with_segments;
use santa_common::{headers, Identity};
use serde::Deserialize;
use thiserror::Error;

pub mod live;

pub use live::LiveFeed;

/// A non-2xx answer from the service, carrying its `{"error": ...}` message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{status}: {message}")]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

/// Who the requests are made as, and where they go.
#[derive(Clone, Debug)]
pub struct Session {
    client: Client,
    base_url: String,
    identity: Identity,
}

impl Session {
    pub fn new(client: Client, base_url: impl Into<String>, identity: Identity) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            identity,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    fn identity_headers(&self) -> anyhow::Result<HeaderMap> {
        let mut map = HeaderMap::new();
        let fields = [
            (headers::UID, &self.identity.uid.0),
            (headers::NAME, &self.identity.display_name),
            (headers::EMAIL, &self.identity.email),
            (headers::PHOTO, &self.identity.photo_url),
        ];
        for (name, value) in fields {
            // display names are not always ASCII
            let value = HeaderValue::from_bytes(value.as_bytes()).with_context(|| format!("bad {name} header"))?;
            map.insert(name, value);
        }
        Ok(map)
    }

    /// A request to `base_url` followed by `path`, one percent-encoded
    /// segment per element.
    pub(crate) fn request(&self, method: Method, path: &[&str]) -> anyhow::Result<RequestBuilder> {
        let url = with_segments(&self.base_url, path.iter().copied())
            .with_context(|| format!("bad base url {}", self.base_url))?;
        Ok(self.client.request(method, url).headers(self.identity_headers()?))
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

/// Turns a non-2xx response into an [`ApiError`].
pub(crate) async fn check(response: Response) -> anyhow::Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
        .map(|body| body.error)
        .unwrap_or(body);
    Err(ApiError { status, message }.into())
}

pub mod client {
    use anyhow::Result;
    use reqwest::Method;
    use santa_common::share::{InviteLink, ShareLinks};
    use santa_common::views::{FriendPartitions, TagCandidates};
    use santa_common::{
        Created, GroupId, GroupListing, HolidayEvent, Keyed, Memory, MemoryId, NewGroup, NewHolidayEvent,
        NewMemory, Notification, RelationshipStatus, TagRequest, TaggedFriend, UserId, UserProfile, WishlistItem,
    };
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Serialize};

    use crate::live::LiveFeed;
    use crate::{check, Session};

    async fn get<T: DeserializeOwned>(session: &Session, path: &[&str]) -> Result<T> {
        Ok(check(session.request(Method::GET, path)?.send().await?)
            .await?
            .json::<T>()
            .await?)
    }

    async fn post<B: Serialize, T: DeserializeOwned>(session: &Session, path: &[&str], body: &B) -> Result<T> {
        Ok(check(session.request(Method::POST, path)?.json(body).send().await?)
            .await?
            .json::<T>()
            .await?)
    }

    async fn act(session: &Session, method: Method, path: &[&str]) -> Result<()> {
        check(session.request(method, path)?.send().await?).await?;
        Ok(())
    }

    pub async fn sign_in(session: &Session) -> Result<UserProfile> {
        post(session, &["session"], &()).await
    }
    pub async fn get_user(session: &Session, uid: &UserId) -> Result<UserProfile> {
        get(session, &["users", uid.as_ref()]).await
    }

    pub async fn get_friends(session: &Session) -> Result<FriendPartitions> {
        get(session, &["friends"]).await
    }
    pub async fn friend_status(session: &Session, uid: &UserId) -> Result<Option<RelationshipStatus>> {
        #[derive(Deserialize)]
        struct Status {
            status: Option<RelationshipStatus>,
        }
        Ok(get::<Status>(session, &["friends", uid.as_ref(), "status"]).await?.status)
    }
    pub async fn send_friend_request(session: &Session, to: &UserId) -> Result<()> {
        act(session, Method::POST, &["friends", to.as_ref(), "request"]).await
    }
    pub async fn accept_friend_request(session: &Session, from: &UserId) -> Result<()> {
        act(session, Method::POST, &["friends", from.as_ref(), "accept"]).await
    }
    pub async fn decline_friend_request(session: &Session, from: &UserId) -> Result<()> {
        act(session, Method::POST, &["friends", from.as_ref(), "decline"]).await
    }
    pub async fn unfriend(session: &Session, friend: &UserId) -> Result<()> {
        act(session, Method::POST, &["friends", friend.as_ref(), "unfriend"]).await
    }
    pub async fn watch_friends(session: &Session) -> Result<LiveFeed<FriendPartitions>> {
        LiveFeed::open(session, &["live", "friends"]).await
    }

    pub async fn get_notifications(session: &Session) -> Result<Vec<Keyed<Notification>>> {
        get(session, &["notifications"]).await
    }
    pub async fn mark_notification_read(session: &Session, key: &str) -> Result<()> {
        act(session, Method::POST, &["notifications", key, "read"]).await
    }

    pub async fn get_memories(session: &Session) -> Result<Vec<Keyed<Memory>>> {
        get(session, &["memories"]).await
    }
    pub async fn create_memory(session: &Session, memory: &NewMemory) -> Result<MemoryId> {
        Ok(MemoryId(post::<_, Created>(session, &["memories"], memory).await?.id))
    }
    pub async fn get_memory(session: &Session, id: &MemoryId) -> Result<Memory> {
        get(session, &["memories", id.as_ref()]).await
    }
    pub async fn tag_candidates(session: &Session, id: &MemoryId) -> Result<TagCandidates> {
        get(session, &["memories", id.as_ref(), "tag-candidates"]).await
    }
    pub async fn tag_memory(session: &Session, id: &MemoryId, friends: Vec<UserId>) -> Result<Vec<TaggedFriend>> {
        post(session, &["memories", id.as_ref(), "tags"], &TagRequest { friends }).await
    }
    pub async fn watch_memories(session: &Session) -> Result<LiveFeed<Vec<Keyed<Memory>>>> {
        LiveFeed::open(session, &["live", "memories"]).await
    }

    pub async fn get_wishlist(session: &Session) -> Result<Vec<Keyed<WishlistItem>>> {
        get(session, &["wishlist"]).await
    }
    pub async fn add_wishlist_item(session: &Session, item: &WishlistItem) -> Result<String> {
        Ok(post::<_, Created>(session, &["wishlist"], item).await?.id)
    }
    pub async fn remove_wishlist_item(session: &Session, id: &str) -> Result<()> {
        act(session, Method::DELETE, &["wishlist", id]).await
    }
    pub async fn watch_wishlist(session: &Session) -> Result<LiveFeed<Vec<Keyed<WishlistItem>>>> {
        LiveFeed::open(session, &["live", "wishlist"]).await
    }

    pub async fn get_events(session: &Session) -> Result<Vec<Keyed<HolidayEvent>>> {
        get(session, &["events"]).await
    }
    pub async fn add_event(session: &Session, event: &NewHolidayEvent) -> Result<String> {
        Ok(post::<_, Created>(session, &["events"], event).await?.id)
    }
    pub async fn remove_event(session: &Session, id: &str) -> Result<()> {
        act(session, Method::DELETE, &["events", id]).await
    }
    pub async fn watch_events(session: &Session) -> Result<LiveFeed<Vec<Keyed<HolidayEvent>>>> {
        LiveFeed::open(session, &["live", "events"]).await
    }

    pub async fn get_groups(session: &Session) -> Result<Vec<GroupListing>> {
        get(session, &["secret-santa"]).await
    }
    pub async fn create_group(session: &Session, group: &NewGroup) -> Result<GroupId> {
        Ok(GroupId(post::<_, Created>(session, &["secret-santa"], group).await?.id))
    }
    pub async fn get_group(session: &Session, id: &GroupId) -> Result<GroupListing> {
        get(session, &["secret-santa", id.as_ref()]).await
    }
    pub async fn join_group(session: &Session, id: &GroupId) -> Result<()> {
        act(session, Method::POST, &["secret-santa", id.as_ref(), "join"]).await
    }
    pub async fn delete_group(session: &Session, id: &GroupId) -> Result<()> {
        act(session, Method::DELETE, &["secret-santa", id.as_ref()]).await
    }
    pub async fn watch_groups(session: &Session) -> Result<LiveFeed<Vec<GroupListing>>> {
        LiveFeed::open(session, &["live", "secret-santa"]).await
    }

    pub async fn share_friend(session: &Session) -> Result<ShareLinks> {
        get(session, &["share", "friend"]).await
    }
    pub async fn share_group(session: &Session, id: &GroupId) -> Result<ShareLinks> {
        get(session, &["share", "secret-santa", id.as_ref()]).await
    }
    pub async fn share_memory(session: &Session, id: &MemoryId) -> Result<ShareLinks> {
        get(session, &["share", "memory", id.as_ref()]).await
    }

    /// What an invite link points at, looked up for the landing view.
    #[derive(Clone, Debug, PartialEq)]
    pub enum Landing {
        Friend {
            profile: UserProfile,
            status: Option<RelationshipStatus>,
        },
        Group(GroupListing),
        Memory(Memory),
    }

    /// Follows an invite link without acting on it.
    pub async fn resolve_invite(session: &Session, link: &str) -> Result<Landing> {
        let invite = InviteLink::parse(link).ok_or_else(|| anyhow::anyhow!("not an invite link: {link}"))?;
        Ok(match invite {
            InviteLink::Friend(uid) => Landing::Friend {
                profile: get_user(session, &uid).await?,
                status: friend_status(session, &uid).await?,
            },
            InviteLink::Group(id) => Landing::Group(get_group(session, &id).await?),
            InviteLink::Memory(id) => Landing::Memory(get_memory(session, &id).await?),
        })
    }
}
