use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::{get, post};
use axum::{Extension, Router};
use futures::{stream, Stream};
use serde::Serialize;
use serde_json::Value;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::store::Subscription;
use crate::State;

pub fn app(state: State) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/session", post(session::sign_in))
        .route("/users/:uid", get(session::get_user))
        .route("/friends", get(friends::list))
        .route("/friends/:uid/status", get(friends::status))
        .route("/friends/:uid/request", post(friends::request))
        .route("/friends/:uid/accept", post(friends::accept))
        .route("/friends/:uid/decline", post(friends::decline))
        .route("/friends/:uid/unfriend", post(friends::unfriend))
        .route("/notifications", get(notifications::list))
        .route("/notifications/:key/read", post(notifications::mark_read))
        .route("/memories", get(memories::list).post(memories::create))
        .route("/memories/:id", get(memories::get))
        .route("/memories/:id/tag-candidates", get(memories::tag_candidates))
        .route("/memories/:id/tags", post(memories::tag))
        .route("/wishlist", get(wishlist::list).post(wishlist::add))
        .route("/wishlist/:id", axum::routing::delete(wishlist::remove))
        .route("/events", get(planner::list).post(planner::add))
        .route("/events/:id", axum::routing::delete(planner::remove))
        .route("/secret-santa", get(secret_santa::list).post(secret_santa::create))
        .route("/secret-santa/:id", get(secret_santa::get).delete(secret_santa::delete))
        .route("/secret-santa/:id/join", post(secret_santa::join))
        .route("/share/friend", get(share::friend))
        .route("/share/secret-santa/:id", get(share::group))
        .route("/share/memory/:id", get(share::memory))
        .route("/live/friends", get(friends::live))
        .route("/live/memories", get(memories::live))
        .route("/live/wishlist", get(wishlist::live))
        .route("/live/events", get(planner::live))
        .route("/live/secret-santa", get(secret_santa::live))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(state))
}

async fn root() -> &'static str {
    "SantaSphere"
}

/// Streams a subscription as server-sent events, one JSON frame per snapshot.
/// The subscription is dropped, and so cancelled, when the client goes away.
fn live<T, F>(subscription: Subscription, project: F) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send + 'static>
where
    T: Serialize,
    F: Fn(Value) -> T + Send + 'static,
{
    let frames = stream::unfold((subscription, project), |(mut subscription, project)| async move {
        loop {
            let snapshot = subscription.next().await?;
            match Event::default().json_data(project(snapshot)) {
                Ok(event) => return Some((Ok(event), (subscription, project))),
                Err(error) => warn!(%error, "dropping unencodable snapshot"),
            }
        }
    });
    debug!("live stream opened");
    Sse::new(frames).keep_alive(KeepAlive::default())
}

mod session {
    use axum::extract::Path;
    use axum::response::IntoResponse;
    use axum::{Extension, Json};
    use santa_common::UserId;

    use crate::identity::CurrentUser;
    use crate::{users, Result, State};

    pub async fn sign_in(Extension(state): Extension<State>, CurrentUser(me): CurrentUser) -> Result<impl IntoResponse> {
        Ok(Json(users::ensure_profile(&state, &me)?))
    }

    pub async fn get_user(
        Extension(state): Extension<State>,
        CurrentUser(_me): CurrentUser,
        Path(uid): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(users::profile(&state, &UserId(uid))?))
    }
}

mod friends {
    use axum::extract::Path;
    use axum::response::IntoResponse;
    use axum::{Extension, Json};
    use santa_common::UserId;
    use serde_json::json;

    use crate::identity::CurrentUser;
    use crate::{friends, Result, State};

    pub async fn list(Extension(state): Extension<State>, CurrentUser(me): CurrentUser) -> Result<impl IntoResponse> {
        Ok(Json(friends::partitions(&state, &me.uid)?))
    }

    pub async fn status(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Path(uid): Path<String>,
    ) -> Result<impl IntoResponse> {
        let status = friends::status(&state, &me.uid, &UserId(uid))?;
        Ok(Json(json!({ "status": status })))
    }

    pub async fn request(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Path(uid): Path<String>,
    ) -> Result<impl IntoResponse> {
        friends::send_request(&state, &me, &UserId(uid)).await?;
        Ok(())
    }

    pub async fn accept(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Path(uid): Path<String>,
    ) -> Result<impl IntoResponse> {
        friends::accept(&state, &me, &UserId(uid)).await?;
        Ok(())
    }

    pub async fn decline(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Path(uid): Path<String>,
    ) -> Result<impl IntoResponse> {
        friends::decline(&state, &me.uid, &UserId(uid)).await?;
        Ok(())
    }

    pub async fn unfriend(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Path(uid): Path<String>,
    ) -> Result<impl IntoResponse> {
        friends::unfriend(&state, &me.uid, &UserId(uid)).await?;
        Ok(())
    }

    pub async fn live(Extension(state): Extension<State>, CurrentUser(me): CurrentUser) -> Result<impl IntoResponse> {
        let subscription = friends::subscribe(&state, &me.uid)?;
        Ok(super::live(subscription, friends::partitions_from_snapshot))
    }
}

mod notifications {
    use axum::extract::Path;
    use axum::response::IntoResponse;
    use axum::{Extension, Json};

    use crate::identity::CurrentUser;
    use crate::{notifications, Result, State};

    pub async fn list(Extension(state): Extension<State>, CurrentUser(me): CurrentUser) -> Result<impl IntoResponse> {
        Ok(Json(notifications::list(&state, &me.uid)?))
    }

    pub async fn mark_read(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Path(key): Path<String>,
    ) -> Result<impl IntoResponse> {
        notifications::mark_read(&state, &me.uid, &key)?;
        Ok(())
    }
}

mod memories {
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::{Extension, Json};
    use santa_common::{Created, MemoryId, NewMemory, TagRequest};

    use crate::identity::CurrentUser;
    use crate::{memories, Result, State};

    pub async fn list(Extension(state): Extension<State>, CurrentUser(me): CurrentUser) -> Result<impl IntoResponse> {
        Ok(Json(memories::visible(&state, &me.uid)?))
    }

    pub async fn create(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Json(memory): Json<NewMemory>,
    ) -> Result<impl IntoResponse> {
        let id = memories::create(&state, &me, memory)?;
        Ok((StatusCode::CREATED, Json(Created { id: id.0 })))
    }

    pub async fn get(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(memories::get(&state, &me.uid, &MemoryId(id))?))
    }

    pub async fn tag_candidates(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(memories::tag_candidates(&state, &me.uid, &MemoryId(id))?))
    }

    pub async fn tag(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Path(id): Path<String>,
        Json(request): Json<TagRequest>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(memories::tag(&state, &me, &MemoryId(id), &request.friends).await?))
    }

    pub async fn live(Extension(state): Extension<State>, CurrentUser(me): CurrentUser) -> Result<impl IntoResponse> {
        let subscription = memories::subscribe(&state)?;
        let viewer = me.uid;
        Ok(super::live(subscription, move |snapshot| {
            memories::visible_from_snapshot(snapshot, &viewer)
        }))
    }
}

mod wishlist {
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::{Extension, Json};
    use santa_common::{Created, WishlistItem};

    use crate::identity::CurrentUser;
    use crate::{wishlist, Result, State};

    pub async fn list(Extension(state): Extension<State>, CurrentUser(me): CurrentUser) -> Result<impl IntoResponse> {
        Ok(Json(wishlist::list(&state, &me.uid)?))
    }

    pub async fn add(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Json(item): Json<WishlistItem>,
    ) -> Result<impl IntoResponse> {
        let id = wishlist::add(&state, &me.uid, item)?;
        Ok((StatusCode::CREATED, Json(Created { id })))
    }

    pub async fn remove(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        wishlist::remove(&state, &me.uid, &id)?;
        Ok(())
    }

    pub async fn live(Extension(state): Extension<State>, CurrentUser(me): CurrentUser) -> Result<impl IntoResponse> {
        let subscription = wishlist::subscribe(&state, &me.uid)?;
        Ok(super::live(subscription, wishlist::list_from_snapshot))
    }
}

mod planner {
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::{Extension, Json};
    use santa_common::{Created, NewHolidayEvent};

    use crate::identity::CurrentUser;
    use crate::{planner, Result, State};

    pub async fn list(Extension(state): Extension<State>, CurrentUser(me): CurrentUser) -> Result<impl IntoResponse> {
        Ok(Json(planner::list(&state, &me.uid)?))
    }

    pub async fn add(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Json(event): Json<NewHolidayEvent>,
    ) -> Result<impl IntoResponse> {
        let id = planner::add(&state, &me.uid, event)?;
        Ok((StatusCode::CREATED, Json(Created { id })))
    }

    pub async fn remove(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        planner::remove(&state, &me.uid, &id)?;
        Ok(())
    }

    pub async fn live(Extension(state): Extension<State>, CurrentUser(me): CurrentUser) -> Result<impl IntoResponse> {
        let subscription = planner::subscribe(&state, &me.uid)?;
        Ok(super::live(subscription, planner::list_from_snapshot))
    }
}

mod secret_santa {
    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::{Extension, Json};
    use santa_common::{Created, GroupId, NewGroup};

    use crate::identity::CurrentUser;
    use crate::{secret_santa, Result, State};

    pub async fn list(Extension(state): Extension<State>, CurrentUser(me): CurrentUser) -> Result<impl IntoResponse> {
        Ok(Json(secret_santa::list(&state, &me.uid)?))
    }

    pub async fn create(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Json(group): Json<NewGroup>,
    ) -> Result<impl IntoResponse> {
        let id = secret_santa::create(&state, &me, group)?;
        Ok((StatusCode::CREATED, Json(Created { id: id.0 })))
    }

    pub async fn get(
        Extension(state): Extension<State>,
        CurrentUser(_me): CurrentUser,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        Ok(Json(secret_santa::get(&state, &GroupId(id))?))
    }

    pub async fn join(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        secret_santa::join(&state, &me, &GroupId(id)).await?;
        Ok(())
    }

    pub async fn delete(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        secret_santa::delete(&state, &me.uid, &GroupId(id)).await?;
        Ok(())
    }

    pub async fn live(Extension(state): Extension<State>, CurrentUser(me): CurrentUser) -> Result<impl IntoResponse> {
        let subscription = secret_santa::subscribe(&state)?;
        let member = me.uid;
        Ok(super::live(subscription, move |snapshot| {
            secret_santa::list_from_snapshot(snapshot, &member)
        }))
    }
}

mod share {
    use axum::extract::Path;
    use axum::response::IntoResponse;
    use axum::{Extension, Json};
    use santa_common::share::{InviteLink, ShareLinks};
    use santa_common::{GroupId, MemoryId};

    use crate::identity::CurrentUser;
    use crate::{memories, secret_santa, Result, State};

    pub async fn friend(Extension(state): Extension<State>, CurrentUser(me): CurrentUser) -> Result<impl IntoResponse> {
        Ok(Json(ShareLinks::for_invite(&InviteLink::Friend(me.uid), state.origin())?))
    }

    pub async fn group(
        Extension(state): Extension<State>,
        CurrentUser(_me): CurrentUser,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        let group = secret_santa::get(&state, &GroupId(id))?;
        Ok(Json(ShareLinks::for_invite(&InviteLink::Group(group.id), state.origin())?))
    }

    /// Only memories the caller can see may be shared.
    pub async fn memory(
        Extension(state): Extension<State>,
        CurrentUser(me): CurrentUser,
        Path(id): Path<String>,
    ) -> Result<impl IntoResponse> {
        let id = MemoryId(id);
        memories::get(&state, &me.uid, &id)?;
        Ok(Json(ShareLinks::for_invite(&InviteLink::Memory(id), state.origin())?))
    }
}

