use santa_common::Identity;

use crate::store::Store;
use crate::{friends, users, State};

pub fn state() -> State {
    State::new(Store::temporary().unwrap(), "http://localhost:5173")
}

pub fn identity(uid: &str, name: &str) -> Identity {
    Identity {
        uid: uid.into(),
        display_name: name.to_string(),
        email: format!("{uid}@example.com"),
        photo_url: format!("https://img.example/{uid}"),
    }
}

pub fn signed_in(state: &State, uid: &str, name: &str) -> Identity {
    let identity = identity(uid, name);
    users::ensure_profile(state, &identity).unwrap();
    identity
}

pub async fn befriend(state: &State, a: &Identity, b: &Identity) {
    friends::send_request(state, a, &b.uid).await.unwrap();
    friends::accept(state, b, &a.uid).await.unwrap();
}
