use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use url::{ParseError, Url};

use crate::{GroupId, MemoryId, UserId};

pub const SHARE_MESSAGE: &str = "Join me on SantaSphere!";

const WHATSAPP_BASE: &str = "https://wa.me/";
const TELEGRAM_BASE: &str = "https://telegram.me/share/url";

/// Appends `segments` to the path of `base`, percent-encoding each one.
pub fn with_segments<'a>(base: &str, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, ParseError> {
    let mut url = Url::parse(base)?;
    url.path_segments_mut()
        .map_err(|()| ParseError::RelativeUrlWithCannotBeABaseBase)?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InviteLink {
    Friend(UserId),
    Group(GroupId),
    Memory(MemoryId),
}

impl InviteLink {
    pub fn to_url(&self, origin: &str) -> Result<String, ParseError> {
        let url = match self {
            InviteLink::Friend(uid) => with_segments(origin, ["friend", uid.as_ref()])?,
            InviteLink::Group(group) => with_segments(origin, ["secret-santa", "join", group.as_ref()])?,
            InviteLink::Memory(memory) => with_segments(origin, ["memory", memory.as_ref()])?,
        };
        Ok(url.into())
    }

    /// Recovers the embedded id from a link built by [`InviteLink::to_url`].
    pub fn parse(link: &str) -> Option<Self> {
        let url = Url::parse(link).ok()?;
        let segments = url
            .path_segments()?
            .filter(|s| !s.is_empty())
            .map(|s| percent_decode_str(s).decode_utf8().ok().map(|s| s.into_owned()))
            .collect::<Option<Vec<String>>>()?;
        let segments: Vec<&str> = segments.iter().map(String::as_str).collect();
        match segments.as_slice() {
            ["friend", uid] => Some(InviteLink::Friend(UserId::from(*uid))),
            ["secret-santa", "join", group] => Some(InviteLink::Group(GroupId::from(*group))),
            ["memory", memory] => Some(InviteLink::Memory(MemoryId::from(*memory))),
            _ => None,
        }
    }
}

/// The link itself plus ready-made deep links into messaging apps.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShareLinks {
    pub url: String,
    pub whatsapp: String,
    pub telegram: String,
}

impl ShareLinks {
    pub fn for_url(url: &str) -> Result<Self, ParseError> {
        let text = format!("{SHARE_MESSAGE} {url}");
        let whatsapp = Url::parse_with_params(WHATSAPP_BASE, &[("text", text.as_str())])?;
        let telegram = Url::parse_with_params(TELEGRAM_BASE, &[("url", url)])?;
        Ok(Self {
            url: url.to_string(),
            whatsapp: whatsapp.into(),
            telegram: telegram.into(),
        })
    }

    pub fn for_invite(invite: &InviteLink, origin: &str) -> Result<Self, ParseError> {
        Self::for_url(&invite.to_url(origin)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_invite_urls() {
        let friend = InviteLink::Friend("u1".into());
        assert_eq!(friend.to_url("https://santa.example/").unwrap(), "https://santa.example/friend/u1");
        let group = InviteLink::Group("g9".into());
        assert_eq!(group.to_url("https://santa.example").unwrap(), "https://santa.example/secret-santa/join/g9");
    }

    #[test]
    fn parses_its_own_links() {
        for invite in [
            InviteLink::Friend("u1".into()),
            InviteLink::Group("g1".into()),
            InviteLink::Memory("m1".into()),
        ] {
            let url = invite.to_url("http://localhost:5173").unwrap();
            assert_eq!(InviteLink::parse(&url), Some(invite));
        }
        assert_eq!(InviteLink::parse("http://localhost:5173/wishlist"), None);
        assert_eq!(InviteLink::parse("not a url"), None);
    }

    #[test]
    fn ids_outside_plain_ascii_survive_the_link() {
        for uid in ["Zoë", "u?2", "50% off", "a+b"] {
            let invite = InviteLink::Friend(uid.into());
            let url = invite.to_url("https://santa.example").unwrap();
            assert!(!url.contains('?'), "{url}");
            assert_eq!(InviteLink::parse(&url), Some(invite));
        }
        let url = InviteLink::Group("Zoë".into()).to_url("https://santa.example").unwrap();
        assert_eq!(url, "https://santa.example/secret-santa/join/Zo%C3%AB");
    }

    #[test]
    fn segments_are_appended_to_the_base_path() {
        let url = with_segments("http://127.0.0.1:8000/", ["friends", "u?2", "status"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:8000/friends/u%3F2/status");
        assert!(with_segments("mailto:santa@example.com", ["x"]).is_err());
    }

    #[test]
    fn share_targets_encode_the_link() {
        let links = ShareLinks::for_url("https://santa.example/friend/u1").unwrap();
        assert_eq!(links.url, "https://santa.example/friend/u1");
        assert!(links.telegram.starts_with("https://telegram.me/share/url?url="));
        assert!(links.telegram.contains("https%3A%2F%2Fsanta.example%2Ffriend%2Fu1"));
        assert!(links.whatsapp.starts_with("https://wa.me/?text=Join+me+on+SantaSphere%21+"));
        assert!(!links.whatsapp.contains("//santa.example"));
    }
}
