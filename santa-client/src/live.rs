use futures::StreamExt;
use reqwest::Method;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{check, Session};

/// Full snapshots of one collection, delivered in order. The first one
/// arrives right after opening. Ends with [`LiveFeed::cancel`] or on drop.
pub struct LiveFeed<T> {
    receiver: mpsc::Receiver<T>,
    task: JoinHandle<()>,
}

impl<T: DeserializeOwned + Send + 'static> LiveFeed<T> {
    pub(crate) async fn open(session: &Session, path: &[&str]) -> anyhow::Result<Self> {
        let response = check(session.request(Method::GET, path)?.send().await?).await?;
        let (sender, receiver) = mpsc::channel(16);
        let path = path.join("/");
        let task = tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut frames = FrameBuffer::default();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(error) => {
                        warn!(%path, %error, "live feed broke");
                        break;
                    }
                };
                for data in frames.push(&chunk) {
                    match serde_json::from_str::<T>(&data) {
                        Ok(snapshot) => {
                            if sender.send(snapshot).await.is_err() {
                                return;
                            }
                        }
                        Err(error) => warn!(%path, %error, "skipping undecodable snapshot"),
                    }
                }
            }
            debug!(%path, "live feed ended");
        });
        Ok(Self { receiver, task })
    }
}

impl<T> LiveFeed<T> {
    /// Next snapshot; `None` once the stream is over.
    pub async fn next(&mut self) -> Option<T> {
        self.receiver.recv().await
    }

    pub fn cancel(self) {
        self.task.abort();
    }
}

impl<T> Drop for LiveFeed<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Splits an event stream into the `data` payloads of complete events.
/// Bytes are buffered until an event is complete so multi-byte characters
/// split across chunks survive.
#[derive(Default)]
struct FrameBuffer {
    pending: Vec<u8>,
}

impl FrameBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend(chunk.iter().copied().filter(|&b| b != b'\r'));
        let mut payloads = Vec::new();
        while let Some(end) = self.pending.windows(2).position(|w| w == b"\n\n") {
            let event: Vec<u8> = self.pending.drain(..end + 2).collect();
            let event = String::from_utf8_lossy(&event);
            let data: Vec<&str> = event
                .lines()
                .filter_map(|line| line.strip_prefix("data:"))
                .map(|rest| rest.strip_prefix(' ').unwrap_or(rest))
                .collect();
            if !data.is_empty() {
                payloads.push(data.join("\n"));
            }
        }
        payloads
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_split_across_chunks() {
        let mut frames = FrameBuffer::default();
        assert!(frames.push(b"data: {\"a\":").is_empty());
        assert_eq!(frames.push(b"1}\n\n:\n\ndata: [2]\n"), ["{\"a\":1}"]);
        assert_eq!(frames.push(b"\n"), ["[2]"]);
    }

    #[test]
    fn multibyte_text_split_mid_character() {
        let mut frames = FrameBuffer::default();
        let event = "data: \"Zoë\"\n\n".as_bytes();
        let split = event.iter().position(|&b| b >= 0x80).unwrap() + 1;
        assert!(frames.push(&event[..split]).is_empty());
        assert_eq!(frames.push(&event[split..]), ["\"Zoë\""]);
    }

    #[test]
    fn comments_and_crlf_are_handled() {
        let mut frames = FrameBuffer::default();
        assert_eq!(frames.push(b": keep-alive\r\n\r\ndata:null\r\n\r\n"), ["null"]);
    }
}
