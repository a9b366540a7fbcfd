//! A live stream: one publisher, many subscribers
//!
//! The stream owns everything a late joiner needs to start rendering
//! immediately: the onMetaData message, the audio and video codec
//! configuration frames, and a bounded cache of media since the last video
//! key frame. New subscribers are seeded with those in order before they
//! see live media, so playback starts on a decodable frame.

use std::collections::VecDeque;

use tokio::sync::{watch, Mutex};

use crate::amf::AmfValue;
use crate::protocol::constants::EVENT_STREAM_EOF;
use crate::protocol::message::{self, MediaMessage, ProtocolMessage};
use crate::session::connection::ConnectionHandle;

/// Media messages buffered since the last key frame
pub const DEFAULT_GOP_CAPACITY: usize = 1024;

/// A published stream with its subscriber set and late-joiner cache
///
/// Streams are named by the application from the publisher's connect;
/// the publish argument is the secret that authorized it, kept for the
/// transcoder.
#[derive(Debug)]
pub struct Stream {
    name: String,
    stream_key: String,
    publisher_id: u64,
    gop_capacity: usize,
    inner: Mutex<StreamInner>,
    /// Flips to true on the first media message; drives deferred work
    /// that must wait until media actually flows
    first_media: watch::Sender<bool>,
}

#[derive(Debug)]
struct StreamInner {
    closed: bool,
    subscribers: Vec<ConnectionHandle>,
    metadata: Option<ProtocolMessage>,
    video_config: Option<MediaMessage>,
    audio_config: Option<MediaMessage>,
    gop: VecDeque<MediaMessage>,
}

impl Stream {
    /// Create a stream owned by the given publisher session
    pub fn new(
        name: impl Into<String>,
        stream_key: impl Into<String>,
        publisher_id: u64,
        gop_capacity: usize,
    ) -> Self {
        let (first_media, _) = watch::channel(false);
        Self {
            name: name.into(),
            stream_key: stream_key.into(),
            publisher_id,
            gop_capacity,
            inner: Mutex::new(StreamInner {
                closed: false,
                subscribers: Vec::new(),
                metadata: None,
                video_config: None,
                audio_config: None,
                gop: VecDeque::new(),
            }),
            first_media,
        }
    }

    /// Application name this stream is registered and played under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Secret from the publish command that authorized this stream
    pub fn stream_key(&self) -> &str {
        &self.stream_key
    }

    /// Session id of the owning publisher
    pub fn publisher_id(&self) -> u64 {
        self.publisher_id
    }

    /// Watch that flips to true once media has flowed
    pub fn first_media_watch(&self) -> watch::Receiver<bool> {
        self.first_media.subscribe()
    }

    /// Store the stream metadata and forward it to current subscribers
    pub async fn publish_metadata(&self, message: ProtocolMessage) {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return;
        }
        inner.broadcast(&message);
        inner.metadata = Some(message);
    }

    /// Ingest one media message from the publisher
    ///
    /// Configuration frames are cached for seeding instead of entering the
    /// GOP buffer. A video key frame resets the buffer so it always starts
    /// on a decodable frame; when full, the oldest entry is dropped.
    pub async fn add_media(&self, media: MediaMessage) {
        {
            let mut inner = self.inner.lock().await;
            if inner.closed {
                return;
            }

            if media.is_config() {
                if media.is_video() {
                    inner.video_config = Some(media.clone());
                } else if media.is_audio() {
                    inner.audio_config = Some(media.clone());
                }
            } else {
                if media.is_video() && media.is_key_frame() {
                    inner.gop.clear();
                }
                if inner.gop.len() >= self.gop_capacity {
                    inner.gop.pop_front();
                }
                inner.gop.push_back(media.clone());
            }

            inner.broadcast(&media.to_message());
        }

        self.first_media.send_if_modified(|seen| {
            if *seen {
                false
            } else {
                *seen = true;
                true
            }
        });
    }

    /// Attach a subscriber, seeding it for immediate playback
    ///
    /// Seeding order is metadata, video config, audio config, then the
    /// buffered GOP oldest first. onMetaData is always sent, with a null
    /// payload when the publisher has not provided metadata yet. Returns
    /// false if the stream has already closed; re-adding an attached
    /// subscriber is a no-op.
    pub async fn add_subscriber(&self, handle: ConnectionHandle) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return false;
        }
        if inner.subscribers.iter().any(|s| s.id() == handle.id()) {
            return true;
        }

        match &inner.metadata {
            Some(metadata) => handle.send(metadata.clone()),
            None => handle.send(message::data(&["onMetaData".into(), AmfValue::Null])),
        };
        if let Some(config) = &inner.video_config {
            handle.send(config.to_message());
        }
        if let Some(config) = &inner.audio_config {
            handle.send(config.to_message());
        }
        for media in &inner.gop {
            handle.send(media.to_message());
        }

        tracing::info!(
            stream = %self.name,
            subscriber = handle.id(),
            gop_frames = inner.gop.len(),
            "Subscriber attached"
        );
        inner.subscribers.push(handle);
        true
    }

    /// Detach a subscriber by session id
    pub async fn remove_subscriber(&self, id: u64) {
        let mut inner = self.inner.lock().await;
        inner.subscribers.retain(|s| s.id() != id);
    }

    /// Current subscriber count
    pub async fn subscriber_count(&self) -> usize {
        self.inner.lock().await.subscribers.len()
    }

    /// End the stream: signal end-of-stream to every subscriber, then
    /// close their connections
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return;
        }
        inner.closed = true;

        for subscriber in &inner.subscribers {
            subscriber.send(message::user_control_event(EVENT_STREAM_EOF));
            subscriber.close();
        }
        tracing::info!(
            stream = %self.name,
            subscribers = inner.subscribers.len(),
            "Stream closed"
        );
        inner.subscribers.clear();
        inner.gop.clear();
    }
}

impl StreamInner {
    /// Fan a message out to every live subscriber, dropping dead ones
    fn broadcast(&mut self, message: &ProtocolMessage) {
        self.subscribers
            .retain(|subscriber| subscriber.is_active() && subscriber.send(message.clone()));
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use tokio::sync::mpsc;

    use super::*;
    use crate::protocol::constants::{MSG_AUDIO, MSG_DATA_AMF0, MSG_USER_CONTROL, MSG_VIDEO};
    use crate::protocol::header::ChunkHeader;
    use crate::session::connection::Outbound;

    fn handle(id: u64) -> (ConnectionHandle, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionHandle::new(id, tx), rx)
    }

    fn media(type_id: u8, payload: &'static [u8]) -> MediaMessage {
        MediaMessage {
            header: ChunkHeader::message(type_id, 6, 1, payload.len() as u32),
            payload: Bytes::from_static(payload),
        }
    }

    fn key_frame() -> MediaMessage {
        media(MSG_VIDEO, &[0x17, 0x01, 0xAA])
    }

    fn inter_frame() -> MediaMessage {
        media(MSG_VIDEO, &[0x27, 0x01, 0xBB])
    }

    fn recv_message(rx: &mut mpsc::UnboundedReceiver<Outbound>) -> ProtocolMessage {
        match rx.try_recv().expect("expected a queued message") {
            Outbound::Message(message) => message,
            Outbound::Close => panic!("unexpected close"),
        }
    }

    /// Every new subscriber is seeded an onMetaData message first
    fn skip_seeded_metadata(rx: &mut mpsc::UnboundedReceiver<Outbound>) {
        assert_eq!(recv_message(rx).type_id(), MSG_DATA_AMF0);
    }

    #[tokio::test]
    async fn test_media_reaches_subscribers() {
        let stream = Stream::new("live", "secret", 1, DEFAULT_GOP_CAPACITY);
        let (sub, mut rx) = handle(2);
        stream.add_subscriber(sub).await;
        skip_seeded_metadata(&mut rx);

        stream.add_media(key_frame()).await;

        let got = recv_message(&mut rx);
        assert_eq!(got.type_id(), MSG_VIDEO);
        assert_eq!(got.payload.as_ref(), &[0x17, 0x01, 0xAA]);
    }

    #[tokio::test]
    async fn test_late_joiner_seeding_order() {
        let stream = Stream::new("live", "secret", 1, DEFAULT_GOP_CAPACITY);

        stream
            .publish_metadata(message::data(&["onMetaData".into(), crate::amf::AmfValue::Null]))
            .await;
        stream.add_media(media(MSG_VIDEO, &[0x17, 0x00])).await; // video config
        stream.add_media(media(MSG_AUDIO, &[0xAF, 0x00])).await; // audio config
        stream.add_media(key_frame()).await;
        stream.add_media(inter_frame()).await;

        let (sub, mut rx) = handle(2);
        stream.add_subscriber(sub).await;

        assert_eq!(recv_message(&mut rx).type_id(), crate::protocol::constants::MSG_DATA_AMF0);
        assert_eq!(recv_message(&mut rx).payload.as_ref(), &[0x17, 0x00]);
        assert_eq!(recv_message(&mut rx).payload.as_ref(), &[0xAF, 0x00]);
        assert_eq!(recv_message(&mut rx).payload.as_ref(), &[0x17, 0x01, 0xAA]);
        assert_eq!(recv_message(&mut rx).payload.as_ref(), &[0x27, 0x01, 0xBB]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_key_frame_resets_gop() {
        let stream = Stream::new("live", "secret", 1, DEFAULT_GOP_CAPACITY);
        stream.add_media(key_frame()).await;
        stream.add_media(inter_frame()).await;
        stream.add_media(inter_frame()).await;
        stream.add_media(key_frame()).await;

        let (sub, mut rx) = handle(2);
        stream.add_subscriber(sub).await;
        skip_seeded_metadata(&mut rx);

        // only the frames since the second key frame are seeded
        assert_eq!(recv_message(&mut rx).payload.as_ref(), &[0x17, 0x01, 0xAA]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_gop_capacity_drops_oldest() {
        let stream = Stream::new("live", "secret", 1, 2);
        stream.add_media(key_frame()).await;
        stream.add_media(media(MSG_AUDIO, &[0xAF, 0x01, 0x01])).await;
        stream.add_media(media(MSG_AUDIO, &[0xAF, 0x01, 0x02])).await;

        let (sub, mut rx) = handle(2);
        stream.add_subscriber(sub).await;
        skip_seeded_metadata(&mut rx);

        assert_eq!(recv_message(&mut rx).payload.as_ref(), &[0xAF, 0x01, 0x01]);
        assert_eq!(recv_message(&mut rx).payload.as_ref(), &[0xAF, 0x01, 0x02]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_config_frames_survive_key_frame_reset() {
        let stream = Stream::new("live", "secret", 1, DEFAULT_GOP_CAPACITY);
        stream.add_media(media(MSG_VIDEO, &[0x17, 0x00])).await;
        stream.add_media(key_frame()).await;
        stream.add_media(key_frame()).await;

        let (sub, mut rx) = handle(2);
        stream.add_subscriber(sub).await;
        skip_seeded_metadata(&mut rx);

        // config first, then the single buffered key frame
        assert_eq!(recv_message(&mut rx).payload.as_ref(), &[0x17, 0x00]);
        assert_eq!(recv_message(&mut rx).payload.as_ref(), &[0x17, 0x01, 0xAA]);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_duplicate_subscriber_ignored() {
        let stream = Stream::new("live", "secret", 1, DEFAULT_GOP_CAPACITY);
        let (sub, mut rx) = handle(2);
        stream.add_subscriber(sub.clone()).await;
        stream.add_subscriber(sub).await;
        assert_eq!(stream.subscriber_count().await, 1);
        // the no-op re-add must not seed a second time
        skip_seeded_metadata(&mut rx);

        stream.add_media(key_frame()).await;
        recv_message(&mut rx);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dead_subscriber_removed_on_broadcast() {
        let stream = Stream::new("live", "secret", 1, DEFAULT_GOP_CAPACITY);
        let (alive, _alive_rx) = handle(2);
        let (dead, dead_rx) = handle(3);
        stream.add_subscriber(alive).await;
        stream.add_subscriber(dead).await;

        drop(dead_rx);
        stream.add_media(key_frame()).await;

        assert_eq!(stream.subscriber_count().await, 1);
    }

    #[tokio::test]
    async fn test_first_media_watch_fires_once() {
        let stream = Stream::new("live", "secret", 1, DEFAULT_GOP_CAPACITY);
        let mut watch = stream.first_media_watch();
        assert!(!*watch.borrow());

        stream.add_media(key_frame()).await;
        watch.changed().await.unwrap();
        assert!(*watch.borrow());

        // no further notification on later media
        stream.add_media(inter_frame()).await;
        assert!(!watch.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_close_signals_eof_then_close() {
        let stream = Stream::new("live", "secret", 1, DEFAULT_GOP_CAPACITY);
        let (sub, mut rx) = handle(2);
        stream.add_subscriber(sub).await;
        skip_seeded_metadata(&mut rx);

        stream.close().await;

        let eof = recv_message(&mut rx);
        assert_eq!(eof.type_id(), MSG_USER_CONTROL);
        assert_eq!(&eof.payload[0..2], &EVENT_STREAM_EOF.to_be_bytes());
        assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));
    }

    #[tokio::test]
    async fn test_seeding_without_metadata_sends_null_onmetadata() {
        let stream = Stream::new("live", "secret", 1, DEFAULT_GOP_CAPACITY);
        let (sub, mut rx) = handle(2);
        stream.add_subscriber(sub).await;

        let metadata = recv_message(&mut rx);
        assert_eq!(metadata.type_id(), MSG_DATA_AMF0);
        let values = crate::amf::amf0::decode_all(&metadata.payload).unwrap();
        assert_eq!(values[0].as_str(), Some("onMetaData"));
        assert_eq!(values[1], AmfValue::Null);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_stream_rejects_subscribers_and_media() {
        let stream = Stream::new("live", "secret", 1, DEFAULT_GOP_CAPACITY);
        stream.close().await;

        let (sub, mut rx) = handle(2);
        assert!(!stream.add_subscriber(sub).await);
        stream.add_media(key_frame()).await;
        assert!(rx.try_recv().is_err());
    }
}
