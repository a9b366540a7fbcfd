//! Session message handling
//!
//! Interprets decoded messages for one connection: the NetConnection and
//! NetStream command set, metadata, media routing, and teardown. A session
//! starts with no role and becomes a publisher through `publish` or a
//! subscriber through `play`; the role decides where media and metadata
//! go and what disconnect has to clean up.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::amf::{amf0, AmfValue};
use crate::error::{Result, SessionError};
use crate::ports::{retry_fixed, AuthorizationPort, TranscodeJob, TranscodePort};
use crate::protocol::constants::*;
use crate::protocol::message::{self, MediaMessage, ProtocolMessage};
use crate::registry::{RegistryError, Stream, StreamRegistry};
use crate::server::config::ServerConfig;
use crate::session::connection::ConnectionHandle;

const AUTH_RETRY_ATTEMPTS: u32 = 3;
const AUTH_RETRY_DELAY: Duration = Duration::from_millis(500);
const TRANSCODE_RETRY_ATTEMPTS: u32 = 3;
const TRANSCODE_RETRY_DELAY: Duration = Duration::from_secs(1);

enum Role {
    Idle,
    Publisher { stream: Arc<Stream> },
    Subscriber { stream: Arc<Stream> },
}

/// Protocol logic for one session
pub struct SessionHandler<A, T> {
    session_id: u64,
    peer_addr: SocketAddr,
    handle: ConnectionHandle,
    registry: Arc<StreamRegistry>,
    authorization: Arc<A>,
    transcode: Arc<T>,
    config: ServerConfig,
    /// Application name from connect, empty until then
    app: String,
    role: Role,
}

impl<A: AuthorizationPort, T: TranscodePort> SessionHandler<A, T> {
    pub fn new(
        session_id: u64,
        peer_addr: SocketAddr,
        handle: ConnectionHandle,
        registry: Arc<StreamRegistry>,
        authorization: Arc<A>,
        transcode: Arc<T>,
        config: ServerConfig,
    ) -> Self {
        Self {
            session_id,
            peer_addr,
            handle,
            registry,
            authorization,
            transcode,
            config,
            app: String::new(),
            role: Role::Idle,
        }
    }

    /// Session id of the connection this handler serves
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Queue a message for the peer
    pub fn send(&self, message: ProtocolMessage) {
        self.handle.send(message);
    }

    /// Dispatch one reassembled message
    pub async fn handle_message(&mut self, message: ProtocolMessage) -> Result<()> {
        match message.type_id() {
            MSG_COMMAND_AMF0 => self.handle_command(&message).await,
            MSG_DATA_AMF0 => self.handle_data(&message).await,
            MSG_AUDIO | MSG_VIDEO => self.handle_media(&message).await,
            MSG_USER_CONTROL => {
                self.log_user_control(&message);
                Ok(())
            }
            other => {
                tracing::debug!(
                    session_id = self.session_id,
                    type_id = other,
                    "Ignoring message"
                );
                Ok(())
            }
        }
    }

    async fn handle_command(&mut self, message: &ProtocolMessage) -> Result<()> {
        let values = amf0::decode_all(&message.payload)?;
        let name = values
            .first()
            .and_then(AmfValue::as_str)
            .ok_or(SessionError::MalformedCommand("command"))?;
        let transaction_id = values.get(1).and_then(AmfValue::as_number).unwrap_or(0.0);

        tracing::debug!(session_id = self.session_id, command = name, "Command received");

        match name {
            "connect" => self.on_connect(transaction_id, values.get(2)),
            "createStream" => self.on_create_stream(transaction_id),
            "publish" => self.on_publish(&values).await,
            "play" => self.on_play(&values).await,
            "closeStream" | "deleteStream" => self.on_close_stream().await,
            other => {
                tracing::debug!(
                    session_id = self.session_id,
                    command = other,
                    "Unhandled command"
                );
                Ok(())
            }
        }
    }

    fn on_connect(&mut self, transaction_id: f64, object: Option<&AmfValue>) -> Result<()> {
        let object = object.ok_or(SessionError::MalformedCommand("connect"))?;

        if let Some(encoding) = object.get_number("objectEncoding") {
            if encoding != 0.0 {
                return Err(SessionError::UnsupportedObjectEncoding(encoding as u32).into());
            }
        }

        self.app = object.get_str("app").unwrap_or_default().to_string();
        tracing::info!(
            session_id = self.session_id,
            peer = %self.peer_addr,
            app = %self.app,
            "Client connected"
        );

        self.send(message::window_ack_size(self.config.window_ack_size));
        self.send(message::set_peer_bandwidth(self.config.peer_bandwidth, 2));
        self.send(message::set_chunk_size(self.config.chunk_size));
        self.send(message::command(&[
            "_result".into(),
            AmfValue::Number(transaction_id),
            AmfValue::object(vec![
                ("fmsVer", "FMS/3,0,1,123".into()),
                ("capabilities", AmfValue::Number(31.0)),
            ]),
            AmfValue::object(vec![
                ("level", "status".into()),
                ("code", "NetConnection.Connect.Success".into()),
                ("description", "Connection succeeded.".into()),
                ("objectEncoding", AmfValue::Number(0.0)),
            ]),
        ]));
        Ok(())
    }

    fn on_create_stream(&mut self, transaction_id: f64) -> Result<()> {
        self.send(message::command(&[
            "_result".into(),
            AmfValue::Number(transaction_id),
            AmfValue::Null,
            AmfValue::Number(DEFAULT_MESSAGE_STREAM_ID as f64),
        ]));
        Ok(())
    }

    /// publish(key, type): authorize the key, claim the app name, announce
    ///
    /// Streams live under the connect-supplied application name; the
    /// publish argument is the publisher's secret, never an address.
    async fn on_publish(&mut self, values: &[AmfValue]) -> Result<()> {
        let stream_key = values
            .get(3)
            .and_then(AmfValue::as_str)
            .ok_or(SessionError::MalformedCommand("publish"))?
            .to_string();
        let stream_type = values.get(4).and_then(AmfValue::as_str).unwrap_or("live");

        if stream_type != "live" {
            self.send(message::on_status(
                "error",
                "NetStream.Publish.BadType",
                "Only live publishing is supported",
            ));
            self.handle.close();
            return Err(SessionError::UnsupportedStreamType(stream_type.to_string()).into());
        }

        if !self.authorize_publish(&stream_key).await {
            self.send(message::on_status(
                "error",
                "NetStream.Publish.BadName",
                "Publish not authorized",
            ));
            self.handle.close();
            return Err(SessionError::Closed("publish rejected").into());
        }

        let stream = match self
            .registry
            .publish(&self.app, &stream_key, self.session_id)
            .await
        {
            Ok(stream) => stream,
            Err(RegistryError::AlreadyPublishing(_)) => {
                self.send(message::on_status(
                    "error",
                    "NetStream.Publish.BadName",
                    "Stream name already in use",
                ));
                self.handle.close();
                return Err(SessionError::Closed("stream name taken").into());
            }
        };

        self.spawn_transcode_start(&stream);
        self.role = Role::Publisher { stream };
        self.send(message::on_status(
            "status",
            "NetStream.Publish.Start",
            "Start publishing",
        ));
        tracing::info!(session_id = self.session_id, stream = %self.app, "Publishing started");
        Ok(())
    }

    /// Authorization is retried against transient backend failures and
    /// fails closed: no affirmative answer, no stream.
    async fn authorize_publish(&self, stream_key: &str) -> bool {
        let authorization = Arc::clone(&self.authorization);
        let app = self.app.clone();
        let result = retry_fixed(AUTH_RETRY_ATTEMPTS, AUTH_RETRY_DELAY, || {
            authorization.authorize(&app, stream_key)
        })
        .await;

        match result {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::error!(
                    session_id = self.session_id,
                    stream = %self.app,
                    error = %e,
                    "Authorization unavailable, rejecting publish"
                );
                false
            }
        }
    }

    /// Notify the transcoder once media actually flows
    ///
    /// A publisher that never sends media never triggers a transcode job.
    /// If the transcoder cannot be reached the stream is torn down, so a
    /// publisher does not keep feeding a stream nobody processes.
    fn spawn_transcode_start(&self, stream: &Arc<Stream>) {
        let mut first_media = stream.first_media_watch();
        let transcode = Arc::clone(&self.transcode);
        let registry = Arc::clone(&self.registry);
        let stream = Arc::clone(stream);
        let publisher = self.handle.clone();
        let session_id = self.session_id;

        tokio::spawn(async move {
            while !*first_media.borrow() {
                if first_media.changed().await.is_err() {
                    return;
                }
            }

            let job = TranscodeJob::new(stream.name(), stream.stream_key());
            let result = retry_fixed(TRANSCODE_RETRY_ATTEMPTS, TRANSCODE_RETRY_DELAY, || {
                transcode.start(&job)
            })
            .await;

            if let Err(e) = result {
                tracing::error!(
                    session_id = session_id,
                    stream = %stream.name(),
                    error = %e,
                    "Transcoder unavailable, closing stream"
                );
                stream.close().await;
                registry.unpublish(stream.name(), stream.publisher_id()).await;
                publisher.close();
            }
        });
    }

    /// play: streams resolve by the connect-supplied application name,
    /// whatever name the player put in the play command
    async fn on_play(&mut self, values: &[AmfValue]) -> Result<()> {
        let requested = values.get(3).and_then(AmfValue::as_str).unwrap_or_default();

        let Some(stream) = self.registry.get(&self.app).await else {
            tracing::info!(
                session_id = self.session_id,
                app = %self.app,
                requested = requested,
                "Play miss"
            );
            self.send(message::on_status(
                "error",
                "NetStream.Play.StreamNotFound",
                "No such stream",
            ));
            self.handle.close();
            return Err(SessionError::Closed("no such stream").into());
        };

        self.send(message::user_control_event(EVENT_STREAM_BEGIN));
        self.send(message::on_status(
            "status",
            "NetStream.Play.Start",
            "Start live",
        ));
        self.send(message::data(&[
            "|RtmpSampleAccess".into(),
            AmfValue::Boolean(true),
            AmfValue::Boolean(true),
        ]));

        // seeds metadata, codec configs, and the GOP cache in order
        stream.add_subscriber(self.handle.clone()).await;
        tracing::info!(session_id = self.session_id, stream = %self.app, "Playback started");
        self.role = Role::Subscriber { stream };
        Ok(())
    }

    /// closeStream/deleteStream: always acknowledged, publisher or not
    ///
    /// A publisher's connection closes with its stream; the status reply
    /// still reaches it first through the write queue.
    async fn on_close_stream(&mut self) -> Result<()> {
        let was_publisher = matches!(self.role, Role::Publisher { .. });
        self.teardown_publisher().await;
        self.send(message::on_status(
            "status",
            "NetStream.Unpublish.Success",
            "Stop publishing",
        ));
        if was_publisher {
            self.handle.close();
        }
        Ok(())
    }

    /// Metadata and other AMF0 data messages
    async fn handle_data(&mut self, message: &ProtocolMessage) -> Result<()> {
        let values = amf0::decode_all(&message.payload)?;
        match values.first().and_then(AmfValue::as_str) {
            Some("@setDataFrame") => self.on_set_data_frame(&values).await,
            other => {
                tracing::debug!(session_id = self.session_id, data = ?other, "Ignoring data message");
                Ok(())
            }
        }
    }

    async fn on_set_data_frame(&mut self, values: &[AmfValue]) -> Result<()> {
        let Role::Publisher { stream } = &self.role else {
            tracing::debug!(session_id = self.session_id, "Metadata from non-publisher ignored");
            return Ok(());
        };
        if values.get(1).and_then(AmfValue::as_str) != Some("onMetaData") {
            return Ok(());
        }
        let properties = values
            .get(2)
            .and_then(AmfValue::as_pairs)
            .ok_or(SessionError::MalformedCommand("@setDataFrame"))?;

        if let Some(encoder) = values[2].get_str("encoder") {
            if encoder.to_ascii_lowercase().contains("obs") {
                tracing::info!(session_id = self.session_id, encoder = encoder, "OBS encoder");
            }
        }

        // filesize is meaningless for a live stream and confuses players
        let cleaned: Vec<(String, AmfValue)> = properties
            .iter()
            .filter(|(key, _)| key != "filesize")
            .cloned()
            .collect();
        let metadata = match &values[2] {
            AmfValue::EcmaArray(_) => AmfValue::EcmaArray(cleaned),
            _ => AmfValue::Object(cleaned),
        };

        stream
            .publish_metadata(message::data(&["onMetaData".into(), metadata]))
            .await;
        Ok(())
    }

    async fn handle_media(&mut self, message: &ProtocolMessage) -> Result<()> {
        match &self.role {
            Role::Publisher { stream } => {
                stream.add_media(MediaMessage::from_message(message)).await;
            }
            _ => {
                tracing::debug!(
                    session_id = self.session_id,
                    "Media from non-publisher ignored"
                );
            }
        }
        Ok(())
    }

    fn log_user_control(&self, message: &ProtocolMessage) {
        let event = if message.payload.len() >= 2 {
            u16::from_be_bytes([message.payload[0], message.payload[1]])
        } else {
            return;
        };
        tracing::debug!(session_id = self.session_id, event = event, "User control event");
    }

    /// Disconnect cleanup for whatever role the session held
    pub async fn on_disconnect(&mut self) {
        match std::mem::replace(&mut self.role, Role::Idle) {
            Role::Publisher { stream } => {
                self.role = Role::Publisher { stream };
                self.teardown_publisher().await;
            }
            Role::Subscriber { stream } => {
                stream.remove_subscriber(self.session_id).await;
            }
            Role::Idle => {}
        }
        tracing::debug!(session_id = self.session_id, "Session ended");
    }

    /// End a published stream: close subscribers, free the name, stop the
    /// transcoder
    async fn teardown_publisher(&mut self) {
        let stream = match std::mem::replace(&mut self.role, Role::Idle) {
            Role::Publisher { stream } => stream,
            other => {
                self.role = other;
                return;
            }
        };

        stream.close().await;
        self.registry
            .unpublish(stream.name(), self.session_id)
            .await;

        let transcode = Arc::clone(&self.transcode);
        let job = TranscodeJob::new(stream.name(), stream.stream_key());
        tokio::spawn(async move {
            if let Err(e) = retry_fixed(TRANSCODE_RETRY_ATTEMPTS, TRANSCODE_RETRY_DELAY, || {
                transcode.stop(&job)
            })
            .await
            {
                tracing::error!(stream = %job.app, error = %e, "Transcoder stop failed");
            }
        });

        tracing::info!(
            session_id = self.session_id,
            stream = %stream.name(),
            "Publishing stopped"
        );
    }
}
