// =============================================================================
// Durable Bus Adapter — envelope pub/sub over three retention-distinct streams
// =============================================================================
//
// No module in the source talks to a message bus; this is new, grounded
// purely on the literal `titan.cmd.>` / `titan.evt.>` / `titan.data.>`
// subject-hierarchy-with-wildcards syntax, which is NATS subject algebra.
// JetStream gives each of the three streams its own retention policy without
// hand-rolling persistence.
// =============================================================================

pub mod envelopes;

use async_nats::jetstream::{self, consumer::PullConsumer, stream::RetentionPolicy};
use async_nats::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::error::BrainError;

pub const CMD_PREFIX: &str = "titan.cmd.";
pub const EVT_PREFIX: &str = "titan.evt.";
pub const DATA_PREFIX: &str = "titan.data.";
pub const DLQ_SUBJECT: &str = "titan.dlq";

/// The common wrapper around every bus message (spec §4.8 / GLOSSARY).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub id: String,
    pub version: u32,
    #[serde(rename = "type")]
    pub kind: String,
    pub producer: String,
    pub correlation_id: Option<String>,
    pub causation_id: Option<String>,
    pub idempotency_key: Option<String>,
    pub payload: T,
}

impl<T> Envelope<T> {
    pub fn new(kind: impl Into<String>, producer: impl Into<String>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            version: 1,
            kind: kind.into(),
            producer: producer.into(),
            correlation_id: None,
            causation_id: None,
            idempotency_key: None,
            payload,
        }
    }

    pub fn with_correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }
}

/// Which of the three named streams a subject belongs to, selected by
/// prefix (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Cmd,
    Evt,
    Data,
}

impl StreamKind {
    pub fn for_subject(subject: &str) -> Option<Self> {
        if subject.starts_with(CMD_PREFIX) {
            Some(Self::Cmd)
        } else if subject.starts_with(EVT_PREFIX) {
            Some(Self::Evt)
        } else if subject.starts_with(DATA_PREFIX) {
            Some(Self::Data)
        } else {
            None
        }
    }

    pub fn stream_name(self) -> &'static str {
        match self {
            Self::Cmd => "TITAN_CMD",
            Self::Evt => "TITAN_EVT",
            Self::Data => "TITAN_DATA",
        }
    }
}

pub struct BusAdapter {
    client: Client,
    jetstream: jetstream::Context,
}

impl BusAdapter {
    pub async fn connect(url: &str) -> Result<Self, BrainError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BrainError::TransientBus(format!("connect: {e}")))?;
        let jetstream = jetstream::new(client.clone());
        Ok(Self { client, jetstream })
    }

    /// Create the three JetStream streams with the retention contracts
    /// spec §4.8 names, idempotently (re-running on an existing deployment
    /// is a no-op).
    pub async fn ensure_streams(&self) -> Result<(), BrainError> {
        self.jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: StreamKind::Cmd.stream_name().to_string(),
                subjects: vec![format!("{CMD_PREFIX}>")],
                retention: RetentionPolicy::WorkQueue,
                max_age: std::time::Duration::from_secs(7 * 24 * 3600),
                duplicate_window: std::time::Duration::from_secs(60),
                ..Default::default()
            })
            .await
            .map_err(|e| BrainError::TransientBus(format!("ensure CMD stream: {e}")))?;

        self.jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: StreamKind::Evt.stream_name().to_string(),
                subjects: vec![format!("{EVT_PREFIX}>")],
                retention: RetentionPolicy::Limits,
                max_age: std::time::Duration::from_secs(30 * 24 * 3600),
                max_bytes: 10 * 1024 * 1024 * 1024,
                duplicate_window: std::time::Duration::from_secs(60),
                ..Default::default()
            })
            .await
            .map_err(|e| BrainError::TransientBus(format!("ensure EVT stream: {e}")))?;

        Ok(())
    }

    /// Publish an envelope. CMD/EVT go through JetStream (durable,
    /// at-least-once); DATA is core NATS (ephemeral, fire-and-forget).
    #[instrument(skip(self, envelope))]
    pub async fn publish<T: Serialize>(&self, subject: &str, envelope: &Envelope<T>) -> Result<(), BrainError> {
        let payload =
            serde_json::to_vec(envelope).map_err(|e| BrainError::Validation(format!("encode envelope: {e}")))?;

        match StreamKind::for_subject(subject) {
            Some(StreamKind::Cmd) | Some(StreamKind::Evt) => {
                self.jetstream
                    .publish(subject.to_string(), payload.into())
                    .await
                    .map_err(|e| BrainError::TransientBus(format!("jetstream publish: {e}")))?
                    .await
                    .map_err(|e| BrainError::TransientBus(format!("jetstream ack: {e}")))?;
            }
            Some(StreamKind::Data) => {
                self.client
                    .publish(subject.to_string(), payload.into())
                    .await
                    .map_err(|e| BrainError::TransientBus(format!("core publish: {e}")))?;
            }
            None => {
                return Err(BrainError::Validation(format!("subject {subject} matches no known stream")));
            }
        }
        Ok(())
    }

    /// Create (or bind to) a durable pull consumer on the CMD or EVT stream.
    pub async fn durable_consumer(
        &self,
        stream: StreamKind,
        durable_name: &str,
        filter_subject: &str,
    ) -> Result<PullConsumer, BrainError> {
        let stream_handle = self
            .jetstream
            .get_stream(stream.stream_name())
            .await
            .map_err(|e| BrainError::TransientBus(format!("get stream: {e}")))?;

        stream_handle
            .get_or_create_consumer(
                durable_name,
                jetstream::consumer::pull::Config {
                    durable_name: Some(durable_name.to_string()),
                    filter_subject: filter_subject.to_string(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BrainError::TransientBus(format!("get_or_create_consumer: {e}")))
    }

    /// Decode a raw message payload into `Envelope<T>`, routing malformed
    /// payloads to the dead-letter subject instead of panicking the
    /// consumer task.
    pub async fn decode_or_dlq<T: DeserializeOwned>(&self, raw: &[u8]) -> Option<Envelope<T>> {
        match serde_json::from_slice::<Envelope<T>>(raw) {
            Ok(env) => Some(env),
            Err(e) => {
                warn!(error = %e, "malformed envelope routed to DLQ");
                let _ = self.client.publish(DLQ_SUBJECT, bytes::Bytes::copy_from_slice(raw)).await;
                None
            }
        }
    }
}
