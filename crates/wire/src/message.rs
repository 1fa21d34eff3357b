//! Protocol message kinds and the tag + bincode codec.

use crate::error::WireError;
use bincode::Options;
use ringmine_types::{PeerAddr, StatsSnapshot, Task};
use serde::de::{SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// Maximum size of any single message payload (tag + body).
///
/// The largest legitimate message is a migration batch of [`MAX_MIGRATE_BATCH`]
/// tasks; 1 MiB leaves generous headroom while keeping a misbehaving peer from
/// forcing large allocations.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Maximum number of tasks accepted in a single `MigrateTasks` body.
///
/// The balancer never sends more than its batch size (10); the wire bound is
/// deliberately looser so the codec does not encode protocol policy.
pub const MAX_MIGRATE_BATCH: usize = 64;

/// Create bincode options with a size limit for safe deserialization.
fn bincode_options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_limit(MAX_FRAME_SIZE as u64)
        .with_fixint_encoding()
        .allow_trailing_bytes()
}

/// Deserialize a `Vec<Task>` refusing oversized migration batches.
fn deserialize_bounded_tasks<'de, D>(deserializer: D) -> Result<Vec<Task>, D::Error>
where
    D: Deserializer<'de>,
{
    struct BoundedTaskVecVisitor;

    impl<'de> Visitor<'de> for BoundedTaskVecVisitor {
        type Value = Vec<Task>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            write!(
                formatter,
                "a sequence of at most {} tasks",
                MAX_MIGRATE_BATCH
            )
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let capacity = seq.size_hint().unwrap_or(0).min(MAX_MIGRATE_BATCH);
            let mut tasks = Vec::with_capacity(capacity);

            while let Some(task) = seq.next_element()? {
                if tasks.len() >= MAX_MIGRATE_BATCH {
                    return Err(serde::de::Error::custom(format!(
                        "migration batch exceeds maximum of {}",
                        MAX_MIGRATE_BATCH
                    )));
                }
                tasks.push(task);
            }

            Ok(tasks)
        }
    }

    deserializer.deserialize_seq(BoundedTaskVecVisitor)
}

/// Every message that crosses a ringmine connection.
///
/// Registry-facing kinds (`Register` through `TaskInitiate`, `TaskComplete`
/// through `TrafficSummary`) and ring kinds (`TasksCount` through
/// `StatusResponse`) share one codec; routing is by which connection a
/// message arrives on, not by kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Announce a node's listener to the registry or to a ring neighbor.
    Register { host: String, port: u16 },

    /// Registry verdict on a registration attempt.
    RegisterResponse { status: u8, info: String },

    /// Ring neighbors plus overlay parameters, sent once by the registry.
    NodeList {
        peers: Vec<PeerAddr>,
        pool_size: usize,
        overlay_size: usize,
    },

    /// Kick off one round of generate / balance / execute.
    TaskInitiate { round: u32 },

    /// A node's current task count, forwarded around the ring.
    TasksCount { origin: PeerAddr, count: u64 },

    /// Underloaded node asking an overloaded neighbor to migrate tasks.
    CheckStatus { deficit: u64 },

    /// Overloaded node soliciting a neighbor's deficit.
    PushRequest { total: u64 },

    /// A batch of tasks changing owner.
    MigrateTasks {
        #[serde(deserialize_with = "deserialize_bounded_tasks")]
        tasks: Vec<Task>,
    },

    /// Acknowledges a received migration batch.
    MigrateResponse,

    /// Legacy readiness signal; accepted and ignored.
    StatusResponse,

    /// Node telling the registry its round finished.
    TaskComplete { host: String, port: u16 },

    /// Registry requesting the final traffic counters.
    PullTrafficSummary,

    /// Per-node traffic counters, uploaded once at the end of a run.
    TrafficSummary {
        host: String,
        port: u16,
        stats: StatsSnapshot,
    },
}

impl Message {
    /// Message kind discriminant, carried as the frame's leading tag byte.
    pub fn type_id(&self) -> u8 {
        match self {
            Message::Register { .. } => 0x01,
            Message::RegisterResponse { .. } => 0x02,
            Message::NodeList { .. } => 0x03,
            Message::TaskInitiate { .. } => 0x04,
            Message::TasksCount { .. } => 0x05,
            Message::CheckStatus { .. } => 0x06,
            Message::PushRequest { .. } => 0x07,
            Message::MigrateTasks { .. } => 0x08,
            Message::MigrateResponse => 0x09,
            Message::StatusResponse => 0x0a,
            Message::TaskComplete { .. } => 0x0b,
            Message::PullTrafficSummary => 0x0c,
            Message::TrafficSummary { .. } => 0x0d,
        }
    }

    /// Message kind name for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Register { .. } => "Register",
            Message::RegisterResponse { .. } => "RegisterResponse",
            Message::NodeList { .. } => "NodeList",
            Message::TaskInitiate { .. } => "TaskInitiate",
            Message::TasksCount { .. } => "TasksCount",
            Message::CheckStatus { .. } => "CheckStatus",
            Message::PushRequest { .. } => "PushRequest",
            Message::MigrateTasks { .. } => "MigrateTasks",
            Message::MigrateResponse => "MigrateResponse",
            Message::StatusResponse => "StatusResponse",
            Message::TaskComplete { .. } => "TaskComplete",
            Message::PullTrafficSummary => "PullTrafficSummary",
            Message::TrafficSummary { .. } => "TrafficSummary",
        }
    }

    fn is_known_tag(tag: u8) -> bool {
        (0x01..=0x0d).contains(&tag)
    }

    /// Encode to a frame payload: leading tag byte plus bincode body.
    ///
    /// The tag duplicates the enum discriminant so receivers can route (and
    /// reject) by kind before touching the body.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let body = bincode_options()
            .serialize(self)
            .map_err(|e| WireError::Encode(e.to_string()))?;
        let mut payload = Vec::with_capacity(1 + body.len());
        payload.push(self.type_id());
        payload.extend_from_slice(&body);
        if payload.len() > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge {
                size: payload.len(),
                limit: MAX_FRAME_SIZE,
            });
        }
        Ok(payload)
    }

    /// Decode a frame payload produced by [`Message::encode`].
    pub fn decode(payload: &[u8]) -> Result<Self, WireError> {
        let (&tag, body) = payload.split_first().ok_or(WireError::EmptyPayload)?;
        if !Self::is_known_tag(tag) {
            return Err(WireError::UnknownTag(tag));
        }
        if payload.len() > MAX_FRAME_SIZE {
            return Err(WireError::FrameTooLarge {
                size: payload.len(),
                limit: MAX_FRAME_SIZE,
            });
        }
        let message: Message = bincode_options()
            .deserialize(body)
            .map_err(|e| WireError::Decode(e.to_string()))?;
        if message.type_id() != tag {
            return Err(WireError::TagMismatch {
                tag,
                kind: message.type_name(),
            });
        }
        Ok(message)
    }
}
