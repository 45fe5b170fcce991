//! Core identifiers and the protocol message.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Round counter. One round is one evaluation of every device's local logic.
pub type Round = u64;

/// Opaque device identifier. Ties are always broken by the lowest id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DeviceId(pub u32);

impl DeviceId {
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an offered or requested service.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ServiceType(pub u32);

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "svc-{}", self.0)
    }
}

/// Role of a message in the discovery protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Not part of the discovery handshake (benchmarks, plain broadcasts).
    #[default]
    Plain,
    Disco,
    Offer,
    Data,
    DataEnd,
}

/// The fields that identify a message for equality, ordering and hashing.
///
/// Kind and service type are not part of the identity: two messages that
/// differ only there are the same process key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MessageId {
    pub from: DeviceId,
    pub to: DeviceId,
    pub time: Round,
    pub payload_bits: u64,
}

/// Immutable point-to-point message. Derive a new one instead of mutating.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Message {
    from: DeviceId,
    to: DeviceId,
    time: Round,
    payload: f64,
    kind: MessageKind,
    service: ServiceType,
}

impl Message {
    pub fn new(from: DeviceId, to: DeviceId, time: Round, payload: f64) -> Self {
        Self {
            from,
            to,
            time,
            payload,
            kind: MessageKind::Plain,
            service: ServiceType::default(),
        }
    }

    pub fn with_kind(self, kind: MessageKind) -> Self {
        Self { kind, ..self }
    }

    pub fn with_service(self, service: ServiceType) -> Self {
        Self { service, ..self }
    }

    /// A reply from `responder` addressed back to this message's sender.
    pub fn answer(&self, responder: DeviceId, kind: MessageKind) -> Self {
        Self {
            from: responder,
            to: self.from,
            kind,
            ..*self
        }
    }

    pub fn from(&self) -> DeviceId {
        self.from
    }

    pub fn to(&self) -> DeviceId {
        self.to
    }

    /// Round in which the message was created.
    pub fn time(&self) -> Round {
        self.time
    }

    pub fn payload(&self) -> f64 {
        self.payload
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn service(&self) -> ServiceType {
        self.service
    }

    pub fn id(&self) -> MessageId {
        MessageId {
            from: self.from,
            to: self.to,
            time: self.time,
            payload_bits: self.payload.to_bits(),
        }
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Message {}

impl PartialOrd for Message {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Message {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id().cmp(&other.id())
    }
}

impl Hash for Message {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {}->{} @{} ({})",
            self.kind, self.from, self.to, self.time, self.service
        )
    }
}
