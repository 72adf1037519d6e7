/*
 * Copyright 2021 Actyx AG
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */
use std::{
    cmp::Ordering,
    fmt::{Debug, Formatter},
    sync::Arc,
};

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};

use crate::{offset::Offset, scalars::StreamId, tags::TagSet, timestamp::LamportTimestamp, timestamp::TimeStamp, types::ArcVal};

/// A ref-counted slice of memory holding a compact binary (CBOR) representation of an
/// event payload.
///
/// The wire format (JSON, when talking to the outside world) is produced on the fly by
/// transcoding the stored CBOR bytes, so a payload is parsed into its canonical binary
/// shape exactly once, regardless of how many times it is later serialized.
#[derive(Debug, Clone, PartialEq, Eq, Ord, PartialOrd)]
pub struct Opaque(ArcVal<[u8]>);

impl Opaque {
    pub fn new(bytes: Arc<[u8]>) -> Self {
        Opaque(bytes.into())
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Opaque(ArcVal::clone_from_unsized(bytes))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Rough estimate of the in-memory size of an opaque value
    pub fn rough_size(&self) -> usize {
        self.len() + 16
    }
}

impl AsRef<[u8]> for Opaque {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref()
    }
}

impl Serialize for Opaque {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut deserializer = serde_cbor::Deserializer::from_slice(&self.0);
        serde_transcode::transcode(&mut deserializer, serializer).map_err(serde::ser::Error::custom)
    }
}

impl<'de> Deserialize<'de> for Opaque {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let res = Vec::new();
        let mut serializer = serde_cbor::Serializer::new(res);
        serde_transcode::transcode(deserializer, &mut serializer).map_err(D::Error::custom)?;
        let res = serializer.into_inner();
        Ok(Opaque(ArcVal::from_boxed(res.into())))
    }
}

/// Compact binary storage of an event's payload, as received over the wire or produced
/// by [`Payload::compact`].
///
/// See [`Event::extract`] for the supported ways of recovering a typed value from it.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Ord, PartialOrd)]
#[serde(transparent)]
pub struct Payload(Opaque);

impl Payload {
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(Opaque::new(bytes.into()))
    }

    pub fn as_slice(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn from_json_str(s: &str) -> Result<Payload, String> {
        serde_json::from_str(s).map_err(|e| format!("{}", e))
    }

    /// Construct a new Payload from the supplied serializable value.
    pub fn compact<T: Serialize>(t: &T) -> Result<Payload, serde_cbor::Error> {
        serde_cbor::to_vec(t).map(|bytes| Payload(Opaque::new(bytes.into())))
    }

    /// Try to lift the desired type from this Payload's bytes.
    pub fn extract<'a, T: Deserialize<'a>>(&'a self) -> Result<T, serde_cbor::Error> {
        serde_cbor::from_slice(self.0.as_ref())
    }

    /// Transform into a generic JSON structure that you can then traverse or query.
    pub fn json_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap()
    }

    /// Printable representation of this stored object as JSON.
    pub fn json_string(&self) -> String {
        serde_json::to_string(&self).unwrap()
    }

    /// Construct a Payload consisting only of the `null` value.
    pub fn null() -> Payload {
        Payload::from_json_value(serde_json::Value::Null).unwrap()
    }

    /// Rough estimate of the in-memory size of the contained opaque value
    pub fn rough_size(&self) -> usize {
        self.0.rough_size()
    }

    /// Only to be used from tests, since it has bad performance due to the JSON -> CBOR roundtrip.
    pub fn from_json_value(v: serde_json::Value) -> Result<Payload, String> {
        let text = serde_json::to_string(&v).unwrap();
        Payload::from_json_str(&text)
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Opaque::from_bytes(bytes))
    }
}

impl Default for Payload {
    fn default() -> Self {
        Payload::null()
    }
}

impl Debug for Payload {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.json_string())
    }
}

/// The metadata accompanying an event's payload: its wall-clock timestamp (as observed
/// by the emitting node) and the tags it was published with.
#[derive(Debug, Default, Serialize, Deserialize, Clone, Ord, PartialOrd, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub timestamp: TimeStamp,
    pub tags: TagSet,
}

/// The total order key of an event: Lamport timestamp first (establishing causal
/// order), then stream (breaking ties between concurrently emitted events), then
/// offset (redundant with the stream's own monotonic sequence, kept for convenience).
///
/// Sorting events by `EventKey` gives the single global order the Fish Event Store
/// folds over.
#[derive(Copy, Debug, Serialize, Deserialize, Clone, Ord, PartialOrd, Eq, PartialEq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct EventKey {
    pub lamport: LamportTimestamp,
    pub stream: StreamId,
    pub offset: Offset,
}

impl Default for EventKey {
    fn default() -> Self {
        Self {
            lamport: Default::default(),
            stream: StreamId::min(),
            offset: Default::default(),
        }
    }
}

impl EventKey {
    /// The smallest possible `EventKey`, strictly less than or equal to any
    /// real event's key. Used as the "drop everything" argument to
    /// `SnapshotStore::invalidate`.
    pub fn zero() -> Self {
        Self::default()
    }
}

/// An event together with its ordering key and metadata.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Event<T> {
    pub key: EventKey,
    pub meta: Metadata,
    pub payload: T,
}

impl<T> Event<T> {
    pub fn from_payload(payload: T) -> Self {
        Self {
            key: Default::default(),
            meta: Default::default(),
            payload,
        }
    }

    pub fn with_payload<U>(self, payload: U) -> Event<U> {
        Event {
            key: self.key,
            meta: self.meta,
            payload,
        }
    }
}

impl<T> Ord for Event<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl<T> PartialOrd for Event<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Event<T> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl<T> Eq for Event<T> {}

impl Event<Payload> {
    /// Lift a typed fold event out of the opaque payload, cloning only the parts that
    /// survive the deserialization.
    pub fn extract<'a, T>(&'a self) -> Result<Event<T>, serde_cbor::Error>
    where
        T: Deserialize<'a> + Clone,
    {
        Ok(Event {
            key: self.key,
            meta: self.meta.clone(),
            payload: self.payload.extract()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::TryFrom;

    #[test]
    fn payload_json_roundtrip() {
        let p = Payload::from_json_value(serde_json::json!({"a": 1, "b": [true, null]})).unwrap();
        assert_eq!(p.json_value(), serde_json::json!({"a": 1, "b": [true, null]}));
    }

    #[test]
    fn payload_compact_extract_roundtrip() {
        #[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
        struct Foo {
            x: u32,
        }
        let p = Payload::compact(&Foo { x: 42 }).unwrap();
        let foo: Foo = p.extract().unwrap();
        assert_eq!(foo, Foo { x: 42 });
    }

    #[test]
    fn events_compare_by_key_only() {
        let mut a = Event::from_payload(1u32);
        a.key.lamport = LamportTimestamp::from(1);
        let mut b = a.clone().with_payload(2u32);
        assert_eq!(a, b); // same key, different payload: still equal
        b.key.lamport = LamportTimestamp::from(2);
        assert!(a < b);
    }

    #[test]
    fn event_key_default_is_parseable_stream() {
        let key = EventKey::default();
        assert_eq!(key.stream, StreamId::try_from(key.stream.to_string().as_str()).unwrap());
    }
}
