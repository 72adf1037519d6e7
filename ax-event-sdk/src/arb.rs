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
//! `quickcheck::Arbitrary` implementations for the event vocabulary, gated behind the
//! `arb` feature so downstream crates can generate fixtures without pulling in
//! `quickcheck`/`rand` in non-test builds.
use std::{collections::BTreeMap, convert::TryFrom};

use quickcheck::{Arbitrary, Gen};

use crate::{
    event::{EventKey, Metadata},
    scalars::{NodeId, StreamId, StreamNr},
    tags::{Tag, TagSet},
    timestamp::{LamportTimestamp, TimeStamp},
    Offset, OffsetMap, OffsetOrMin,
};

impl Arbitrary for NodeId {
    fn arbitrary(g: &mut Gen) -> Self {
        let mut bytes = [0u8; 32];
        for b in &mut bytes {
            *b = u8::arbitrary(g);
        }
        NodeId(bytes)
    }
}

impl Arbitrary for StreamNr {
    fn arbitrary(g: &mut Gen) -> Self {
        u64::arbitrary(g).into()
    }
}

impl Arbitrary for StreamId {
    fn arbitrary(g: &mut Gen) -> Self {
        Self {
            node_id: NodeId::arbitrary(g),
            stream_nr: StreamNr::arbitrary(g),
        }
    }
}

impl Arbitrary for Offset {
    fn arbitrary(g: &mut Gen) -> Self {
        let offset: u32 = Arbitrary::arbitrary(g);
        Self::from(offset)
    }
}

impl Arbitrary for OffsetOrMin {
    fn arbitrary(g: &mut Gen) -> Self {
        if bool::arbitrary(g) {
            let offset: Offset = Arbitrary::arbitrary(g);
            Self::from(offset)
        } else {
            OffsetOrMin::MIN
        }
    }
}

impl Arbitrary for OffsetMap {
    fn arbitrary(g: &mut Gen) -> Self {
        let inner: BTreeMap<StreamId, Offset> = Arbitrary::arbitrary(g);
        Self::from(inner)
    }
}

impl Arbitrary for LamportTimestamp {
    fn arbitrary(g: &mut Gen) -> Self {
        LamportTimestamp::from(u64::arbitrary(g) >> 1) // keep headroom for incr() in tests
    }
}

impl Arbitrary for TimeStamp {
    fn arbitrary(g: &mut Gen) -> Self {
        TimeStamp::new(u64::arbitrary(g))
    }
}

impl Arbitrary for Tag {
    fn arbitrary(g: &mut Gen) -> Self {
        let len = 1 + usize::arbitrary(g) % 8;
        let s: String = (0..len)
            .map(|_| *g.choose(b"abcdefghijklmnop").unwrap() as char)
            .collect();
        Tag::try_from(s.as_str()).unwrap()
    }
}

impl Arbitrary for TagSet {
    fn arbitrary(g: &mut Gen) -> Self {
        let tags: Vec<Tag> = Arbitrary::arbitrary(g);
        TagSet::from(tags)
    }
}

impl Arbitrary for EventKey {
    fn arbitrary(g: &mut Gen) -> Self {
        Self {
            lamport: Arbitrary::arbitrary(g),
            stream: Arbitrary::arbitrary(g),
            offset: Arbitrary::arbitrary(g),
        }
    }
}

impl Arbitrary for Metadata {
    fn arbitrary(g: &mut Gen) -> Self {
        Self {
            timestamp: Arbitrary::arbitrary(g),
            tags: Arbitrary::arbitrary(g),
        }
    }
}
