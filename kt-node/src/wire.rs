// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Framed message format for the Directory/Admin services over a raw TCP
//! socket (§6), grounded on `node-lib::api::wire_types`: a 4-byte
//! big-endian length prefix, a `minicbor`-encoded header carrying the
//! method kind and a request id, followed by a payload.
//!
//! Unlike `node-lib`, whose payloads are a closed, P2P-specific set
//! (`Announce`, `RequestPull`), this service's payloads are the deeply
//! nested proof structures of §3/§4 (`SignedEntry`, `MapLeaf`,
//! `MutationProof`, …) that already derive `serde::Serialize` /
//! `Deserialize` for the HTTP gateway (§6 "HTTP gateway mapping"). Rather
//! than hand-author a second `minicbor::Encode`/`Decode` impl for every one
//! of those types, the payload bytes are the same JSON encoding the
//! gateway uses; only the envelope (length prefix + header) is
//! `minicbor`, matching `node-lib`'s framing shape.

use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ApiError, StatusKind};

/// Opaque per-connection request id, matching a response to its request
/// when a connection carries more than one in flight.
#[derive(Clone, Copy, Debug, Eq, PartialEq, minicbor::Encode, minicbor::Decode)]
#[cbor(transparent)]
pub struct RequestId(#[n(0)] pub u64);

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

impl RequestId {
    pub fn next() -> Self {
        Self(NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The Admin and Directory service methods of §6, flattened into one
/// wire-level enum (mirroring `node-lib::api::wire_types::request::Kind`'s
/// "encode/decode maps to a small integer" shape).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MethodKind {
    ListDirectories,
    GetDirectory,
    CreateDirectory,
    DeleteDirectory,
    UndeleteDirectory,
    GarbageCollect,
    GetUser,
    BatchGetUser,
    BatchGetUserIndex,
    GetRevision,
    GetLatestRevision,
    ListMutations,
    ListDroppedMutations,
    ListEntryHistory,
    ListUserRevisions,
    QueueEntryUpdate,
    BatchQueueUserUpdate,
    /// Long-lived: after the initial request, the server keeps writing
    /// `Response` frames (one per published revision) until the
    /// connection closes (§4.E `GetRevisionStream`, §9 back-pressure note).
    GetRevisionStream,
    ListMutationsStream,
    Unknown(u8),
}

impl minicbor::Encode for MethodKind {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        let val: u8 = match self {
            Self::ListDirectories => 1,
            Self::GetDirectory => 2,
            Self::CreateDirectory => 3,
            Self::DeleteDirectory => 4,
            Self::UndeleteDirectory => 5,
            Self::GarbageCollect => 6,
            Self::GetUser => 7,
            Self::BatchGetUser => 8,
            Self::BatchGetUserIndex => 9,
            Self::GetRevision => 10,
            Self::GetLatestRevision => 11,
            Self::ListMutations => 12,
            Self::ListEntryHistory => 13,
            Self::ListUserRevisions => 14,
            Self::QueueEntryUpdate => 15,
            Self::BatchQueueUserUpdate => 16,
            Self::GetRevisionStream => 17,
            Self::ListMutationsStream => 18,
            Self::ListDroppedMutations => 19,
            Self::Unknown(other) => *other,
        };
        e.u8(val)?;
        Ok(())
    }
}

impl<'b> minicbor::Decode<'b> for MethodKind {
    fn decode(d: &mut minicbor::Decoder<'b>) -> Result<Self, minicbor::decode::Error> {
        Ok(match d.u8()? {
            1 => Self::ListDirectories,
            2 => Self::GetDirectory,
            3 => Self::CreateDirectory,
            4 => Self::DeleteDirectory,
            5 => Self::UndeleteDirectory,
            6 => Self::GarbageCollect,
            7 => Self::GetUser,
            8 => Self::BatchGetUser,
            9 => Self::BatchGetUserIndex,
            10 => Self::GetRevision,
            11 => Self::GetLatestRevision,
            12 => Self::ListMutations,
            13 => Self::ListEntryHistory,
            14 => Self::ListUserRevisions,
            15 => Self::QueueEntryUpdate,
            16 => Self::BatchQueueUserUpdate,
            17 => Self::GetRevisionStream,
            18 => Self::ListMutationsStream,
            19 => Self::ListDroppedMutations,
            other => Self::Unknown(other),
        })
    }
}

#[derive(Clone, Debug, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct RequestHeaders {
    #[n(0)]
    pub request_id: RequestId,
    #[n(1)]
    pub method: MethodKind,
}

#[derive(Clone, Debug, minicbor::Encode, minicbor::Decode)]
#[cbor(map)]
pub struct ResponseHeaders {
    #[n(0)]
    pub request_id: RequestId,
    #[n(1)]
    pub status: StatusKind,
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("connection closed")]
    Closed,
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("error decoding frame header")]
    DecodeFailed(#[from] minicbor::decode::Error),
    #[error("error decoding payload as JSON")]
    BadPayload(#[from] serde_json::Error),
    #[error("frame carries no payload where one was expected")]
    MissingPayload,
}

/// Reads length-prefixed `(header, payload)` frames off `reader`.
pub struct FrameReader<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Reads one frame, returning `Ok(None)` on a clean EOF between
    /// frames (the connection was closed, not mid-message).
    pub async fn read_frame<H: for<'b> minicbor::Decode<'b>>(&mut self) -> Result<Option<(H, Vec<u8>)>, WireError> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf).await {
            Ok(_) => {},
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut buf = vec![0u8; len];
        self.reader.read_exact(&mut buf).await?;
        let mut decoder = minicbor::Decoder::new(&buf);
        let headers: H = decoder.decode()?;
        let payload = buf[decoder.position()..].to_vec();
        Ok(Some((headers, payload)))
    }
}

/// Writes length-prefixed `(header, payload)` frames to `writer`.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub async fn write_frame<H: minicbor::Encode>(&mut self, headers: &H, payload: &[u8]) -> Result<(), WireError> {
        let mut header_bytes = Vec::new();
        minicbor::encode(headers, &mut header_bytes).expect("header encoding is infallible");
        let mut frame = Vec::with_capacity(4 + header_bytes.len() + payload.len());
        frame.extend_from_slice(&(header_bytes.len() as u32 + payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&header_bytes);
        frame.extend_from_slice(payload);
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Serializes `value` as the JSON payload used for every request/response
/// body on the wire (see module doc comment for why JSON rather than a
/// bespoke `minicbor` schema per method).
pub fn encode_payload<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).expect("payload serialization is infallible")
}

pub fn decode_payload<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, WireError> {
    if bytes.is_empty() {
        return Err(WireError::MissingPayload);
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// An error response's payload (§7): every non-`Ok` status carries an
/// [`ApiError`] as its JSON payload.
pub fn encode_error(err: ApiError) -> Vec<u8> {
    encode_payload(&err)
}
