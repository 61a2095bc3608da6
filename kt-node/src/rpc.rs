// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! Framed TCP listener dispatching §6's Admin and Directory RPCs onto
//! [`Service`], grounded on `node-lib::api::io`'s `MessageReader`/
//! `MessageWriter` pair (adapted here to `tokio::net::TcpStream` directly,
//! since this service has no unix-socket requirement and so no need for
//! `async-compat`'s futures/tokio bridge).

use std::net::SocketAddr;

use kt_core::{Directory, DirectoryId, EntryUpdate, UserId};
use serde::{Deserialize, Serialize};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::error::ApiError;
use crate::service::Service;
use crate::wire::{decode_payload, encode_payload, FrameReader, FrameWriter, MethodKind, RequestHeaders, ResponseHeaders, StatusKind, WireError};

#[derive(Serialize, Deserialize)]
pub struct CreateDirectoryRequest {
    pub directory_id: DirectoryId,
    pub min_interval_ms: Option<u64>,
    pub max_interval_ms: Option<u64>,
    pub skip_empty_revisions: Option<bool>,
}

#[derive(Serialize, Deserialize)]
pub struct GetDirectoryRequest {
    pub directory_id: DirectoryId,
}

#[derive(Serialize, Deserialize)]
pub struct GarbageCollectRequest {
    pub grace_period_ms: u64,
}

#[derive(Serialize, Deserialize)]
pub struct GarbageCollectResponse {
    pub removed: Vec<DirectoryId>,
}

#[derive(Serialize, Deserialize)]
pub struct GetUserRequest {
    pub directory_id: DirectoryId,
    pub user_id: Vec<u8>,
    pub last_verified_tree_size: Option<u64>,
}

#[derive(Serialize, Deserialize)]
pub struct BatchGetUserRequest {
    pub directory_id: DirectoryId,
    pub user_ids: Vec<Vec<u8>>,
}

#[derive(Serialize, Deserialize)]
pub struct GetRevisionRequest {
    pub directory_id: DirectoryId,
    pub revision_number: u64,
    pub last_verified_tree_size: Option<u64>,
}

#[derive(Serialize, Deserialize)]
pub struct ListMutationsRequest {
    pub directory_id: DirectoryId,
    pub revision_number: u64,
    pub page_token: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Serialize, Deserialize)]
pub struct ListDroppedMutationsRequest {
    pub directory_id: DirectoryId,
    pub revision_number: u64,
}

#[derive(Serialize, Deserialize)]
pub struct ListEntryHistoryRequest {
    pub directory_id: DirectoryId,
    pub user_id: Vec<u8>,
    pub start_revision: u64,
    pub end_revision: u64,
    pub page_token: Option<usize>,
    pub page_size: Option<usize>,
}

#[derive(Serialize, Deserialize)]
pub struct ListUserRevisionsRequest {
    pub directory_id: DirectoryId,
    pub user_ids: Vec<Vec<u8>>,
    pub start_revision: u64,
    pub end_revision: u64,
    pub page_size: Option<usize>,
}

#[derive(Serialize, Deserialize)]
pub struct QueueEntryUpdateRequest {
    pub directory_id: DirectoryId,
    pub update: EntryUpdate,
}

#[derive(Serialize, Deserialize)]
pub struct QueueEntryUpdateResponse {
    pub seq: u64,
}

#[derive(Serialize, Deserialize)]
pub struct BatchQueueUserUpdateRequest {
    pub directory_id: DirectoryId,
    pub updates: Vec<EntryUpdate>,
}

#[derive(Serialize, Deserialize)]
pub struct BatchQueueUserUpdateResponse {
    pub results: Vec<Result<u64, ApiError>>,
}

/// Runs the framed RPC listener until `shutdown` fires (§5 "single logical
/// process owns the socket"). Each accepted connection is served on its
/// own task so a slow or streaming client never head-of-line blocks
/// another.
#[instrument(name = "rpc subroutine", skip(service, shutdown))]
pub async fn routine(listen: SocketAddr, service: Service, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen).await?;
    info!(%listen, "RPC listener bound");
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("RPC listener shutting down");
                    return Ok(());
                }
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                service.touch();
                let service = service.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_connection(stream, service, shutdown).await {
                        warn!(%peer, error = %e, "RPC connection closed with error");
                    }
                });
            }
        }
    }
}

async fn serve_connection(stream: TcpStream, service: Service, mut shutdown: watch::Receiver<bool>) -> Result<(), WireError> {
    let (read_half, write_half) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let mut writer = FrameWriter::new(write_half);

    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            frame = reader.read_frame::<RequestHeaders>() => frame?,
        };
        let Some((headers, payload)) = frame else { return Ok(()) };

        if matches!(headers.method, MethodKind::GetRevisionStream | MethodKind::ListMutationsStream) {
            stream_revisions(&headers, &payload, &service, &mut writer, &mut shutdown).await?;
            continue;
        }

        let (status, response_payload) = dispatch(headers.method, &payload, &service).await;
        let response_headers = ResponseHeaders { request_id: headers.request_id, status };
        writer.write_frame(&response_headers, &response_payload).await?;
    }
}

async fn stream_revisions(
    headers: &RequestHeaders,
    payload: &[u8],
    service: &Service,
    writer: &mut FrameWriter<tokio::net::tcp::OwnedWriteHalf>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), WireError> {
    let directory_id: GetDirectoryRequest = match decode_payload(payload) {
        Ok(v) => v,
        Err(_) => {
            let err = ApiError { kind: StatusKind::InvalidArgument, message: "malformed directory_id payload".into() };
            writer
                .write_frame(
                    &ResponseHeaders { request_id: headers.request_id, status: StatusKind::InvalidArgument },
                    &encode_payload(&err),
                )
                .await?;
            return Ok(());
        },
    };
    let mut revisions = match service.subscribe_revisions(&directory_id.directory_id).await {
        Ok(rx) => rx,
        Err(e) => {
            let api_err: ApiError = e.into();
            writer
                .write_frame(&ResponseHeaders { request_id: headers.request_id, status: api_err.kind }, &encode_payload(&api_err))
                .await?;
            return Ok(());
        },
    };
    loop {
        tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            received = revisions.recv() => {
                match received {
                    Ok(revision) => {
                        let body = encode_payload(&revision);
                        writer
                            .write_frame(&ResponseHeaders { request_id: headers.request_id, status: StatusKind::Ok }, &body)
                            .await?;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "revision stream subscriber lagged, continuing from latest");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return Ok(()),
                }
            }
        }
    }
}

async fn dispatch(method: MethodKind, payload: &[u8], service: &Service) -> (StatusKind, Vec<u8>) {
    let result = handle(method, payload, service).await;
    match result {
        Ok(body) => (StatusKind::Ok, body),
        Err(err) => (err.kind, encode_payload(&err)),
    }
}

async fn handle(method: MethodKind, payload: &[u8], service: &Service) -> Result<Vec<u8>, ApiError> {
    fn bad_request(msg: &str) -> ApiError {
        ApiError { kind: StatusKind::InvalidArgument, message: msg.to_string() }
    }

    match method {
        MethodKind::ListDirectories => Ok(encode_payload(&service.list_directories())),
        MethodKind::GetDirectory => {
            let req: GetDirectoryRequest = decode_payload(payload).map_err(|_| bad_request("malformed request"))?;
            let dir: Directory = service.get_directory(&req.directory_id).map_err(Into::<ApiError>::into)?;
            Ok(encode_payload(&dir))
        },
        MethodKind::CreateDirectory => {
            let req: CreateDirectoryRequest = decode_payload(payload).map_err(|_| bad_request("malformed request"))?;
            let dir = service
                .create_directory(
                    req.directory_id,
                    req.min_interval_ms.map(std::time::Duration::from_millis),
                    req.max_interval_ms.map(std::time::Duration::from_millis),
                    req.skip_empty_revisions,
                )
                .await
                .map_err(Into::<ApiError>::into)?;
            Ok(encode_payload(&dir))
        },
        MethodKind::DeleteDirectory => {
            let req: GetDirectoryRequest = decode_payload(payload).map_err(|_| bad_request("malformed request"))?;
            service.delete_directory(&req.directory_id).await.map_err(Into::<ApiError>::into)?;
            Ok(Vec::new())
        },
        MethodKind::UndeleteDirectory => {
            let req: GetDirectoryRequest = decode_payload(payload).map_err(|_| bad_request("malformed request"))?;
            let dir = service.undelete_directory(&req.directory_id).await.map_err(Into::<ApiError>::into)?;
            Ok(encode_payload(&dir))
        },
        MethodKind::GarbageCollect => {
            let req: GarbageCollectRequest = decode_payload(payload).map_err(|_| bad_request("malformed request"))?;
            let removed = service.garbage_collect(std::time::Duration::from_millis(req.grace_period_ms)).await;
            Ok(encode_payload(&GarbageCollectResponse { removed }))
        },
        MethodKind::GetUser => {
            let req: GetUserRequest = decode_payload(payload).map_err(|_| bad_request("malformed request"))?;
            let resp = service
                .get_user(&req.directory_id, &req.user_id, req.last_verified_tree_size)
                .await
                .map_err(Into::<ApiError>::into)?;
            Ok(encode_payload(&resp))
        },
        MethodKind::BatchGetUser => {
            let req: BatchGetUserRequest = decode_payload(payload).map_err(|_| bad_request("malformed request"))?;
            let user_ids: Vec<UserId> = req.user_ids.into_iter().map(UserId::from).collect();
            let resp = service.batch_get_user(&req.directory_id, &user_ids).await.map_err(Into::<ApiError>::into)?;
            Ok(encode_payload(&resp))
        },
        MethodKind::BatchGetUserIndex => {
            let req: BatchGetUserRequest = decode_payload(payload).map_err(|_| bad_request("malformed request"))?;
            let user_ids: Vec<UserId> = req.user_ids.into_iter().map(UserId::from).collect();
            let resp =
                service.batch_get_user_index(&req.directory_id, &user_ids).await.map_err(Into::<ApiError>::into)?;
            Ok(encode_payload(&resp))
        },
        MethodKind::GetRevision => {
            let req: GetRevisionRequest = decode_payload(payload).map_err(|_| bad_request("malformed request"))?;
            let resp = service
                .get_revision(&req.directory_id, req.revision_number, req.last_verified_tree_size)
                .await
                .map_err(Into::<ApiError>::into)?;
            Ok(encode_payload(&resp))
        },
        MethodKind::GetLatestRevision => {
            let req: GetUserRequest = decode_payload(payload).map_err(|_| bad_request("malformed request"))?;
            let resp = service
                .get_latest_revision(&req.directory_id, req.last_verified_tree_size)
                .await
                .map_err(Into::<ApiError>::into)?;
            Ok(encode_payload(&resp))
        },
        MethodKind::ListMutations => {
            let req: ListMutationsRequest = decode_payload(payload).map_err(|_| bad_request("malformed request"))?;
            let resp = service
                .list_mutations(&req.directory_id, req.revision_number, req.page_token.unwrap_or(0), req.page_size.unwrap_or(100))
                .await
                .map_err(Into::<ApiError>::into)?;
            Ok(encode_payload(&resp))
        },
        MethodKind::ListDroppedMutations => {
            let req: ListDroppedMutationsRequest = decode_payload(payload).map_err(|_| bad_request("malformed request"))?;
            let dropped =
                service.list_dropped_mutations(&req.directory_id, req.revision_number).await.map_err(Into::<ApiError>::into)?;
            Ok(encode_payload(&dropped))
        },
        MethodKind::ListEntryHistory => {
            let req: ListEntryHistoryRequest = decode_payload(payload).map_err(|_| bad_request("malformed request"))?;
            let page = service
                .list_entry_history(
                    &req.directory_id,
                    &req.user_id,
                    req.start_revision,
                    req.end_revision,
                    req.page_token.unwrap_or(0),
                    req.page_size.unwrap_or(100),
                )
                .await
                .map_err(Into::<ApiError>::into)?;
            Ok(encode_payload(&page))
        },
        MethodKind::ListUserRevisions => {
            let req: ListUserRevisionsRequest = decode_payload(payload).map_err(|_| bad_request("malformed request"))?;
            let user_ids: Vec<UserId> = req.user_ids.into_iter().map(UserId::from).collect();
            let results = service
                .batch_list_user_revisions(&req.directory_id, &user_ids, req.start_revision, req.end_revision, req.page_size.unwrap_or(100))
                .await
                .map_err(Into::<ApiError>::into)?;
            Ok(encode_payload(&results))
        },
        MethodKind::QueueEntryUpdate => {
            let req: QueueEntryUpdateRequest = decode_payload(payload).map_err(|_| bad_request("malformed request"))?;
            let seq = service.queue_entry_update(&req.directory_id, req.update).await.map_err(Into::<ApiError>::into)?;
            Ok(encode_payload(&QueueEntryUpdateResponse { seq }))
        },
        MethodKind::BatchQueueUserUpdate => {
            let req: BatchQueueUserUpdateRequest = decode_payload(payload).map_err(|_| bad_request("malformed request"))?;
            let results = service
                .batch_queue_user_update(&req.directory_id, req.updates)
                .await
                .into_iter()
                .map(|r| r.map_err(Into::<ApiError>::into))
                .collect();
            Ok(encode_payload(&BatchQueueUserUpdateResponse { results }))
        },
        MethodKind::GetRevisionStream | MethodKind::ListMutationsStream => {
            unreachable!("streaming methods are dispatched by serve_connection directly")
        },
        MethodKind::Unknown(code) => Err(ApiError { kind: StatusKind::InvalidArgument, message: format!("unknown method {code}") }),
    }
}

