// Copyright © 2026 Key Transparency Contributors
// SPDX-License-Identifier: Apache-2.0

//! The HTTP/JSON gateway of §6, grounded on `seed::frontend`'s `warp`
//! wiring — the only `warp` user in the corpus. Routes map one-to-one onto
//! the same [`Service`] methods [`crate::rpc`] dispatches onto, so the two
//! transports never drift: this module is just a second encoding of the
//! calls `rpc.rs` already makes.
//!
//! Revisions stream over Server-Sent Events the way `seed::frontend`
//! streams its own `Event` feed, built from a [`BroadcastStream`] over
//! [`Service::subscribe_revisions`].

use std::convert::Infallible;
use std::net::SocketAddr;

use futures::StreamExt as _;
use kt_core::{DirectoryId, EntryUpdate, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, instrument};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::error::{ApiError, StatusKind};
use crate::service::Service;

fn status_code(kind: StatusKind) -> StatusCode {
    match kind {
        StatusKind::Ok => StatusCode::OK,
        StatusKind::InvalidArgument => StatusCode::BAD_REQUEST,
        StatusKind::UnauthorizedMutation => StatusCode::FORBIDDEN,
        StatusKind::PreviousMismatch | StatusKind::CommitmentMismatch => StatusCode::CONFLICT,
        StatusKind::NotFound => StatusCode::NOT_FOUND,
        StatusKind::OutOfRange => StatusCode::RANGE_NOT_SATISFIABLE,
        StatusKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        StatusKind::Cancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        StatusKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        StatusKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn err_reply(err: impl Into<ApiError>) -> warp::reply::WithStatus<warp::reply::Json> {
    let err: ApiError = err.into();
    warp::reply::with_status(warp::reply::json(&err), status_code(err.kind))
}

fn ok_reply<T: Serialize>(value: &T) -> warp::reply::WithStatus<warp::reply::Json> {
    warp::reply::with_status(warp::reply::json(value), StatusCode::OK)
}

fn decode_user_id(encoded: &str) -> Result<UserId, ApiError> {
    base64::decode_config(encoded, base64::URL_SAFE_NO_PAD)
        .map(UserId::from)
        .map_err(|e| ApiError { kind: StatusKind::InvalidArgument, message: format!("invalid base64 user id: {e}") })
}

fn with_service(service: Service) -> impl Filter<Extract = (Service,), Error = Infallible> + Clone {
    warp::any().map(move || {
        service.touch();
        service.clone()
    })
}

#[derive(Deserialize)]
struct TreeSizeQuery {
    last_verified_tree_size: Option<u64>,
}

#[derive(Deserialize)]
struct PageQuery {
    page_token: Option<usize>,
    page_size: Option<usize>,
}

#[derive(Deserialize)]
struct HistoryQuery {
    start_revision: u64,
    end_revision: u64,
    page_token: Option<usize>,
    page_size: Option<usize>,
}

#[derive(Deserialize)]
struct CreateDirectoryBody {
    directory_id: DirectoryId,
    min_interval_ms: Option<u64>,
    max_interval_ms: Option<u64>,
    skip_empty_revisions: Option<bool>,
}

#[derive(Deserialize)]
struct GarbageCollectBody {
    grace_period_ms: u64,
}

#[derive(Serialize)]
struct GarbageCollectResponse {
    removed: Vec<DirectoryId>,
}

#[derive(Deserialize)]
struct BatchGetUserBody {
    user_ids: Vec<Vec<u8>>,
}

#[derive(Deserialize)]
struct BatchListUserRevisionsBody {
    user_ids: Vec<Vec<u8>>,
    start_revision: u64,
    end_revision: u64,
    page_size: Option<usize>,
}

#[derive(Deserialize)]
struct QueueEntryUpdateBody {
    update: EntryUpdate,
}

#[derive(Serialize)]
struct QueueEntryUpdateResponse {
    seq: u64,
}

#[derive(Deserialize)]
struct BatchQueueUserUpdateBody {
    updates: Vec<EntryUpdate>,
}

#[derive(Serialize)]
struct BatchQueueUserUpdateResponse {
    results: Vec<Result<u64, ApiError>>,
}

/// Builds every `/v1/...` route over `service` (§6's HTTP gateway mapping).
fn routes(service: Service) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let base = warp::path("v1").and(warp::path("directories"));
    let svc = with_service(service);

    let list_directories = base
        .clone()
        .and(warp::get())
        .and(warp::path::end())
        .and(svc.clone())
        .map(|service: Service| ok_reply(&service.list_directories()));

    let create_directory = base
        .clone()
        .and(warp::post())
        .and(warp::path::end())
        .and(warp::body::json())
        .and(svc.clone())
        .and_then(|body: CreateDirectoryBody, service: Service| async move {
            let result = service
                .create_directory(
                    body.directory_id,
                    body.min_interval_ms.map(std::time::Duration::from_millis),
                    body.max_interval_ms.map(std::time::Duration::from_millis),
                    body.skip_empty_revisions,
                )
                .await;
            Ok::<_, Infallible>(match result {
                Ok(dir) => ok_reply(&dir),
                Err(e) => err_reply(e),
            })
        });

    let garbage_collect = base
        .clone()
        .and(warp::path("gc"))
        .and(warp::post())
        .and(warp::path::end())
        .and(warp::body::json())
        .and(svc.clone())
        .and_then(|body: GarbageCollectBody, service: Service| async move {
            let removed = service.garbage_collect(std::time::Duration::from_millis(body.grace_period_ms)).await;
            Ok::<_, Infallible>(ok_reply(&GarbageCollectResponse { removed }))
        });

    let get_directory = base
        .clone()
        .and(warp::get())
        .and(warp::path::param::<DirectoryId>())
        .and(warp::path::end())
        .and(svc.clone())
        .map(|directory_id: DirectoryId, service: Service| match service.get_directory(&directory_id) {
            Ok(dir) => ok_reply(&dir),
            Err(e) => err_reply(e),
        });

    let delete_directory = base
        .clone()
        .and(warp::delete())
        .and(warp::path::param::<DirectoryId>())
        .and(warp::path::end())
        .and(svc.clone())
        .and_then(|directory_id: DirectoryId, service: Service| async move {
            Ok::<_, Infallible>(match service.delete_directory(&directory_id).await {
                Ok(()) => warp::reply::with_status(warp::reply::json(&()), StatusCode::NO_CONTENT),
                Err(e) => err_reply(e),
            })
        });

    let undelete_directory = base
        .clone()
        .and(warp::post())
        .and(warp::path::param::<DirectoryId>())
        .and(warp::path("undelete"))
        .and(warp::path::end())
        .and(svc.clone())
        .and_then(|directory_id: DirectoryId, service: Service| async move {
            Ok::<_, Infallible>(match service.undelete_directory(&directory_id).await {
                Ok(dir) => ok_reply(&dir),
                Err(e) => err_reply(e),
            })
        });

    let get_user = base
        .clone()
        .and(warp::get())
        .and(warp::path::param::<DirectoryId>())
        .and(warp::path("users"))
        .and(warp::path::param::<String>())
        .and(warp::path::end())
        .and(warp::query::<TreeSizeQuery>())
        .and(svc.clone())
        .and_then(|directory_id: DirectoryId, uid: String, query: TreeSizeQuery, service: Service| async move {
            Ok::<_, Infallible>(match decode_user_id(&uid) {
                Ok(user_id) => match service.get_user(&directory_id, user_id.as_ref(), query.last_verified_tree_size).await {
                    Ok(resp) => ok_reply(&resp),
                    Err(e) => err_reply(e),
                },
                Err(e) => err_reply(e),
            })
        });

    let batch_get_user = base
        .clone()
        .and(warp::post())
        .and(warp::path::param::<DirectoryId>())
        .and(warp::path("users:batchGet"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and(svc.clone())
        .and_then(|directory_id: DirectoryId, body: BatchGetUserBody, service: Service| async move {
            let user_ids: Vec<UserId> = body.user_ids.into_iter().map(UserId::from).collect();
            Ok::<_, Infallible>(match service.batch_get_user(&directory_id, &user_ids).await {
                Ok(resp) => ok_reply(&resp),
                Err(e) => err_reply(e),
            })
        });

    let batch_get_user_index = base
        .clone()
        .and(warp::post())
        .and(warp::path::param::<DirectoryId>())
        .and(warp::path("users:batchGetIndex"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and(svc.clone())
        .and_then(|directory_id: DirectoryId, body: BatchGetUserBody, service: Service| async move {
            let user_ids: Vec<UserId> = body.user_ids.into_iter().map(UserId::from).collect();
            Ok::<_, Infallible>(match service.batch_get_user_index(&directory_id, &user_ids).await {
                Ok(resp) => ok_reply(&resp),
                Err(e) => err_reply(e),
            })
        });

    let get_revision = base
        .clone()
        .and(warp::get())
        .and(warp::path::param::<DirectoryId>())
        .and(warp::path("revisions"))
        .and(warp::path::param::<u64>())
        .and(warp::path::end())
        .and(warp::query::<TreeSizeQuery>())
        .and(svc.clone())
        .and_then(|directory_id: DirectoryId, revision_number: u64, query: TreeSizeQuery, service: Service| async move {
            Ok::<_, Infallible>(match service.get_revision(&directory_id, revision_number, query.last_verified_tree_size).await {
                Ok(resp) => ok_reply(&resp),
                Err(e) => err_reply(e),
            })
        });

    let get_latest_revision = base
        .clone()
        .and(warp::get())
        .and(warp::path::param::<DirectoryId>())
        .and(warp::path("revisions:latest"))
        .and(warp::path::end())
        .and(warp::query::<TreeSizeQuery>())
        .and(svc.clone())
        .and_then(|directory_id: DirectoryId, query: TreeSizeQuery, service: Service| async move {
            Ok::<_, Infallible>(match service.get_latest_revision(&directory_id, query.last_verified_tree_size).await {
                Ok(resp) => ok_reply(&resp),
                Err(e) => err_reply(e),
            })
        });

    let list_mutations = base
        .clone()
        .and(warp::get())
        .and(warp::path::param::<DirectoryId>())
        .and(warp::path("revisions"))
        .and(warp::path::param::<u64>())
        .and(warp::path("mutations"))
        .and(warp::path::end())
        .and(warp::query::<PageQuery>())
        .and(svc.clone())
        .and_then(|directory_id: DirectoryId, revision_number: u64, query: PageQuery, service: Service| async move {
            let result =
                service.list_mutations(&directory_id, revision_number, query.page_token.unwrap_or(0), query.page_size.unwrap_or(100)).await;
            Ok::<_, Infallible>(match result {
                Ok(page) => ok_reply(&page),
                Err(e) => err_reply(e),
            })
        });

    let list_dropped_mutations = base
        .clone()
        .and(warp::get())
        .and(warp::path::param::<DirectoryId>())
        .and(warp::path("revisions"))
        .and(warp::path::param::<u64>())
        .and(warp::path("mutations:dropped"))
        .and(warp::path::end())
        .and(svc.clone())
        .and_then(|directory_id: DirectoryId, revision_number: u64, service: Service| async move {
            Ok::<_, Infallible>(match service.list_dropped_mutations(&directory_id, revision_number).await {
                Ok(dropped) => ok_reply(&dropped),
                Err(e) => err_reply(e),
            })
        });

    let list_entry_history = base
        .clone()
        .and(warp::get())
        .and(warp::path::param::<DirectoryId>())
        .and(warp::path("users"))
        .and(warp::path::param::<String>())
        .and(warp::path("history"))
        .and(warp::path::end())
        .and(warp::query::<HistoryQuery>())
        .and(svc.clone())
        .and_then(|directory_id: DirectoryId, uid: String, query: HistoryQuery, service: Service| async move {
            Ok::<_, Infallible>(match decode_user_id(&uid) {
                Ok(user_id) => {
                    let result = service
                        .list_entry_history(
                            &directory_id,
                            user_id.as_ref(),
                            query.start_revision,
                            query.end_revision,
                            query.page_token.unwrap_or(0),
                            query.page_size.unwrap_or(100),
                        )
                        .await;
                    match result {
                        Ok(page) => ok_reply(&page),
                        Err(e) => err_reply(e),
                    }
                },
                Err(e) => err_reply(e),
            })
        });

    let batch_list_user_revisions = base
        .clone()
        .and(warp::post())
        .and(warp::path::param::<DirectoryId>())
        .and(warp::path("users:batchListRevisions"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and(svc.clone())
        .and_then(|directory_id: DirectoryId, body: BatchListUserRevisionsBody, service: Service| async move {
            let user_ids: Vec<UserId> = body.user_ids.into_iter().map(UserId::from).collect();
            let result = service
                .batch_list_user_revisions(&directory_id, &user_ids, body.start_revision, body.end_revision, body.page_size.unwrap_or(100))
                .await;
            Ok::<_, Infallible>(match result {
                Ok(results) => ok_reply(&results),
                Err(e) => err_reply(e),
            })
        });

    let queue_entry_update = base
        .clone()
        .and(warp::post())
        .and(warp::path::param::<DirectoryId>())
        .and(warp::path("mutations:queue"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and(svc.clone())
        .and_then(|directory_id: DirectoryId, body: QueueEntryUpdateBody, service: Service| async move {
            Ok::<_, Infallible>(match service.queue_entry_update(&directory_id, body.update).await {
                Ok(seq) => ok_reply(&QueueEntryUpdateResponse { seq }),
                Err(e) => err_reply(e),
            })
        });

    let batch_queue_user_update = base
        .clone()
        .and(warp::post())
        .and(warp::path::param::<DirectoryId>())
        .and(warp::path("mutations:batchQueue"))
        .and(warp::path::end())
        .and(warp::body::json())
        .and(svc.clone())
        .and_then(|directory_id: DirectoryId, body: BatchQueueUserUpdateBody, service: Service| async move {
            let results =
                service.batch_queue_user_update(&directory_id, body.updates).await.into_iter().map(|r| r.map_err(Into::into)).collect();
            Ok::<_, Infallible>(ok_reply(&BatchQueueUserUpdateResponse { results }))
        });

    let stream_revisions = base
        .clone()
        .and(warp::get())
        .and(warp::path::param::<DirectoryId>())
        .and(warp::path("revisions:stream"))
        .and(warp::path::end())
        .and(svc.clone())
        .and_then(|directory_id: DirectoryId, service: Service| async move {
            let receiver = service.subscribe_revisions(&directory_id).await;
            let response = match receiver {
                Ok(receiver) => {
                    let events = BroadcastStream::new(receiver).filter_map(|item| async move {
                        match item {
                            Ok(revision) => Some(warp::sse::Event::default().json_data(revision)),
                            Err(_lagged) => None,
                        }
                    });
                    warp::sse::reply(warp::sse::keep_alive().stream(events)).into_response()
                },
                Err(e) => err_reply(e).into_response(),
            };
            Ok::<_, Infallible>(response)
        });

    list_directories
        .or(create_directory)
        .or(garbage_collect)
        .or(get_directory)
        .or(delete_directory)
        .or(undelete_directory)
        .or(get_user)
        .or(batch_get_user)
        .or(batch_get_user_index)
        .or(get_revision)
        .or(get_latest_revision)
        .or(list_mutations)
        .or(list_dropped_mutations)
        .or(list_entry_history)
        .or(batch_list_user_revisions)
        .or(queue_entry_update)
        .or(batch_queue_user_update)
        .or(stream_revisions)
}

/// Runs the HTTP gateway until `shutdown` fires, mirroring [`crate::rpc::routine`]'s
/// shutdown contract (§5).
#[instrument(name = "gateway subroutine", skip(service, shutdown))]
pub async fn routine(listen: SocketAddr, service: Service, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let (addr, server) = warp::serve(routes(service)).bind_with_graceful_shutdown(listen, async move {
        let _ = shutdown.changed().await;
    });
    info!(%addr, "gateway listener bound");
    server.await;
    Ok(())
}
