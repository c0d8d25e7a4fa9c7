// dispatch.rs - the command interceptor in front of the transport

use crate::api::{ApiError, ApiResponse, Command, Query};
use crate::queue::CommandQueue;
use crate::store::StoreError;
use crate::transport::{Transport, TransportError};
use crate::{Notice, ViewHook, NOTICE_QUEUED_OFFLINE, NOTICE_QUEUE_UNAVAILABLE};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Failure of a read. Reads are the honest path: transport trouble and
/// malformed responses both reach the caller.
#[derive(Debug, Error)]
pub enum ReadError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Malformed(#[from] ApiError),
}

/// Wraps every outbound command. Mutations that cannot reach the service are
/// queued and masked with a synthetic success so the caller never blocks on
/// connectivity; reads pass failures through unchanged.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    queue: Arc<CommandQueue>,
    hook: Arc<dyn ViewHook>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        queue: Arc<CommandQueue>,
        hook: Arc<dyn ViewHook>,
    ) -> Self {
        Self {
            transport,
            queue,
            hook,
        }
    }

    /// Send a mutating command.
    ///
    /// On transport success the real response is returned unchanged; this is
    /// the only path that carries a server payload. On transport failure the
    /// command body is appended to the queue (best-effort; a storage failure
    /// is swallowed after a warning) and the caller receives
    /// `{"ok": true, "offline": true}`.
    #[instrument(skip(self, command), fields(action = command.name()))]
    pub async fn dispatch(&self, command: Command) -> Result<ApiResponse, ApiError> {
        let body = command.to_body()?;

        match self.transport.call(&body).await {
            Ok(response) => {
                debug!("command delivered");
                Ok(response)
            }
            Err(err) => {
                debug!(error = %err, "transport failed, deferring command");
                match self.queue.append(body).await {
                    Ok(depth) => {
                        info!(depth, "command queued for replay");
                        self.hook.notice(Notice::info(NOTICE_QUEUED_OFFLINE));
                    }
                    Err(StoreError::QueueFull { capacity }) => {
                        warn!(capacity, "offline queue full, command dropped");
                        self.hook.notice(Notice::warning(NOTICE_QUEUE_UNAVAILABLE));
                    }
                    Err(store_err) => {
                        warn!(error = %store_err, "offline queue unavailable, command dropped");
                        self.hook.notice(Notice::warning(NOTICE_QUEUE_UNAVAILABLE));
                    }
                }
                Ok(ApiResponse::offline())
            }
        }
    }

    /// Send a read. Never queued; failure propagates.
    #[instrument(skip(self, query), fields(action = query.name()))]
    pub async fn query(&self, query: Query) -> Result<ApiResponse, TransportError> {
        self.transport.call(&query.to_body()).await
    }

    /// Read and decode a whole-body projection.
    pub async fn fetch<T: DeserializeOwned>(&self, query: Query) -> Result<T, ReadError> {
        let response = self.query(query).await?;
        Ok(response.parse()?)
    }

    /// Read and decode the rows under `data`.
    pub async fn fetch_rows<T: DeserializeOwned>(&self, query: Query) -> Result<Vec<T>, ReadError> {
        let response = self.query(query).await?;
        Ok(response.rows()?)
    }
}
