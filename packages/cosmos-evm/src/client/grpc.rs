use std::{sync::Arc, time::Duration};

use cosmos_sdk_proto::cosmos::{
    auth::v1beta1::QueryAccountRequest,
    bank::v1beta1::QueryAllBalancesRequest,
    base::{query::v1beta1::PageRequest, v1beta1::Coin},
    tx::v1beta1::{BroadcastTxRequest, SimulateRequest},
};
use once_cell::sync::OnceCell;
use tonic::{
    async_trait,
    transport::{Channel, ClientTlsConfig, Endpoint},
};

use crate::account::{decode_account, AccountState};
use crate::broadcast::{BroadcastMode, NativeTxResponse};
use crate::error::{Error, GrpcError, Result};

use super::query::GrpcRequest;
use super::{BackendKind, CosmosBackend};

/// Queries and broadcasts over gRPC.
///
/// The channel is created lazily on first use and shared by every clone of
/// the owning session. Channels multiplex requests, so no lock is needed.
pub struct GrpcBackend {
    grpc_url: Arc<String>,
    channel: OnceCell<Channel>,
    query_timeout: Duration,
    query_retries: u32,
}

impl GrpcBackend {
    pub fn new(grpc_url: impl Into<String>, query_timeout: Duration, query_retries: u32) -> Self {
        GrpcBackend {
            grpc_url: Arc::new(grpc_url.into()),
            channel: OnceCell::new(),
            query_timeout,
            query_retries,
        }
    }

    pub fn grpc_url(&self) -> &str {
        &self.grpc_url
    }

    fn make_error(&self, source: GrpcError) -> Error {
        Error::GrpcRequest {
            grpc_url: self.grpc_url.clone(),
            source,
        }
    }

    fn channel(&self) -> Result<Channel> {
        self.channel
            .get_or_try_init(|| {
                let endpoint = self
                    .grpc_url
                    .parse::<Endpoint>()
                    .map_err(GrpcError::InvalidUrl)?;
                let endpoint = if self.grpc_url.starts_with("https://") {
                    endpoint
                        .tls_config(ClientTlsConfig::new())
                        .map_err(GrpcError::InvalidUrl)?
                } else {
                    endpoint
                };
                Ok::<_, GrpcError>(endpoint.connect_lazy())
            })
            .cloned()
            .map_err(|e| self.make_error(e))
    }

    pub(crate) async fn perform_query<Request: GrpcRequest>(
        &self,
        req: Request,
    ) -> Result<Request::Response> {
        let channel = self.channel()?;
        let mut attempt = 0;
        loop {
            let res = tokio::time::timeout(
                self.query_timeout,
                Request::perform(tonic::Request::new(req.clone()), channel.clone()),
            )
            .await;
            let e = match res {
                Ok(Ok(x)) => return Ok(x.into_inner()),
                Ok(Err(status)) => {
                    let permanent = matches!(
                        status.code(),
                        tonic::Code::NotFound | tonic::Code::InvalidArgument
                    );
                    if permanent || !Request::RETRYABLE {
                        return Err(self.make_error(GrpcError::Status(status)));
                    }
                    GrpcError::Status(status)
                }
                Err(elapsed) => GrpcError::Timeout(elapsed),
            };
            if !Request::RETRYABLE || attempt >= self.query_retries {
                return Err(self.make_error(e));
            }
            attempt += 1;
            tracing::debug!(
                "Error performing a gRPC query, retrying. Attempt {attempt} of {}. {e}",
                self.query_retries
            );
        }
    }
}

#[async_trait]
impl CosmosBackend for GrpcBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Grpc
    }

    async fn account(&self, address: &str) -> Result<AccountState> {
        let res = self
            .perform_query(QueryAccountRequest {
                address: address.to_owned(),
            })
            .await?;
        let account = res
            .account
            .ok_or_else(|| Error::unmarshal("QueryAccountResponse", "missing account"))?;
        decode_account(&account)
    }

    async fn simulate(&self, tx_bytes: Vec<u8>) -> Result<u64> {
        #[allow(deprecated)]
        let req = SimulateRequest { tx: None, tx_bytes };
        let res = self.perform_query(req).await?;
        res.gas_info
            .map(|info| info.gas_used)
            .ok_or_else(|| Error::unmarshal("SimulateResponse", "missing gas_info"))
    }

    async fn broadcast(&self, tx_bytes: Vec<u8>, mode: BroadcastMode) -> Result<NativeTxResponse> {
        let res = self
            .perform_query(BroadcastTxRequest {
                tx_bytes,
                mode: mode.as_proto() as i32,
            })
            .await?;
        res.tx_response
            .map(NativeTxResponse::from)
            .ok_or_else(|| Error::unmarshal("BroadcastTxResponse", "missing tx_response"))
    }

    async fn all_balances(&self, address: &str) -> Result<Vec<Coin>> {
        let mut coins = Vec::new();
        let mut pagination = None;
        loop {
            let mut res = self
                .perform_query(QueryAllBalancesRequest {
                    address: address.to_owned(),
                    pagination: pagination.take(),
                    ..Default::default()
                })
                .await?;
            coins.append(&mut res.balances);
            match res.pagination {
                Some(x) if !x.next_key.is_empty() => {
                    pagination = Some(PageRequest {
                        key: x.next_key,
                        ..Default::default()
                    })
                }
                _ => break Ok(coins),
            }
        }
    }
}
