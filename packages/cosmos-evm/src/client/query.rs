use cosmos_sdk_proto::cosmos::{
    auth::v1beta1::{query_client::QueryClient as AuthQueryClient, QueryAccountRequest, QueryAccountResponse},
    bank::v1beta1::{
        query_client::QueryClient as BankQueryClient, QueryAllBalancesRequest,
        QueryAllBalancesResponse,
    },
    tx::v1beta1::{
        service_client::ServiceClient, BroadcastTxRequest, BroadcastTxResponse, SimulateRequest,
        SimulateResponse,
    },
};
use tonic::{async_trait, transport::Channel};

#[async_trait]
pub(crate) trait GrpcRequest: Clone + Send + Sync + 'static {
    type Response: Send;

    /// Broadcasts must never be resent, everything else is a read.
    const RETRYABLE: bool = true;

    async fn perform(
        req: tonic::Request<Self>,
        channel: Channel,
    ) -> Result<tonic::Response<Self::Response>, tonic::Status>;
}

#[async_trait]
impl GrpcRequest for QueryAccountRequest {
    type Response = QueryAccountResponse;

    async fn perform(
        req: tonic::Request<Self>,
        channel: Channel,
    ) -> Result<tonic::Response<Self::Response>, tonic::Status> {
        AuthQueryClient::new(channel).account(req).await
    }
}

#[async_trait]
impl GrpcRequest for QueryAllBalancesRequest {
    type Response = QueryAllBalancesResponse;

    async fn perform(
        req: tonic::Request<Self>,
        channel: Channel,
    ) -> Result<tonic::Response<Self::Response>, tonic::Status> {
        BankQueryClient::new(channel).all_balances(req).await
    }
}

#[async_trait]
impl GrpcRequest for SimulateRequest {
    type Response = SimulateResponse;

    async fn perform(
        req: tonic::Request<Self>,
        channel: Channel,
    ) -> Result<tonic::Response<Self::Response>, tonic::Status> {
        ServiceClient::new(channel).simulate(req).await
    }
}

#[async_trait]
impl GrpcRequest for BroadcastTxRequest {
    type Response = BroadcastTxResponse;
    const RETRYABLE: bool = false;

    async fn perform(
        req: tonic::Request<Self>,
        channel: Channel,
    ) -> Result<tonic::Response<Self::Response>, tonic::Status> {
        ServiceClient::new(channel).broadcast_tx(req).await
    }
}
