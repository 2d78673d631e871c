use cosmos_sdk_proto::cosmos::auth::v1beta1::BaseAccount;
use cosmos_sdk_proto::Any;
use prost::Message;

use crate::error::{Error, Result};
use crate::session::ClientSession;

const BASE_ACCOUNT_TYPE_URL: &str = "/cosmos.auth.v1beta1.BaseAccount";
const ETH_ACCOUNT_TYPE_URLS: [&str; 2] = [
    "/ethermint.types.v1.EthAccount",
    "/injective.types.v1beta1.EthAccount",
];

/// Account number and sequence used to sign a transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct AccountState {
    pub account_number: u64,
    pub sequence: u64,
}

/// Ethermint account, a [BaseAccount] plus the hash of any deployed code.
#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct EthAccount {
    #[prost(message, optional, tag = "1")]
    pub base_account: Option<BaseAccount>,
    #[prost(string, tag = "2")]
    pub code_hash: String,
}

pub(crate) fn decode_account(any: &Any) -> Result<AccountState> {
    let base = if any.type_url == BASE_ACCOUNT_TYPE_URL {
        BaseAccount::decode(any.value.as_slice())
            .map_err(|e| Error::unmarshal(BASE_ACCOUNT_TYPE_URL, e))?
    } else if ETH_ACCOUNT_TYPE_URLS.contains(&any.type_url.as_str()) {
        EthAccount::decode(any.value.as_slice())
            .map_err(|e| Error::unmarshal(any.type_url.clone(), e))?
            .base_account
            .ok_or_else(|| Error::unmarshal(any.type_url.clone(), "missing base_account"))?
    } else {
        return Err(Error::unmarshal(
            "account",
            format!("unsupported account type {}", any.type_url),
        ));
    };
    Ok(AccountState {
        account_number: base.account_number,
        sequence: base.sequence,
    })
}

/// Determine the account number and sequence to sign with.
///
/// Values pinned on the session always win. When both are pinned no network
/// call is made at all. An offline session gets protocol defaults of zero.
pub async fn resolve_account_state(session: &ClientSession, address: &str) -> Result<AccountState> {
    let pinned_number = session.pinned_account_number();
    let pinned_sequence = session.pinned_sequence();
    if let (Some(account_number), Some(sequence)) = (pinned_number, pinned_sequence) {
        tracing::debug!(
            "Using pinned account number {account_number} and sequence {sequence} for {address}"
        );
        return Ok(AccountState {
            account_number,
            sequence,
        });
    }

    let queried = match session.backend_selector().backend() {
        None => {
            tracing::debug!("No query backend configured, using default account state for {address}");
            AccountState::default()
        }
        Some(backend) => backend
            .account(address)
            .await
            .map_err(|source| Error::AccountResolution {
                address: address.to_owned(),
                source: Box::new(source),
            })?,
    };

    let state = AccountState {
        account_number: pinned_number.unwrap_or(queried.account_number),
        sequence: pinned_sequence.unwrap_or(queried.sequence),
    };
    tracing::debug!("Resolved account state for {address}: {state:?}");
    Ok(state)
}
