use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::{
    AddressHrp, BroadcastMode, ClientSession, KeyAlgorithm, RawWallet, SignMode, Wallet,
};

/// Command line options for building a [ClientSession]
#[derive(clap::Parser, Clone, Debug)]
pub struct SessionOpt {
    /// Chain ID, e.g. evmos_9001-2
    #[clap(long, env = "COSMOS_CHAIN_ID", global = true)]
    pub chain_id: Option<String>,
    /// Denom fees are paid in
    #[clap(long, env = "COSMOS_FEE_DENOM", global = true)]
    pub fee_denom: Option<String>,
    /// Human readable address prefix
    #[clap(long, env = "COSMOS_HRP", global = true)]
    pub hrp: Option<AddressHrp>,
    /// gRPC endpoint, preferred over REST
    #[clap(long, env = "COSMOS_GRPC", global = true)]
    pub cosmos_grpc: Option<String>,
    /// REST (LCD) endpoint
    #[clap(long, env = "COSMOS_REST", global = true)]
    pub cosmos_rest: Option<String>,
    /// Tendermint RPC endpoint, needed for --timeout-blocks
    #[clap(long, env = "COSMOS_TENDERMINT_RPC", global = true)]
    pub tendermint_rpc: Option<String>,
    /// EVM JSON-RPC endpoint
    #[clap(long, env = "COSMOS_EVM_RPC", global = true)]
    pub evm_rpc: Option<String>,
    /// Hex encoded secp256k1 private key
    #[clap(long, env = "COSMOS_EVM_KEY", global = true, hide_env_values = true)]
    pub key: Option<String>,
    /// How the key is presented to the chain: secp256k1 or eth-secp256k1
    #[clap(long, env = "COSMOS_KEY_ALGORITHM", global = true)]
    pub key_algorithm: Option<KeyAlgorithm>,
    /// Pin the account number instead of querying it
    #[clap(long, global = true)]
    pub account_number: Option<u64>,
    /// Pin the sequence instead of querying it
    #[clap(long, global = true)]
    pub sequence: Option<u64>,
    /// Gas limit, skips simulation
    #[clap(long, global = true)]
    pub gas_limit: Option<u64>,
    /// Gas price in the fee denom, a decimal integer
    #[clap(long, env = "COSMOS_GAS_PRICE", global = true)]
    pub gas_price: Option<String>,
    /// Multiplier applied to simulated gas
    #[clap(long, env = "COSMOS_GAS_ADJUSTMENT", global = true)]
    pub gas_adjustment: Option<f64>,
    /// Fixed fee amount in the fee denom
    #[clap(long, global = true)]
    pub fee_amount: Option<String>,
    /// Address paying the fee through a fee grant
    #[clap(long, global = true)]
    pub fee_granter: Option<String>,
    /// direct or amino-json
    #[clap(long, global = true)]
    pub sign_mode: Option<SignMode>,
    /// sync, async or block
    #[clap(long, env = "COSMOS_BROADCAST_MODE", global = true)]
    pub broadcast_mode: Option<BroadcastMode>,
    /// Absolute timeout height
    #[clap(long, global = true)]
    pub timeout_height: Option<u64>,
    /// Timeout relative to the latest block
    #[clap(long, global = true)]
    pub timeout_blocks: Option<u64>,
    /// Write the signed transaction or unsigned document here
    #[clap(long, global = true)]
    pub output_document: Option<PathBuf>,
    /// Seconds before a gRPC query times out
    #[clap(long, global = true)]
    pub query_timeout_seconds: Option<u32>,
    /// Attempts at polling for an EVM receipt
    #[clap(long, global = true)]
    pub receipt_attempts: Option<u32>,
    /// Milliseconds between receipt polls
    #[clap(long, global = true)]
    pub receipt_interval_ms: Option<u64>,
}

impl SessionOpt {
    pub fn session(&self) -> Result<ClientSession> {
        self.clone().into_session()
    }

    pub fn into_session(self) -> Result<ClientSession> {
        let SessionOpt {
            chain_id,
            fee_denom,
            hrp,
            cosmos_grpc,
            cosmos_rest,
            tendermint_rpc,
            evm_rpc,
            key,
            key_algorithm,
            account_number,
            sequence,
            gas_limit,
            gas_price,
            gas_adjustment,
            fee_amount,
            fee_granter,
            sign_mode,
            broadcast_mode,
            timeout_height,
            timeout_blocks,
            output_document,
            query_timeout_seconds,
            receipt_attempts,
            receipt_interval_ms,
        } = self;

        let chain_id = chain_id.context(
            "No chain ID specified, either provide the COSMOS_CHAIN_ID env var or --chain-id option",
        )?;
        let fee_denom = fee_denom.context(
            "No fee denom specified, either provide the COSMOS_FEE_DENOM env var or --fee-denom option",
        )?;
        let mut session = ClientSession::new(chain_id, fee_denom);
        if let Some(hrp) = hrp {
            session.set_hrp(hrp);
        }
        if let Some(key) = key {
            let wallet = wallet(&key, key_algorithm, session.hrp().clone())?;
            session.set_signer(wallet);
        }

        if let Some(seconds) = query_timeout_seconds {
            session.set_query_timeout_seconds(seconds);
        }
        if let Some(url) = cosmos_grpc {
            session.set_grpc_url(url);
        }
        if let Some(url) = cosmos_rest {
            session.set_rest_url(url);
        }
        if let Some(url) = tendermint_rpc {
            session.set_tendermint_rpc_url(url);
        }
        if let Some(url) = evm_rpc {
            session.set_evm_rpc_url(url);
        }

        if let Some(x) = account_number {
            session.set_account_number(x);
        }
        if let Some(x) = sequence {
            session.set_sequence(x);
        }
        if let Some(x) = gas_limit {
            session.set_gas_limit(x);
        }
        if let Some(x) = gas_price {
            session.set_gas_price(x);
        }
        if let Some(x) = gas_adjustment {
            session.set_gas_adjustment(x);
        }
        if let Some(x) = fee_amount {
            session.set_fee_amount(x);
        }
        if let Some(x) = fee_granter {
            session.set_fee_granter(x);
        }
        if let Some(x) = sign_mode {
            session.set_sign_mode(x);
        }
        if let Some(x) = broadcast_mode {
            session.set_broadcast_mode(x);
        }
        if let Some(x) = timeout_height {
            session.set_timeout_height(x);
        }
        if let Some(x) = timeout_blocks {
            session.set_timeout_blocks(x);
        }
        if let Some(x) = output_document {
            session.set_output_document(x);
        }
        if let Some(x) = receipt_attempts {
            session.set_receipt_attempts(x);
        }
        if let Some(ms) = receipt_interval_ms {
            session.set_receipt_interval(Duration::from_millis(ms));
        }

        Ok(session)
    }
}

fn wallet(key: &str, algorithm: Option<KeyAlgorithm>, hrp: AddressHrp) -> Result<Wallet> {
    let raw = key
        .parse::<RawWallet>()
        .context("Unable to parse signing key")?;
    Ok(raw.with_algorithm(algorithm.unwrap_or_default()).for_hrp(hrp))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(clap::Parser)]
    struct Cmd {
        #[clap(flatten)]
        opt: SessionOpt,
    }

    #[test]
    fn builds_session_from_args() {
        let cmd = Cmd::try_parse_from([
            "test",
            "--chain-id",
            "evmos_9001-2",
            "--fee-denom",
            "aevmos",
            "--hrp",
            "evmos",
            "--gas-price",
            "25000000000",
            "--sign-mode",
            "amino-json",
            "--broadcast-mode",
            "block",
            "--sequence",
            "4",
        ])
        .unwrap();
        let session = cmd.opt.into_session().unwrap();
        assert_eq!(session.chain_id(), "evmos_9001-2");
        assert_eq!(session.hrp().as_str(), "evmos");
        assert_eq!(session.gas_price(), Some("25000000000"));
        assert_eq!(session.sign_mode(), Some(SignMode::LegacyAminoJson));
        assert_eq!(session.broadcast_mode(), BroadcastMode::Block);
        assert_eq!(session.pinned_sequence(), Some(4));
        assert_eq!(session.pinned_account_number(), None);
        assert!(session.signer().is_none());
    }

    #[test]
    fn missing_chain_id_is_reported() {
        let opt = SessionOpt {
            chain_id: None,
            ..Cmd::try_parse_from(["test", "--fee-denom", "aevmos"]).unwrap().opt
        };
        assert!(opt
            .into_session()
            .unwrap_err()
            .to_string()
            .contains("chain ID"));
    }
}
