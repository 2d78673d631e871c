//! Gas limits and fee amounts.

use alloy::primitives::U256;
use prost::Message;

use crate::draft::TransactionDraft;
use crate::error::{Error, Result};
use crate::session::ClientSession;

/// Gas limit used when no backend is available to simulate against.
pub const DEFAULT_GAS_LIMIT: u64 = 200_000;

/// Follows cosmjs and osmojs.
pub const DEFAULT_GAS_ADJUSTMENT: f64 = 1.3;

/// Intrinsic gas of a plain EVM value transfer.
pub const EVM_TRANSFER_GAS: u64 = 21_000;

/// Gas limit and fee amount for a transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeeEstimate {
    pub gas_limit: u64,
    /// Decimal integer amount in the session's fee denom.
    pub fee_amount: String,
}

/// Scale gas by the adjustment, rounding up.
pub fn scale_gas(gas: u64, adjustment: f64) -> u64 {
    (gas as f64 * adjustment).ceil() as u64
}

pub(crate) fn parse_decimal_u256(what: &'static str, s: &str) -> Result<U256> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::parse(
            what,
            format!("{s:?} is not a non-negative decimal integer"),
        ));
    }
    U256::from_str_radix(s, 10).map_err(|e| Error::parse(what, format!("{s:?}: {e}")))
}

/// `gas_limit × gas_price` as a decimal string, with 256-bit arithmetic.
pub fn compute_fee_amount(gas_limit: u64, gas_price: &str) -> Result<String> {
    parse_decimal_u256("gas price", gas_price)?
        .checked_mul(U256::from(gas_limit))
        .map(|fee| fee.to_string())
        .ok_or_else(|| Error::parse("gas price", "fee amount overflows 256 bits"))
}

/// Fee for a known gas limit: the pinned amount, else `gas_limit × gas_price`.
pub(crate) fn fee_for_gas(session: &ClientSession, gas_limit: u64) -> Result<String> {
    match (session.fee_amount(), session.gas_price()) {
        (Some(amount), _) => {
            parse_decimal_u256("fee amount", amount)?;
            Ok(amount.trim().to_owned())
        }
        (None, Some(price)) => compute_fee_amount(gas_limit, price),
        (None, None) => Err(Error::InsufficientParams("a fee amount or gas price")),
    }
}

/// Gas limit and fee for a native draft whose account state is resolved.
///
/// A caller supplied gas limit skips simulation. Without a backend the
/// default gas limit is used. Otherwise the draft is simulated with an empty
/// placeholder signature and the gas used is scaled by the gas adjustment.
pub async fn estimate_gas_and_fee(
    session: &ClientSession,
    draft: &TransactionDraft,
) -> Result<FeeEstimate> {
    if session.fee_amount().is_none() && session.gas_price().is_none() {
        return Err(Error::InsufficientParams("a fee amount or gas price"));
    }

    let gas_limit = match (session.gas_limit(), session.backend_selector().backend()) {
        (Some(gas_limit), _) => gas_limit,
        (None, None) => {
            tracing::debug!("No backend to simulate against, using default gas limit {DEFAULT_GAS_LIMIT}");
            DEFAULT_GAS_LIMIT
        }
        (None, Some(backend)) => {
            let wrap = |source| Error::FeeEstimation {
                source: Box::new(source),
            };
            let tx_bytes = draft.placeholder_raw().map_err(wrap)?.encode_to_vec();
            let gas_used = backend.simulate(tx_bytes).await.map_err(wrap)?;
            let gas_limit = scale_gas(gas_used, session.gas_adjustment());
            tracing::debug!(
                "Simulation used {gas_used} gas, requesting {gas_limit} with adjustment {}",
                session.gas_adjustment()
            );
            gas_limit
        }
    };

    Ok(FeeEstimate {
        gas_limit,
        fee_amount: fee_for_gas(session, gas_limit)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::account::AccountState;
    use crate::draft::SignerPublicKey;
    use crate::messages::{BankSend, PayloadCoin};
    use crate::sign::SignMode;
    use crate::testing::StubBackend;
    use crate::wallet::tests::test_wallet;

    fn resolved_draft() -> TransactionDraft {
        let wallet = test_wallet("evmos");
        let mut draft = TransactionDraft::new();
        draft
            .set_messages(
                vec![BankSend {
                    from_address: wallet.address().to_string(),
                    to_address: wallet.address().to_string(),
                    amount: vec![PayloadCoin {
                        denom: "aevmos".to_owned(),
                        amount: "1".to_owned(),
                    }],
                }
                .into()],
                wallet.address().to_string(),
                SignerPublicKey::from(&wallet),
                SignMode::Direct,
            )
            .unwrap();
        draft
            .set_account_state("evmos_9001-2", AccountState::default())
            .unwrap();
        draft
    }

    #[test]
    fn gas_adjustment_rounds_up() {
        assert_eq!(scale_gas(1234, DEFAULT_GAS_ADJUSTMENT), 1605);
        assert_eq!(scale_gas(1234, 4.2), 5183);
        assert_eq!(scale_gas(EVM_TRANSFER_GAS, DEFAULT_GAS_ADJUSTMENT), 27300);
        assert_eq!(scale_gas(0, DEFAULT_GAS_ADJUSTMENT), 0);
    }

    #[test]
    fn fee_beyond_64_bits() {
        assert_eq!(
            compute_fee_amount(100_000, "850000000000").unwrap(),
            "85000000000000000"
        );
        assert_eq!(
            compute_fee_amount(u64::MAX, "340282366920938463463374607431768211455").unwrap(),
            "6277101735386680763495507056286727952620534092958556749825"
        );
    }

    #[test]
    fn bad_gas_price_is_parse_error() {
        for price in ["", "-1", "1.5", "12aevmos"] {
            assert_eq!(compute_fee_amount(1, price).unwrap_err().code(), 4, "{price:?}");
        }
    }

    quickcheck::quickcheck! {
        fn fee_matches_u128(gas: u64, price: u64) -> bool {
            compute_fee_amount(gas, &price.to_string()).unwrap()
                == (gas as u128 * price as u128).to_string()
        }
    }

    #[tokio::test]
    async fn no_fee_or_price_is_insufficient() {
        let session = ClientSession::new("evmos_9001-2", "aevmos");
        let err = estimate_gas_and_fee(&session, &resolved_draft())
            .await
            .unwrap_err();
        assert_eq!(err.code(), 3);
    }

    #[tokio::test]
    async fn pinned_gas_skips_simulation() {
        let stub = Arc::new(StubBackend::default());
        let mut session = ClientSession::new("evmos_9001-2", "aevmos");
        session
            .set_backend(stub.clone())
            .set_gas_limit(100_000)
            .set_gas_price("850000000000");
        let estimate = estimate_gas_and_fee(&session, &resolved_draft())
            .await
            .unwrap();
        assert_eq!(
            estimate,
            FeeEstimate {
                gas_limit: 100_000,
                fee_amount: "85000000000000000".to_owned()
            }
        );
        assert!(stub.calls().is_empty());
    }

    #[tokio::test]
    async fn offline_uses_default_gas() {
        let mut session = ClientSession::new("evmos_9001-2", "aevmos");
        session.set_fee_amount("5000");
        let estimate = estimate_gas_and_fee(&session, &resolved_draft())
            .await
            .unwrap();
        assert_eq!(estimate.gas_limit, DEFAULT_GAS_LIMIT);
        assert_eq!(estimate.fee_amount, "5000");
    }

    #[tokio::test]
    async fn simulated_gas_is_adjusted() {
        let stub = Arc::new(StubBackend::default().with_gas_used(100_000));
        let mut session = ClientSession::new("evmos_9001-2", "aevmos");
        session.set_backend(stub.clone()).set_gas_price("10");
        let estimate = estimate_gas_and_fee(&session, &resolved_draft())
            .await
            .unwrap();
        assert_eq!(estimate.gas_limit, 130_000);
        assert_eq!(estimate.fee_amount, "1300000");
        assert_eq!(stub.calls(), vec!["simulate".to_owned()]);
    }

    #[tokio::test]
    async fn simulation_failure_is_wrapped() {
        let stub = Arc::new(StubBackend::default().failing_simulate());
        let mut session = ClientSession::new("evmos_9001-2", "aevmos");
        session.set_backend(stub).set_gas_price("10");
        let err = estimate_gas_and_fee(&session, &resolved_draft())
            .await
            .unwrap_err();
        assert_eq!(err.code(), 8);
    }
}
