use std::str::FromStr;

use anyhow::Context;
use cosmos_evm::PayloadCoin;

#[derive(PartialEq, Eq, Debug, Clone)]
pub(super) struct ParsedCoin {
    denom: String,
    amount: u128,
}

impl From<ParsedCoin> for PayloadCoin {
    fn from(ParsedCoin { denom, amount }: ParsedCoin) -> Self {
        PayloadCoin {
            denom,
            amount: amount.to_string(),
        }
    }
}

impl FromStr for ParsedCoin {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        (|| {
            anyhow::ensure!(!s.is_empty(), "Cannot parse empty string");
            let idx = s
                .find(|c: char| !c.is_ascii_digit())
                .context("All characters are ASCII digits")?;
            let (amount, denom) = s.split_at(idx);
            anyhow::ensure!(!amount.is_empty(), "Must not have an empty amount");
            anyhow::ensure!(!denom.is_empty(), "Must not have an empty denom");
            // IBC denoms look like ibc/27394FB0...
            anyhow::ensure!(
                denom.starts_with(|c: char| c.is_ascii_lowercase())
                    && denom
                        .bytes()
                        .all(|b| b.is_ascii_alphanumeric() || b == b'/'),
                "Denom must start with a lowercase letter and contain only letters, digits and '/'"
            );
            Ok(ParsedCoin {
                denom: denom.to_owned(),
                amount: amount.parse()?,
            })
        })()
        .with_context(|| format!("Could not parse coin value {s:?}"))
    }
}

#[cfg(test)]
mod tests {
    use quickcheck::Arbitrary;

    use super::*;

    fn parse_coin(s: &str) -> anyhow::Result<ParsedCoin> {
        s.parse()
    }

    fn make_coin(amount: u128, denom: &str) -> ParsedCoin {
        ParsedCoin {
            denom: denom.to_owned(),
            amount,
        }
    }

    #[test]
    fn sanity() {
        assert_eq!(parse_coin("1aevmos").unwrap(), make_coin(1, "aevmos"));
        parse_coin("1.523aevmos").unwrap_err();
        parse_coin("foobar").unwrap_err();
        parse_coin("123aevmos 456").unwrap_err();
        parse_coin("12/ibc").unwrap_err();
        assert_eq!(
            parse_coin("1000000000000000000aevmos").unwrap(),
            make_coin(1_000_000_000_000_000_000, "aevmos")
        );
        assert_eq!(
            parse_coin("5ibc/27394FB092D2ECCD56123C74F36E4C1F926001CEADA9CA97EA622B25F41E5EB2")
                .unwrap()
                .denom,
            "ibc/27394FB092D2ECCD56123C74F36E4C1F926001CEADA9CA97EA622B25F41E5EB2"
        );
    }

    #[test]
    fn converts_to_payload() {
        let coin: PayloadCoin = parse_coin("42uatom").unwrap().into();
        assert_eq!(coin.amount, "42");
        assert_eq!(coin.denom, "uatom");
    }

    #[derive(Clone, Debug)]
    struct DenomString(String);

    impl Arbitrary for DenomString {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            // See https://github.com/BurntSushi/quickcheck/issues/279
            let sizes = (3..20).collect::<Vec<_>>();
            let letters = ('a'..='z').collect::<Vec<_>>();
            DenomString(
                (1..*g.choose(&sizes).unwrap())
                    .map(|_| *g.choose(&letters).unwrap())
                    .collect(),
            )
        }
    }

    quickcheck::quickcheck! {
        fn roundtrip(amount: u128, denom: DenomString) -> bool {
            let denom = denom.0;
            let expected = make_coin(amount, &denom);
            let actual = parse_coin(&format!("{amount}{denom}")).unwrap();
            assert_eq!(expected, actual);
            true
        }
    }
}
