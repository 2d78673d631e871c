mod parsed_coin;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use cosmos_evm::{
    clap::SessionOpt, parse_evm_chain_id, resolve_account_state, BankSend, ClientSession,
    EvmCall, EvmDeploy, EvmTransfer, HasAddress, MultisigAggregate, PendingMessage, SignedTx,
    SignerData, ThresholdKey, TransactionDraft, TxBuilder, TxResult,
};
use parsed_coin::ParsedCoin;
use tracing_subscriber::EnvFilter;

/// Build, sign and broadcast transactions on Cosmos chains with an EVM module
#[derive(clap::Parser)]
struct Cmd {
    #[clap(flatten)]
    opt: Opt,
    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(clap::Parser)]
struct Opt {
    #[clap(flatten)]
    session_opt: SessionOpt,
    /// Turn on verbose output
    #[clap(long, short, global = true)]
    verbose: bool,
}

impl Opt {
    fn init_logger(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if self.verbose {
                format!("{}=debug,cosmos_evm=debug,info", env!("CARGO_CRATE_NAME"))
            } else {
                "info".to_owned()
            })
        });
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[derive(clap::Parser)]
struct TxOpt {
    /// Memo to put on transaction
    #[clap(long)]
    memo: Option<String>,
    /// Report a failed transaction instead of exiting with an error
    #[clap(long)]
    skip_code_check: bool,
}

impl TxOpt {
    fn builder(&self) -> TxBuilder {
        let mut builder = TxBuilder::default();
        builder
            .set_optional_memo(self.memo.clone())
            .set_skip_code_check(self.skip_code_check);
        builder
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cmd = Cmd::parse();
    cmd.opt.init_logger();

    cmd.subcommand.go(cmd.opt).await
}

#[derive(clap::Parser)]
enum Subcommand {
    /// Print the account number and sequence of an address
    Account { address: String },
    /// Print all balances of an address
    Balances { address: String },
    /// Send coins to the given address
    Send {
        #[clap(flatten)]
        tx_opt: TxOpt,
        /// Destination address
        dest: String,
        /// Coins to send. Example 1000aevmos
        coins: Vec<ParsedCoin>,
    },
    /// Sign and broadcast any supported message
    Tx {
        #[clap(flatten)]
        tx_opt: TxOpt,
        /// Module, e.g. bank, staking, wasm or evm
        module: String,
        /// Message type within the module, e.g. send
        msg_type: String,
        /// Message payload (JSON)
        payload: String,
    },
    /// Create an unsigned multisig transaction for members to sign offline
    CreateUnsigned {
        /// Signatures required
        #[clap(long)]
        threshold: u32,
        /// Hex encoded compressed public key of a member, in order
        #[clap(long = "member", required = true)]
        members: Vec<String>,
        /// Memo to put on transaction
        #[clap(long)]
        memo: Option<String>,
        module: String,
        msg_type: String,
        /// Message payload (JSON)
        payload: String,
    },
    /// Sign an unsigned multisig transaction as one member
    SignPart {
        /// Unsigned transaction document
        draft: PathBuf,
        /// Where to write the signature file, stdout if absent
        #[clap(long)]
        output: Option<PathBuf>,
    },
    /// Combine member signature files into a signed transaction
    Multisign {
        /// Unsigned transaction document
        draft: PathBuf,
        /// Signature files
        #[clap(required = true)]
        signatures: Vec<PathBuf>,
        /// Broadcast the combined transaction
        #[clap(long)]
        broadcast: bool,
    },
    /// Broadcast a signed transaction document
    BroadcastFile {
        file: PathBuf,
        #[clap(long)]
        skip_code_check: bool,
    },
    /// Send EVM value to an address
    EvmTransfer {
        #[clap(flatten)]
        tx_opt: TxOpt,
        /// 0x or bech32 recipient
        to: String,
        /// Amount in the smallest unit
        amount: String,
        #[clap(long)]
        gas_limit: Option<u64>,
    },
    /// Call a contract method
    EvmCall {
        #[clap(flatten)]
        tx_opt: TxOpt,
        /// Contract address
        contract: String,
        /// ABI JSON file, bare or a compiler artifact
        #[clap(long)]
        abi: PathBuf,
        method: String,
        args: Vec<String>,
        /// Value sent along with the call
        #[clap(long)]
        amount: Option<String>,
        #[clap(long)]
        gas_limit: Option<u64>,
    },
    /// Deploy a contract
    EvmDeploy {
        #[clap(flatten)]
        tx_opt: TxOpt,
        /// ABI JSON file, bare or a compiler artifact
        #[clap(long)]
        abi: PathBuf,
        /// File containing the hex bytecode
        bytecode: PathBuf,
        /// Constructor arguments
        args: Vec<String>,
        #[clap(long)]
        amount: Option<String>,
        #[clap(long)]
        gas_limit: Option<u64>,
    },
    /// Print the EIP-155 chain ID for a chain ID such as evmos_9001-2
    EvmChainId { chain_id: String },
}

impl Subcommand {
    async fn go(self, opt: Opt) -> Result<()> {
        let session = match &self {
            Subcommand::EvmChainId { chain_id } => {
                println!("{}", parse_evm_chain_id(chain_id)?);
                return Ok(());
            }
            _ => opt.session_opt.into_session()?,
        };
        match self {
            Subcommand::Account { address } => {
                let state = resolve_account_state(&session, &address).await?;
                println!("Account number: {}", state.account_number);
                println!("Sequence: {}", state.sequence);
            }
            Subcommand::Balances { address } => {
                for coin in session.all_balances(&address).await? {
                    println!("{}{}", coin.amount, coin.denom);
                }
            }
            Subcommand::Send {
                tx_opt,
                dest,
                coins,
            } => {
                let wallet = session
                    .signer()
                    .context("Sending coins requires a signing key, provide --key")?;
                let mut builder = tx_opt.builder();
                builder.add_message(BankSend {
                    from_address: wallet.get_address_string(),
                    to_address: dest,
                    amount: coins.into_iter().map(Into::into).collect(),
                });
                print_result(builder.sign_and_broadcast(&session).await?)?;
            }
            Subcommand::Tx {
                tx_opt,
                module,
                msg_type,
                payload,
            } => {
                let mut builder = tx_opt.builder();
                builder.try_add_message(&module, &msg_type, parse_json(&payload)?)?;
                print_result(builder.sign_and_broadcast(&session).await?)?;
            }
            Subcommand::CreateUnsigned {
                threshold,
                members,
                memo,
                module,
                msg_type,
                payload,
            } => {
                let members = members
                    .iter()
                    .map(|m| {
                        hex::decode(m.trim_start_matches("0x"))
                            .with_context(|| format!("Invalid member public key {m}"))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let key = ThresholdKey::new(threshold, members)?;
                tracing::info!(
                    "Multisig address: {}",
                    key.address(session.hrp().clone())
                );
                let mut builder = TxBuilder::default();
                builder
                    .set_optional_memo(memo)
                    .add_message(PendingMessage::new(&module, &msg_type, parse_json(&payload)?)?);
                let draft = builder.create_unsigned_tx(&session, &key).await?;
                if session.output_document().is_none() {
                    println!("{}", serde_json::to_string_pretty(&draft)?);
                }
            }
            Subcommand::SignPart { draft, output } => {
                let draft = TransactionDraft::load(&draft)?;
                let wallet = session
                    .signer()
                    .context("Signing requires a signing key, provide --key")?;
                let signer_data = signer_data(&session, &draft)?;
                let file = cosmos_evm::sign_multisig_part(&draft, wallet, &signer_data)?;
                match output {
                    Some(path) => file.save(&path)?,
                    None => println!("{}", serde_json::to_string_pretty(&file)?),
                }
            }
            Subcommand::Multisign {
                draft,
                signatures,
                broadcast,
            } => {
                let draft = TransactionDraft::load(&draft)?;
                let mut aggregate = MultisigAggregate::new(draft, session.hrp().clone())?;
                for path in &signatures {
                    let added = aggregate
                        .add_signature_file_path(path)
                        .with_context(|| format!("Error reading signatures from {}", path.display()))?;
                    tracing::info!("Added {added} signatures from {}", path.display());
                }
                let signed = aggregate.combine()?;
                if let Some(path) = session.output_document() {
                    signed.write_document(path)?;
                }
                if broadcast {
                    print_result(TxResult::Native(
                        session.broadcast_signed(&signed, false).await?,
                    ))?;
                } else if session.output_document().is_none() {
                    println!("{}", serde_json::to_string_pretty(&signed.to_json()?)?);
                }
            }
            Subcommand::BroadcastFile {
                file,
                skip_code_check,
            } => {
                let signed = SignedTx::read_document(&file)?;
                let res = session.broadcast_signed(&signed, skip_code_check).await?;
                print_result(TxResult::Native(res))?;
            }
            Subcommand::EvmTransfer {
                tx_opt,
                to,
                amount,
                gas_limit,
            } => {
                let mut builder = tx_opt.builder();
                builder.add_message(EvmTransfer {
                    to,
                    amount,
                    gas_limit,
                });
                print_result(builder.sign_and_broadcast(&session).await?)?;
            }
            Subcommand::EvmCall {
                tx_opt,
                contract,
                abi,
                method,
                args,
                amount,
                gas_limit,
            } => {
                let mut builder = tx_opt.builder();
                builder.add_message(EvmCall {
                    contract,
                    abi: load_json(&abi)?,
                    method,
                    args,
                    amount,
                    gas_limit,
                });
                print_result(builder.sign_and_broadcast(&session).await?)?;
            }
            Subcommand::EvmDeploy {
                tx_opt,
                abi,
                bytecode,
                args,
                amount,
                gas_limit,
            } => {
                let mut builder = tx_opt.builder();
                builder.add_message(EvmDeploy {
                    abi: load_json(&abi)?,
                    bytecode: fs_err::read_to_string(&bytecode)?.trim().to_owned(),
                    args,
                    amount,
                    gas_limit,
                });
                print_result(builder.sign_and_broadcast(&session).await?)?;
            }
            Subcommand::EvmChainId { .. } => {}
        }
        Ok(())
    }
}

/// Signer data from pinned session values, falling back to the draft's own.
fn signer_data(session: &ClientSession, draft: &TransactionDraft) -> Result<SignerData> {
    let recorded = draft
        .signer_data()
        .context("Transaction draft has no signer data")?;
    Ok(SignerData {
        chain_id: session.chain_id().to_owned(),
        account_number: session
            .pinned_account_number()
            .unwrap_or(recorded.account_number),
        sequence: session.pinned_sequence().unwrap_or(recorded.sequence),
    })
}

fn parse_json(s: &str) -> Result<serde_json::Value> {
    serde_json::from_str(s).with_context(|| format!("Invalid JSON payload: {s}"))
}

fn load_json(path: &Path) -> Result<serde_json::Value> {
    let text = fs_err::read_to_string(path)?;
    serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_result(res: TxResult) -> Result<()> {
    tracing::info!("Transaction hash: {}", res.tx_hash());
    println!("{}", serde_json::to_string_pretty(&res)?);
    Ok(())
}
