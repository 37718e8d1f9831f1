//! Command line interface and the interactive wallet shell

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use btcwallet_core::bitcoin_utils::{format_btc, parse_bitcoin_amount, requested_amount_sats};
use btcwallet_core::error::{invalid_input, invalid_input_with_source};
use btcwallet_core::{
    BtcWalletError, FeeEstimateReport, TransactionRecord, Wallet, WalletBalance, WalletResult, TYPICAL_TX_SIZE,
};

use crate::context::AppContext;

#[derive(Debug, Parser)]
#[command(name = "btcwallet", version, about = "Single-key Bitcoin wallet")]
pub struct Opt {
    #[arg(long, global = true, help = "Path to the TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Override the configured network (bitcoin, testnet, signet, regtest)")]
    pub network: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    #[command(name = "generate", about = "Generate a new wallet")]
    Generate {
        #[arg(long, help = "Derive the key from a fresh 12-word mnemonic")]
        mnemonic: bool,
    },
    #[command(name = "import", about = "Import a wallet from hex, WIF or mnemonic")]
    Import {
        #[arg(help = "Private key (hex or WIF) or a quoted mnemonic phrase")]
        key: String,
    },
    #[command(name = "validate-address", about = "Check an address against the configured network")]
    ValidateAddress {
        #[arg(help = "The address to check")]
        address: String,
    },
    #[command(name = "fee-estimate", about = "Show fee tiers for a transaction size")]
    FeeEstimate {
        #[arg(long, default_value_t = TYPICAL_TX_SIZE, help = "Transaction size in bytes")]
        size: usize,
    },
    #[command(name = "network", about = "Show network status")]
    Network,
    #[command(name = "shell", about = "Start the interactive wallet shell")]
    Shell,
    #[command(name = "serve", about = "Run the HTTP API")]
    Serve {
        #[arg(long, help = "Address to bind, overrides the configuration")]
        bind: Option<String>,
    },
}

const SHELL_HELP: &str = "\
Commands:
  generate                          Generate a new wallet
  generate-mnemonic                 Generate a wallet backed by a 12-word mnemonic
  import <key|mnemonic>             Import from hex, WIF or mnemonic
  list                              List wallets
  balance <wallet_id>               Show a wallet's balance
  refresh <wallet_id>               Rescan a wallet's balance
  send <wallet_id> <address> <amount> [--broadcast]
                                    Build and sign a payment (simulated unless --broadcast)
  fees                              Show fee estimates
  network                           Show network status
  validate <address>                Validate an address
  fund <wallet_id> <amount> [confs] Credit a wallet on the simulated node
  mine [blocks]                     Confirm simulated outputs
  help                              Show this help
  exit                              Leave the shell";

/// Result of one shell line
#[derive(Debug, PartialEq, Eq)]
pub enum ShellOutcome {
    Continue(String),
    Exit,
}

/// Line-oriented wallet shell
pub struct Shell {
    ctx: Arc<AppContext>,
}

impl Shell {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    /// Read commands from stdin until `exit` or end of input
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(tokio::io::stdin()).lines();

        stdout
            .write_all(format!("BTC wallet shell ({})\n{}\n", self.ctx.wallets.store().network(), SHELL_HELP).as_bytes())
            .await?;

        loop {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;

            let Some(line) = lines.next_line().await? else {
                break;
            };

            match self.execute(&line).await {
                ShellOutcome::Continue(output) if output.is_empty() => {}
                ShellOutcome::Continue(output) => {
                    stdout.write_all(output.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                }
                ShellOutcome::Exit => break,
            }
        }
        Ok(())
    }

    /// Execute one line; errors are rendered, never propagated
    pub async fn execute(&self, line: &str) -> ShellOutcome {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = words.split_first() else {
            return ShellOutcome::Continue(String::new());
        };

        let result = match command {
            "exit" | "quit" => return ShellOutcome::Exit,
            "help" => Ok(SHELL_HELP.to_string()),
            "generate" => self.ctx.wallets.generate_wallet().map(|w| render_wallet(&w)),
            "generate-mnemonic" => self.ctx.wallets.generate_wallet_with_mnemonic().map(|(w, mnemonic)| {
                format!(
                    "{}\nMnemonic: {}\nWrite the mnemonic down; it is not shown again.",
                    render_wallet(&w),
                    mnemonic.expose_secret()
                )
            }),
            "import" if !args.is_empty() => self.ctx.wallets.import_wallet(&args.join(" ")).map(|w| render_wallet(&w)),
            "list" => Ok(self.list()),
            "balance" if args.len() == 1 => self.ctx.balances.get_wallet_balance(args[0]).await.map(|b| render_balance(&b)),
            "refresh" if args.len() == 1 => self
                .ctx
                .balances
                .refresh_wallet_balance(args[0])
                .await
                .map(|b| render_balance(&b)),
            "send" if args.len() >= 3 => self.send(args).await,
            "fees" => Ok(render_fee_report(&self.ctx.transactions.fee_estimate_report())),
            "network" => Ok(self.ctx.monitor.status_summary()),
            "validate" if args.len() == 1 => Ok(render_validation(&self.ctx, args[0])),
            "fund" if args.len() >= 2 => self.fund(args),
            "mine" => self.mine(args),
            _ => Err(invalid_input(format!("Unknown or incomplete command: {}", line.trim()))),
        };

        ShellOutcome::Continue(result.unwrap_or_else(|e| e.user_message()))
    }

    fn list(&self) -> String {
        let wallets = self.ctx.wallets.list_wallets();
        if wallets.is_empty() {
            return "No wallets yet".to_string();
        }
        wallets
            .iter()
            .map(|w| format!("{}  {}", w.wallet_id, w.address))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn send(&self, args: &[&str]) -> WalletResult<String> {
        let amount = parse_request_amount(args[2])?;
        let simulate = !args[3..].contains(&"--broadcast");
        let record = self
            .ctx
            .transactions
            .create_transaction(args[0], args[1], amount, simulate)
            .await?;
        Ok(render_transaction(&record))
    }

    fn fund(&self, args: &[&str]) -> WalletResult<String> {
        let node = self
            .ctx
            .simulated_node()
            .ok_or_else(|| invalid_input("Funding is only available on the simulated node"))?;
        let wallet = self
            .ctx
            .wallets
            .get_wallet(args[0])
            .ok_or_else(|| invalid_input(format!("Wallet not found: {}", args[0])))?;
        let value = parse_bitcoin_amount(args[1])?;
        let confirmations = match args.get(2) {
            Some(c) => c
                .parse::<u32>()
                .map_err(|e| invalid_input_with_source(format!("Invalid confirmation count: {}", c), e))?,
            None => 1,
        };

        let utxo = node.fund(wallet.address(), value, confirmations);
        self.ctx.balances.clear_balance_cache(wallet.wallet_id());
        Ok(format!(
            "Funded {} with {} ({}:{})",
            wallet.wallet_id(),
            format_btc(utxo.value),
            utxo.txid,
            utxo.vout
        ))
    }

    fn mine(&self, args: &[&str]) -> WalletResult<String> {
        let node = self
            .ctx
            .simulated_node()
            .ok_or_else(|| invalid_input("Mining is only available on the simulated node"))?;
        let blocks = match args.first() {
            Some(n) => n
                .parse::<u32>()
                .map_err(|e| invalid_input_with_source(format!("Invalid block count: {}", n), e))?,
            None => 1,
        };
        node.mine_blocks(blocks);
        self.ctx.balances.clear_all_balance_cache();
        Ok(format!("Mined {} block(s); height {}", blocks, node.chain_height()))
    }
}

/// Parse a payment amount, keeping its sign
///
/// Accepts a BTC decimal with an optional `btc` suffix, or satoshis with a
/// `sat`/`sats` suffix.
pub fn parse_request_amount(input: &str) -> WalletResult<i64> {
    let s = input.trim().to_lowercase();
    if let Some(sats) = s.strip_suffix("sats").or_else(|| s.strip_suffix("sat")) {
        let sats = sats.trim();
        return sats
            .parse::<i64>()
            .map_err(|e| invalid_input_with_source(format!("Invalid satoshi value: {}", sats), e));
    }

    let btc = s.strip_suffix("btc").unwrap_or(&s).trim();
    let value =
        Decimal::from_str(btc).map_err(|e| invalid_input_with_source(format!("Could not parse amount: {}", btc), e))?;
    requested_amount_sats(value)
}

pub fn render_wallet(wallet: &Wallet) -> String {
    format!(
        "Wallet ID:  {}\nAddress:    {}\nPublic key: {}\nNetwork:    {}",
        wallet.wallet_id(),
        wallet.address(),
        wallet.public_key(),
        wallet.network()
    )
}

pub fn render_balance(balance: &WalletBalance) -> String {
    format!(
        "Wallet {}\n  Confirmed:   {}\n  Unconfirmed: {}\n  Total:       {}\n  UTXOs:       {}\n  Height:      {}",
        balance.wallet_id(),
        balance.confirmed_btc(),
        balance.unconfirmed_btc(),
        balance.total_btc(),
        balance.utxo_count(),
        balance.chain_height()
    )
}

pub fn render_transaction(record: &TransactionRecord) -> String {
    format!(
        "{}\n  Amount: {}\n  Fee:    {}\n  Raw:    {}",
        record,
        record.amount_btc(),
        record.fee_btc(),
        record.raw_hex()
    )
}

pub fn render_fee_report(report: &FeeEstimateReport) -> String {
    format!(
        "Fee estimates for a typical transaction:\n  LOW:    {} sat ({})\n  MEDIUM: {} sat ({})\n  HIGH:   {} sat ({})\nRecommended: {}\nNetwork: {}",
        report.low,
        report.low_btc,
        report.medium,
        report.medium_btc,
        report.high,
        report.high_btc,
        report.recommended_priority,
        report.network_status
    )
}

fn render_validation(ctx: &AppContext, address: &str) -> String {
    let network = ctx.wallets.store().network();
    if ctx.wallets.validate_address(address) {
        format!("{} is a valid {} address", address, network)
    } else {
        format!("{} is not a valid {} address", address, network)
    }
}

/// Run a one-shot subcommand; `shell` and `serve` are handled by the caller
pub fn run_command(ctx: &AppContext, command: &Command) -> Result<String, BtcWalletError> {
    match command {
        Command::Generate { mnemonic: false } => {
            let wallet = ctx.wallets.generate_wallet()?;
            Ok(format!(
                "{}\nWIF:        {}\nKeep the WIF private; this process does not store it.",
                render_wallet(&wallet),
                wallet.private_key_wif().expose_secret()
            ))
        }
        Command::Generate { mnemonic: true } => {
            let (wallet, mnemonic) = ctx.wallets.generate_wallet_with_mnemonic()?;
            Ok(format!(
                "{}\nMnemonic:   {}\nWrite the mnemonic down; it is not shown again.",
                render_wallet(&wallet),
                mnemonic.expose_secret()
            ))
        }
        Command::Import { key } => ctx.wallets.import_wallet(key).map(|w| render_wallet(&w)),
        Command::ValidateAddress { address } => Ok(render_validation(ctx, address)),
        Command::FeeEstimate { size } => {
            let estimate = ctx.transactions.fee_calculator().fee_estimates(*size);
            Ok(format!(
                "Fees for {} bytes: {}\nRecommended: {}",
                size,
                estimate,
                ctx.monitor.recommended_priority()
            ))
        }
        Command::Network => Ok(ctx.monitor.status_summary()),
        Command::Shell | Command::Serve { .. } => Err(invalid_input("Interactive commands are not one-shot")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request_amount() {
        assert_eq!(parse_request_amount("0.001").unwrap(), 100_000);
        assert_eq!(parse_request_amount("0.5 BTC").unwrap(), 50_000_000);
        assert_eq!(parse_request_amount("2500sats").unwrap(), 2_500);
        assert_eq!(parse_request_amount("-100 sat").unwrap(), -100);
        assert_eq!(parse_request_amount("0").unwrap(), 0);
        assert!(parse_request_amount("lots").is_err());
    }

    #[test]
    fn test_cli_parses_subcommands() {
        let opt = Opt::parse_from(["btcwallet", "--network", "regtest", "fee-estimate", "--size", "400"]);
        assert_eq!(opt.network.as_deref(), Some("regtest"));
        assert!(matches!(opt.command, Command::FeeEstimate { size: 400 }));

        let opt = Opt::parse_from(["btcwallet", "generate", "--mnemonic"]);
        assert!(matches!(opt.command, Command::Generate { mnemonic: true }));
    }
}
