use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, eyre};

use tron_ledger::config::{Command, Config, OutputArgs, OutputFormat};
use tron_ledger::data::export;
use tron_ledger::data::provider::TronGridClient;
use tron_ledger::data::tronscan::{CbrRateClient, TronScanClient};
use tron_ledger::data::types::{ClassifiedPage, Cursor, NormalizedTransfer, incoming_only};
use tron_ledger::utils;
use tron_ledger::{FeedState, History, HistoryOptions, LedgerService, TronAddress};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let config = Config::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .with_max_level(if config.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    let settings = config.pipeline_settings();
    let page_size = settings.page_size;
    let service = LedgerService::new(
        Arc::new(TronGridClient::new(
            config.trongrid_url.clone(),
            config.trongrid_api_key.clone(),
        )),
        Arc::new(TronScanClient::new(
            config.tronscan_url.clone(),
            config.tronscan_api_key.clone(),
        )),
        Arc::new(CbrRateClient::new(config.fx_url.clone())),
        settings,
    );

    match config.command {
        Command::History {
            wallet,
            max_count,
            cursor,
            trc20_cursor,
            no_native,
            no_trc20,
            incoming,
            output,
        } => {
            let address = parse_address(&wallet)?;
            let options = HistoryOptions {
                max_count,
                native: start_state(no_native, cursor),
                trc20: start_state(no_trc20, trc20_cursor),
            };
            let history = service.collect_history(&address, &options).await?;
            let resume = resume_args(&history);
            let pages = history.pages;
            let dropped = history.dropped.len();
            let transfers = if incoming {
                incoming_only(history.transfers, &address)
            } else {
                history.transfers
            };
            emit_transfers(&transfers, &output)?;
            eprintln!(
                "{} transfers from {pages} pages, {dropped} dropped",
                utils::format_number(transfers.len() as u64),
            );
            if let Some(resume) = resume {
                eprintln!("stopped at --max-count; continue with: {resume}");
            }
        }
        Command::Page {
            wallet,
            cursor,
            output,
        } => {
            let address = parse_address(&wallet)?;
            let cursor = cursor.map(Cursor::new);
            let page = service
                .transactions_page(&address, page_size, cursor.as_ref())
                .await?;
            emit_page(&page, &output)?;
        }
        Command::Trc20 {
            wallet,
            cursor,
            output,
        } => {
            let address = parse_address(&wallet)?;
            let cursor = cursor.map(Cursor::new);
            let page = service
                .trc20_page(&address, page_size, cursor.as_ref())
                .await?;
            emit_page(&page, &output)?;
        }
        Command::Tx { tx_id, output } => match service.transaction(&tx_id).await? {
            Some(transfer) => emit_transfers(&[transfer], &output)?,
            None => eprintln!("transaction {tx_id} is not a transfer"),
        },
        Command::Tokens => {
            let tokens = service.verified_tokens().await?;
            print!("{}", utils::token_table(&tokens));
        }
        Command::Contract { contract } => {
            let address = parse_address(&contract)?;
            let info = service.contract_info(&address).await?;
            println!("{}", export::to_json(&info).map_err(|e| eyre!(e))?);
        }
        Command::Details { wallet, contracts } => {
            let address = parse_address(&wallet)?;
            let tokens = service.wallet_details(&address, &contracts).await?;
            print!("{}", utils::wallet_table(&tokens));
        }
        Command::Rate => {
            let rate = service.usd_rub_rate().await?;
            println!("USD/RUB {}", utils::format_price(rate));
        }
    }

    Ok(())
}

fn parse_address(input: &str) -> Result<TronAddress> {
    TronAddress::parse(input).wrap_err_with(|| format!("invalid address '{input}'"))
}

fn start_state(skip: bool, cursor: Option<String>) -> FeedState {
    if skip {
        FeedState::Excluded
    } else {
        FeedState::NotStarted(cursor.map(Cursor::new))
    }
}

/// Flags that pick up the walk where `history` stopped, if it was cut short.
fn resume_args(history: &History) -> Option<String> {
    if !history.truncated {
        return None;
    }
    let mut args = Vec::new();
    match &history.native {
        FeedState::Exhausted | FeedState::Excluded => args.push("--no-native".to_string()),
        state => args.extend(state.cursor().map(|c| format!("--cursor {c}"))),
    }
    match &history.trc20 {
        FeedState::Exhausted | FeedState::Excluded => args.push("--no-trc20".to_string()),
        state => args.extend(state.cursor().map(|c| format!("--trc20-cursor {c}"))),
    }
    Some(args.join(" "))
}

fn emit_page(page: &ClassifiedPage, output: &OutputArgs) -> Result<()> {
    emit_transfers(&page.transfers, output)?;
    for dropped in &page.dropped {
        eprintln!("dropped {}: {}", dropped.tx_id, dropped.error);
    }
    match &page.next_cursor {
        Some(cursor) => eprintln!("next cursor: {cursor}"),
        None => eprintln!("no more pages"),
    }
    Ok(())
}

fn emit_transfers(transfers: &[NormalizedTransfer], output: &OutputArgs) -> Result<()> {
    match (&output.output, output.format) {
        (Some(path), OutputFormat::Csv) => {
            let message = export::export_transfers_csv(transfers, &path_str(path)?)
                .map_err(|e| eyre!(e))?;
            eprintln!("{message}");
        }
        (Some(path), OutputFormat::Json) => {
            let message = export::export_json(transfers, &path_str(path)?).map_err(|e| eyre!(e))?;
            eprintln!("{message}");
        }
        (Some(path), OutputFormat::Table) => {
            std::fs::write(path, utils::transfer_table(transfers))
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
        }
        (None, OutputFormat::Csv) => {
            export::write_transfers_csv(transfers, io::stdout().lock()).map_err(|e| eyre!(e))?;
        }
        (None, OutputFormat::Json) => {
            println!("{}", export::to_json(transfers).map_err(|e| eyre!(e))?);
        }
        (None, OutputFormat::Table) => {
            io::stdout().lock().write_all(utils::transfer_table(transfers).as_bytes())?;
        }
    }
    Ok(())
}

fn path_str(path: &Path) -> Result<String> {
    path.to_str()
        .map(str::to_string)
        .ok_or_else(|| eyre!("output path is not valid UTF-8: {}", path.display()))
}
