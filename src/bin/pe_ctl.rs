//! Command-line client for the reminder service
//!
//! Sends one request over the IPC socket and prints the response data as JSON.
//! Document files may be JSON or YAML.
//!
//! Usage: cargo run --bin pe-ctl -- <command> [args]

use anyhow::{anyhow, Result};
use dotenvy::dotenv;
use purchase_enhancements::core::documents::{PurchaseOrder, PurchaseReceipt};
use purchase_enhancements::features::reminders::{Job, ReminderStatus};
use purchase_enhancements::ipc::connect_with_retry;
use purchase_enhancements::Settings;
use serde::de::DeserializeOwned;
use std::time::Duration;

const USAGE: &str = "Usage: pe-ctl <command> [args]

Commands:
  ping
  submit-po <file>
  update-po <file>
  cancel-po <name>
  submit-receipt <file>
  cancel-receipt <name>
  history <item_code> <project> <company> [limit]
  settings
  set-settings <file>
  reminders [open|closed|all] [purchase_order]
  run-job <escalate|digest|cleanup>";

fn load<T: DeserializeOwned>(path: &str) -> Result<T> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("Failed to read {}: {}", path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| anyhow!("Failed to parse {}: {}", path, e))
}

fn arg<'a>(args: &'a [String], idx: usize, name: &str) -> Result<&'a str> {
    args.get(idx)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Missing <{}>\n\n{}", name, USAGE))
}

async fn run(args: Vec<String>) -> Result<serde_json::Value> {
    let command = arg(&args, 0, "command")?;
    let mut client = connect_with_retry(3, Duration::from_millis(500)).await?;

    match command {
        "ping" => client.ping().await,
        "submit-po" => {
            let order: PurchaseOrder = load(arg(&args, 1, "file")?)?;
            client.submit_purchase_order(order).await
        }
        "update-po" => {
            let order: PurchaseOrder = load(arg(&args, 1, "file")?)?;
            client.update_purchase_order(order).await
        }
        "cancel-po" => {
            client
                .cancel_purchase_order(arg(&args, 1, "name")?.to_string())
                .await
        }
        "submit-receipt" => {
            let receipt: PurchaseReceipt = load(arg(&args, 1, "file")?)?;
            client.submit_purchase_receipt(receipt).await
        }
        "cancel-receipt" => {
            client
                .cancel_purchase_receipt(arg(&args, 1, "name")?.to_string())
                .await
        }
        "history" => {
            let limit = match args.get(4) {
                Some(raw) => Some(
                    raw.parse::<usize>()
                        .map_err(|e| anyhow!("Invalid limit '{}': {}", raw, e))?,
                ),
                None => None,
            };
            client
                .get_item_project_history(
                    arg(&args, 1, "item_code")?.to_string(),
                    arg(&args, 2, "project")?.to_string(),
                    arg(&args, 3, "company")?.to_string(),
                    limit,
                )
                .await
        }
        "settings" => client.get_settings().await,
        "set-settings" => {
            let settings: Settings = load(arg(&args, 1, "file")?)?;
            client.update_settings(settings).await
        }
        "reminders" => {
            let status = match args.get(1).map(String::as_str) {
                None | Some("all") => None,
                Some(raw) => Some(raw.parse::<ReminderStatus>()?),
            };
            client.list_reminders(status, args.get(2).cloned()).await
        }
        "run-job" => {
            let job: Job = arg(&args, 1, "job")?.parse()?;
            client.run_job(job).await
        }
        other => Err(anyhow!("Unknown command: {}\n\n{}", other, USAGE)),
    }
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() || args[0] == "-h" || args[0] == "--help" {
        println!("{USAGE}");
        return;
    }

    match run(args).await {
        Ok(data) => match serde_json::to_string_pretty(&data) {
            Ok(pretty) => println!("{pretty}"),
            Err(_) => println!("{data}"),
        },
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
