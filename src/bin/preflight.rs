use odoo_mercury_bridge::infra::config::mask_secret;
use odoo_mercury_bridge::{AppConfig, MercuryApi, MercuryClient, OdooClient, OdooExecutor, SyncStore};

fn usage_and_exit() -> ! {
    eprintln!(
        "Usage: cargo run --bin preflight -- [--skip-mercury]\n\
         \n\
         Reads env vars (or .env):\n\
           ODOO_URL, ODOO_DB, ODOO_USERNAME, ODOO_API_KEY,\n\
           MERCURY_API_TOKEN, MERCURY_API_BASE, MERCURY_SYNC_DB, SLACK_WEBHOOK_URL\n"
    );
    std::process::exit(2);
}

fn masked(value: Option<&str>) -> String {
    value.map(mask_secret).unwrap_or_else(|| "(not set)".to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        usage_and_exit();
    }
    let skip_mercury = args.iter().any(|a| a == "--skip-mercury");

    let config = AppConfig::from_env()?;

    println!("> Preflight:");
    println!("  API_BIND_ADDR={}", config.bind_addr);
    println!("  ODOO_URL={}", config.odoo.url);
    println!("  ODOO_DB={}", config.odoo.db);
    println!("  ODOO_USERNAME={}", config.odoo.username);
    println!(
        "  ODOO_API_KEY={}",
        masked(Some(config.odoo.api_key.as_str()).filter(|k| !k.is_empty()))
    );
    println!("  MERCURY_API_BASE={}", config.mercury.api_base);
    println!("  MERCURY_API_TOKEN={}", masked(config.mercury.api_token.as_deref()));
    println!("  MERCURY_SYNC_DB={}", config.mercury.sync_db);
    println!(
        "  MERCURY_SYNC_INTERVAL={} MERCURY_AUTO_RECONCILE={} MERCURY_MIN_CONFIDENCE={}",
        config.mercury.sync_interval_minutes,
        config.mercury.auto_reconcile,
        config.mercury.min_confidence
    );
    println!("  SLACK_WEBHOOK_URL={}", masked(config.slack_webhook_url.as_deref()));

    // Odoo login
    let odoo = OdooClient::new(config.odoo.clone())?;
    let uid = odoo
        .authenticate()
        .await
        .map_err(|e| anyhow::anyhow!("Odoo authentication against {} failed: {}", odoo.url(), e))?;
    println!("  Odoo authenticated (uid={}).", uid);

    // Sync state database
    let store = SyncStore::connect(&config.mercury.sync_db)
        .await
        .map_err(|e| anyhow::anyhow!("Cannot open sync database {}: {}", config.mercury.sync_db, e))?;
    let stats = store.get_stats().await?;
    println!(
        "  Sync database ok ({} processed transactions, {} reconciled).",
        stats.total_transactions, stats.reconciled
    );

    // Mercury connectivity
    if skip_mercury {
        println!("  Mercury check skipped (--skip-mercury).");
    } else {
        let token = config.mercury.api_token.as_deref().ok_or_else(|| {
            anyhow::anyhow!("MERCURY_API_TOKEN is not set. Re-run with --skip-mercury to ignore Mercury")
        })?;
        let bank = MercuryClient::new(&config.mercury.api_base, token)?;
        let health = bank.health_check().await;
        if !health.connected {
            return Err(anyhow::anyhow!(
                "Mercury API unreachable: {}",
                health.error.unwrap_or_default()
            ));
        }
        println!(
            "  Mercury connected ({} accounts).",
            health.account_count.unwrap_or_default()
        );
    }

    println!("> Preflight OK.");
    Ok(())
}
