use anyhow::anyhow;
use clap::Parser;
use log::{error, info};
use std::process;
use std::sync::Arc;

use btcwallet_app::cli::{run_command, Command, Opt, Shell};
use btcwallet_app::context::AppContext;
use btcwallet_app::server;
use btcwallet_core::config::{default_config_path, Config};
use btcwallet_core::logging;

#[tokio::main]
async fn main() {
    let opt = Opt::parse();

    if let Err(e) = run(opt).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

async fn run(opt: Opt) -> anyhow::Result<()> {
    let path = opt.config.clone().unwrap_or_else(default_config_path);
    let mut config = Config::load_or_default(&path)?;
    if let Some(network) = &opt.network {
        config.wallet.network = network.clone();
    }

    logging::init(&config.logging).map_err(|e| anyhow!(e))?;
    info!("Loaded configuration from {}", path.display());

    let ctx = Arc::new(AppContext::from_config(config)?);
    if let Err(e) = ctx.connect().await {
        // Key and fee commands still work without a node
        log::warn!("Node connection failed: {}", e);
    }

    match opt.command {
        Command::Shell => {
            let refresh = ctx.start_background_refresh();
            Shell::new(Arc::clone(&ctx)).run().await?;
            if let Some(handle) = refresh {
                handle.shutdown().await;
            }
        }
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| ctx.config.server.bind.clone());
            let _refresh = ctx.start_background_refresh();
            server::serve(Arc::clone(&ctx), &bind).await?;
        }
        command => match run_command(&ctx, &command) {
            Ok(output) => println!("{}", output),
            Err(e) => {
                eprintln!("{}", e.user_message());
                process::exit(1);
            }
        },
    }

    Ok(())
}
