// src/main.rs - Engine daemon entry point
use lithos::commands::Command;
use lithos::config::Settings;
use lithos::engine::PrintEngine;
use lithos::projector::NullProjector;
use std::env;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::LocalSet;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    tracing::info!("Lithos SLA print engine");

    let args: Vec<String> = env::args().collect();
    let config_path = args.get(1).map(String::as_str).unwrap_or("lithos.toml");

    let settings = if Path::new(config_path).exists() {
        tracing::info!("loading configuration from {config_path}");
        Settings::load(Path::new(config_path)).map_err(|e| {
            tracing::error!("failed to load config from '{config_path}': {e}");
            e
        })?
    } else {
        tracing::info!("no configuration file at {config_path}, using defaults");
        Settings::default()
    };

    let (command_tx, command_rx) = mpsc::unbounded_channel::<Command>();

    // the projector driver is provided by the display layer; the engine
    // itself runs dark on bench setups
    let (mut engine, _sources) =
        match PrintEngine::new(settings, Box::new(NullProjector), command_rx) {
            Ok(engine) => engine,
            Err(e) => {
                tracing::error!("engine bring-up failed: {e}");
                return Err(e.into());
            }
        };

    let local = LocalSet::new();

    // commands arrive one per line on stdin from the upstream parser
    local.spawn_local(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            let Ok(command) = line.parse::<Command>() else {
                continue;
            };
            let exit = command == Command::Exit;
            if command_tx.send(command).is_err() || exit {
                break;
            }
        }
    });

    local
        .run_until(async move {
            engine.begin().await;
            engine.run().await;
        })
        .await;

    tracing::info!("engine stopped");
    Ok(())
}
