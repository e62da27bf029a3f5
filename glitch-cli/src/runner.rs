use clap::ArgMatches;
use log::{error, info, warn};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use glitch_lib::catalog::Catalog;
use glitch_lib::pipeline::{Engine, Output};
use glitch_lib::settings::EngineSettings;

use crate::cli::config::{catalog_dir, load_settings};
use crate::logging::LogBuffer;
use crate::server::{self, AppState};

pub fn run(args: &ArgMatches, log_buffer: LogBuffer) -> Result<i32, String> {
    match args.subcommand() {
        Some(("serve", sub)) => serve(sub, log_buffer),
        Some(("render", sub)) => render(sub),
        Some(("create", sub)) => create(sub),
        _ => Err("unknown command".to_string()),
    }
}

fn serve(args: &ArgMatches, log_buffer: LogBuffer) -> Result<i32, String> {
    let mut settings = load_settings(args)?;
    if args.get_flag("no-pace") {
        settings.render.pace = false;
    }
    let catalog = Catalog::load(catalog_dir(args)?, &settings.render).map_err(|e| e.to_string())?;
    let addr = listen_addr(args)?;

    let mut engine = Engine::with_source(settings.clone(), Box::new(catalog));
    engine.start(Output::Broadcast).map_err(|e| e.to_string())?;
    info!("Starting Glitch broadcast");

    let state = AppState {
        ring: engine.ring(),
        status: engine.status(),
        log: log_buffer,
        listener_lead: settings.broadcast.listener_lead,
        poll_interval: Duration::from_millis(settings.broadcast.listener_poll_ms),
    };
    let control = engine.control();
    let on_failure = control.clone();

    let runtime = tokio::runtime::Runtime::new().map_err(|e| e.to_string())?;
    let result = runtime.block_on(async move {
        let (done_tx, done_rx) = tokio::sync::oneshot::channel();
        let engine_task = tokio::task::spawn_blocking(move || {
            let result = engine.wait();
            let _ = done_tx.send(());
            result
        });

        let signals = async move {
            let mut done_rx = done_rx;
            tokio::select! {
                _ = &mut done_rx => {
                    warn!("Render pipeline ended");
                    return;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Interrupted, fading out. Press Ctrl-C again to stop now.");
                    control.stop();
                }
            }
            tokio::select! {
                _ = &mut done_rx => {}
                _ = tokio::signal::ctrl_c() => control.shutdown(),
            }
        };

        if let Err(err) = server::serve(addr, state, signals).await {
            error!("Server failed: {}", err);
            on_failure.shutdown();
        }
        engine_task
            .await
            .map_err(|e| e.to_string())?
            .map_err(|e| e.to_string())
    });

    result.map(|()| 0)
}

fn render(args: &ArgMatches) -> Result<i32, String> {
    let mut settings: EngineSettings = load_settings(args)?;
    settings.render.pace = false;
    let catalog = Catalog::load(catalog_dir(args)?, &settings.render).map_err(|e| e.to_string())?;
    let output = args
        .get_one::<String>("output")
        .map(PathBuf::from)
        .ok_or_else(|| "no output file given".to_string())?;

    info!("Rendering {} tracks to {}", catalog.len(), output.display());
    let mut engine = Engine::new(settings);
    engine
        .enqueue_all(catalog.all_in_order())
        .map_err(|e| e.to_string())?;
    engine.start(Output::File(output)).map_err(|e| e.to_string())?;
    engine.wait().map_err(|e| e.to_string())?;
    Ok(0)
}

fn create(args: &ArgMatches) -> Result<i32, String> {
    match args.subcommand() {
        Some(("config", _)) => {
            let json = serde_json::to_string_pretty(&EngineSettings::default())
                .map_err(|e| e.to_string())?;
            println!("{}", json);
            Ok(0)
        }
        _ => Err("nothing to create; try `glitch create config`".to_string()),
    }
}

fn listen_addr(args: &ArgMatches) -> Result<SocketAddr, String> {
    let host = args
        .get_one::<String>("host")
        .map(String::as_str)
        .unwrap_or("0.0.0.0");
    let port = args
        .get_one::<String>("port")
        .map(String::as_str)
        .unwrap_or("8889");
    let ip: IpAddr = host.parse().map_err(|_| format!("invalid host {}", host))?;
    let port: u16 = port.parse().map_err(|_| format!("invalid port {}", port))?;
    Ok(SocketAddr::new(ip, port))
}
