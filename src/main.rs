use actix_server::ServerHandle;
use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};
use log::{debug, error, info};
use minirouter_ui::{
    api::{self, Api},
    config::{AppConfig, OutputMode},
    input::InputDispatcher,
    network_client::NetworkClient,
    render::Renderer,
    services::pollers::StatusPollers,
    status::StatusStore,
    transport::{
        OutputTransport,
        pull::PullTransport,
        push::{Endpoint, PushTransport},
    },
    ui::{controller::Controller, menu::root_menu},
};
use std::{io::Write, sync::Arc, time::Instant};
use tokio::{
    signal::unix::{SignalKind, signal},
    time::MissedTickBehavior,
};

enum Output {
    Pull(ServerHandle),
    Push(Arc<PushTransport>),
}

#[actix_web::main]
async fn main() {
    if let Err(e) = run().await {
        error!("application error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = AppConfig::init();
    initialize(config.as_ref().map_or("info", |config| config.log_level.as_str()));
    let config = config.context("failed to load configuration")?;

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;

    let client = NetworkClient::new(config).context("failed to create network client")?;
    let store = StatusStore::new();
    let pollers = StatusPollers::new(
        client.clone(),
        store.clone(),
        config.refresh_interval(),
        config.check_dns.clone(),
    )
    .spawn();

    let (transport, output) = start_output(config).await?;

    let mut controller = Controller::new(
        client,
        store.clone(),
        Renderer::new(&config.display),
        transport,
        root_menu(config.display.page_size()),
        config.refresh_interval(),
        config.push_interval(),
    );
    controller.tick(Instant::now());

    let (dispatcher, mut buttons) = InputDispatcher::new();
    dispatcher.spawn_keyboard(config.keys);
    if let Some(remote) = &config.buttons_server {
        dispatcher.spawn_remote(remote.clone());
    }

    controller.mark_ready();
    info!("ui ready");

    let mut ticks = tokio::time::interval(config.tick_period());
    ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status_dump = tokio::time::interval(config.refresh_interval());
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                debug!("ctrl-c received");
                break;
            }
            _ = sigterm.recv() => {
                debug!("SIGTERM received");
                break;
            }
            Some(button) = buttons.recv() => controller.press(button, Instant::now()),
            _ = ticks.tick() => controller.tick(Instant::now()),
            _ = status_dump.tick() => debug!("status: {:?}", store.current()),
        }
    }

    info!("shutting down");

    for poller in pollers {
        poller.abort();
    }

    match output {
        Output::Pull(server_handle) => server_handle.stop(true).await,
        Output::Push(push) => {
            if let Err(e) = push.shutdown().await {
                error!("failed to clear display: {e:#}");
            }
        }
    }

    info!("shutdown complete");
    Ok(())
}

fn initialize(log_level: &str) {
    log_panics::init();

    let mut builder = if cfg!(debug_assertions) {
        Builder::from_env(Env::default().default_filter_or("debug"))
    } else {
        Builder::from_env(Env::default().default_filter_or(log_level))
    };

    builder.format(|f, record| match record.level() {
        log::Level::Error => {
            eprintln!("{}", record.args());
            Ok(())
        }
        _ => {
            writeln!(f, "{}", record.args())
        }
    });

    builder.target(Target::Stdout).init();

    info!("module version: {}", env!("CARGO_PKG_VERSION"));
}

async fn start_output(config: &AppConfig) -> Result<(Arc<dyn OutputTransport>, Output)> {
    match config.output {
        OutputMode::Web => {
            let pull = Arc::new(PullTransport::new(
                config.output_scale,
                config.output_border,
            ));
            let (server_handle, server_task) =
                api::run_server(Api::new(pull.clone()), &config.web.host, config.web.port)
                    .await?;

            tokio::spawn(async move {
                match server_task.await {
                    Ok(Ok(())) => debug!("server stopped normally"),
                    Ok(Err(e)) => error!("server stopped with error: {e}"),
                    Err(e) => error!("server task panicked: {e}"),
                }
            });

            let transport: Arc<dyn OutputTransport> = pull;
            Ok((transport, Output::Pull(server_handle)))
        }
        OutputMode::Display => {
            let push = Arc::new(
                PushTransport::connect(
                    Endpoint::parse(&config.display_server),
                    config.ack_timeout(),
                    config.display.pixel_count(),
                )
                .await?,
            );

            let transport: Arc<dyn OutputTransport> = push.clone();
            Ok((transport, Output::Push(push)))
        }
    }
}
