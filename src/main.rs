use std::{process, sync::Arc, time::Instant};

use schemat::{
    application::error::AppError,
    application::render::{
        PageFactory, PageFactoryConfig, PagePool, ReadinessGate, RenderService,
        RenderServiceConfig,
    },
    config,
    infra::{
        browser::ChromeHost,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let viewport = (
        settings.render.viewport_width.get(),
        settings.render.viewport_height.get(),
    );
    let host = Arc::new(ChromeHost::launch(&settings.browser, viewport).map_err(AppError::from)?);
    info!(
        target = "schemat::startup",
        width = viewport.0,
        height = viewport.1,
        "browser launched"
    );

    let factory = PageFactory::new(host, PageFactoryConfig::from(&settings.render));
    let pool = Arc::new(PagePool::new(
        factory,
        settings.render.max_pages.get() as usize,
    ));
    let gate = Arc::new(ReadinessGate::new());
    let renderer = Arc::new(RenderService::new(
        pool.clone(),
        gate,
        RenderServiceConfig::from(&settings.render),
    ));

    // Bootstrap runs while the listener already accepts connections; early
    // requests wait on the readiness gate instead of racing page creation.
    let bootstrapper = renderer.clone();
    let warmup = tokio::spawn(async move {
        let pages = bootstrapper.initialize().await;
        info!(
            target = "schemat::startup",
            pages, "render backend bootstrap finished"
        );
    });

    let state = HttpState {
        renderer,
        started_at: Instant::now(),
        upload_limit_bytes: settings.uploads.max_request_bytes.get(),
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "schemat::startup",
        addr = %settings.server.addr,
        "listening"
    );

    let serve_result = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")));

    warmup.abort();
    let _ = warmup.await;

    if tokio::time::timeout(settings.server.graceful_shutdown, pool.shutdown())
        .await
        .is_err()
    {
        warn!(
            target = "schemat::shutdown",
            "render pool did not close within the graceful shutdown window"
        );
    }

    serve_result
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(
            target = "schemat::shutdown",
            error = %err,
            "failed to listen for shutdown signal"
        );
        return;
    }
    info!(
        target = "schemat::shutdown",
        "shutdown signal received, draining"
    );
}
