//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::render::{PageFactoryConfig, RenderServiceConfig};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "schemat";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3200;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const DEFAULT_MAX_PAGES: u32 = 3;
const DEFAULT_VIEWPORT_WIDTH: u32 = 1920;
const DEFAULT_VIEWPORT_HEIGHT: u32 = 1080;
const DEFAULT_NAVIGATION_TIMEOUT_SECS: u64 = 30;
const DEFAULT_HELPER_DISCOVERY_TIMEOUT_SECS: u64 = 15;
const DEFAULT_HELPER_POLL_MILLIS: u64 = 500;
const DEFAULT_FRONTEND_READY_TIMEOUT_SECS: u64 = 10;
const DEFAULT_IMAGE_TIMEOUT_SECS: u64 = 30;
const DEFAULT_VIDEO_TIMEOUT_SECS: u64 = 120;
const DEFAULT_BACKEND_WAIT_SECS: u64 = 30;
const DEFAULT_BROWSER_CALL_TIMEOUT_SECS: u64 = 60;
const DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES: u64 = 100 * 1024 * 1024;

/// Command-line arguments for the Schemat binary.
#[derive(Debug, Parser)]
#[command(name = "schemat", version, about = "Schemat render service")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "SCHEMAT_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the render service.
    Serve(Box<ServeArgs>),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the URL the rendering front end is served from.
    #[arg(long = "render-frontend-url", value_name = "URL")]
    pub frontend_url: Option<String>,

    /// Override the number of pre-warmed render pages.
    #[arg(long = "render-max-pages", value_name = "COUNT")]
    pub max_pages: Option<u32>,

    /// Override the still-image render timeout.
    #[arg(long = "render-image-timeout-seconds", value_name = "SECONDS")]
    pub image_timeout_seconds: Option<u64>,

    /// Override the video render timeout.
    #[arg(long = "render-video-timeout-seconds", value_name = "SECONDS")]
    pub video_timeout_seconds: Option<u64>,

    /// Override the Chromium binary path.
    #[arg(long = "browser-binary", value_name = "PATH")]
    pub browser_binary: Option<PathBuf>,

    /// Toggle the Chromium sandbox.
    #[arg(
        long = "browser-sandbox",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub browser_sandbox: Option<bool>,

    /// Override the maximum request size for schematic uploads in bytes.
    #[arg(long = "uploads-max-request-bytes", value_name = "BYTES")]
    pub uploads_max_request_bytes: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub render: RenderSettings,
    pub browser: BrowserSettings,
    pub uploads: UploadSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub frontend_url: String,
    pub max_pages: NonZeroU32,
    pub viewport_width: NonZeroU32,
    pub viewport_height: NonZeroU32,
    pub navigation_timeout: Duration,
    pub helper_discovery_timeout: Duration,
    pub helper_poll_interval: Duration,
    pub frontend_ready_timeout: Duration,
    pub image_timeout: Duration,
    pub video_timeout: Duration,
    pub backend_wait: Duration,
}

impl From<&RenderSettings> for PageFactoryConfig {
    fn from(settings: &RenderSettings) -> Self {
        Self {
            frontend_url: settings.frontend_url.clone(),
            navigation_timeout: settings.navigation_timeout,
            helper_discovery_timeout: settings.helper_discovery_timeout,
            helper_poll_interval: settings.helper_poll_interval,
            frontend_ready_timeout: settings.frontend_ready_timeout,
        }
    }
}

impl From<&RenderSettings> for RenderServiceConfig {
    fn from(settings: &RenderSettings) -> Self {
        Self {
            backend_wait: settings.backend_wait,
            image_timeout: settings.image_timeout,
            video_timeout: settings.video_timeout,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub binary: Option<PathBuf>,
    pub sandbox: bool,
    pub call_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct UploadSettings {
    pub max_request_bytes: NonZeroU64,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SCHEMAT").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    render: RawRenderSettings,
    browser: RawBrowserSettings,
    uploads: RawUploadSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(seconds) = overrides.server_graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.frontend_url.as_ref() {
            self.render.frontend_url = Some(url.clone());
        }
        if let Some(pages) = overrides.max_pages {
            self.render.max_pages = Some(pages);
        }
        if let Some(seconds) = overrides.image_timeout_seconds {
            self.render.image_timeout_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.video_timeout_seconds {
            self.render.video_timeout_seconds = Some(seconds);
        }
        if let Some(binary) = overrides.browser_binary.as_ref() {
            self.browser.binary = Some(binary.clone());
        }
        if let Some(sandbox) = overrides.browser_sandbox {
            self.browser.sandbox = Some(sandbox);
        }
        if let Some(limit) = overrides.uploads_max_request_bytes {
            self.uploads.max_request_bytes = Some(limit);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            render,
            browser,
            uploads,
        } = raw;

        let server = build_server_settings(server)?;
        let logging = build_logging_settings(logging)?;
        let render = build_render_settings(render)?;
        let browser = build_browser_settings(browser)?;
        let uploads = build_upload_settings(uploads)?;

        Ok(Self {
            server,
            logging,
            render,
            browser,
            uploads,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let frontend_url = render
        .frontend_url
        .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string());
    let trimmed = frontend_url.trim();
    if trimmed.is_empty() {
        return Err(LoadError::invalid(
            "render.frontend_url",
            "url must not be empty",
        ));
    }
    if !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
        return Err(LoadError::invalid(
            "render.frontend_url",
            "url must start with http:// or https://",
        ));
    }

    let max_pages = non_zero_u32(
        render.max_pages.unwrap_or(DEFAULT_MAX_PAGES).into(),
        "render.max_pages",
    )?;
    let viewport_width = non_zero_u32(
        render
            .viewport_width
            .unwrap_or(DEFAULT_VIEWPORT_WIDTH)
            .into(),
        "render.viewport_width",
    )?;
    let viewport_height = non_zero_u32(
        render
            .viewport_height
            .unwrap_or(DEFAULT_VIEWPORT_HEIGHT)
            .into(),
        "render.viewport_height",
    )?;

    Ok(RenderSettings {
        frontend_url: trimmed.to_string(),
        max_pages,
        viewport_width,
        viewport_height,
        navigation_timeout: positive_secs(
            render.navigation_timeout_seconds,
            DEFAULT_NAVIGATION_TIMEOUT_SECS,
            "render.navigation_timeout_seconds",
        )?,
        helper_discovery_timeout: positive_secs(
            render.helper_discovery_timeout_seconds,
            DEFAULT_HELPER_DISCOVERY_TIMEOUT_SECS,
            "render.helper_discovery_timeout_seconds",
        )?,
        helper_poll_interval: positive_millis(
            render.helper_poll_millis,
            DEFAULT_HELPER_POLL_MILLIS,
            "render.helper_poll_millis",
        )?,
        frontend_ready_timeout: positive_secs(
            render.frontend_ready_timeout_seconds,
            DEFAULT_FRONTEND_READY_TIMEOUT_SECS,
            "render.frontend_ready_timeout_seconds",
        )?,
        image_timeout: positive_secs(
            render.image_timeout_seconds,
            DEFAULT_IMAGE_TIMEOUT_SECS,
            "render.image_timeout_seconds",
        )?,
        video_timeout: positive_secs(
            render.video_timeout_seconds,
            DEFAULT_VIDEO_TIMEOUT_SECS,
            "render.video_timeout_seconds",
        )?,
        backend_wait: positive_secs(
            render.backend_wait_seconds,
            DEFAULT_BACKEND_WAIT_SECS,
            "render.backend_wait_seconds",
        )?,
    })
}

fn build_browser_settings(browser: RawBrowserSettings) -> Result<BrowserSettings, LoadError> {
    if let Some(binary) = browser.binary.as_ref()
        && binary.as_os_str().is_empty()
    {
        return Err(LoadError::invalid(
            "browser.binary",
            "path must not be empty",
        ));
    }

    Ok(BrowserSettings {
        binary: browser.binary,
        // The original deployment ran Chromium with the sandbox disabled;
        // container images rarely grant the privileges it needs.
        sandbox: browser.sandbox.unwrap_or(false),
        call_timeout: positive_secs(
            browser.call_timeout_seconds,
            DEFAULT_BROWSER_CALL_TIMEOUT_SECS,
            "browser.call_timeout_seconds",
        )?,
    })
}

fn build_upload_settings(uploads: RawUploadSettings) -> Result<UploadSettings, LoadError> {
    let max_request_bytes_value = uploads
        .max_request_bytes
        .unwrap_or(DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES);
    let max_request_bytes = NonZeroU64::new(max_request_bytes_value).ok_or_else(|| {
        LoadError::invalid("uploads.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(max_request_bytes_value).map_err(|_| {
        LoadError::invalid(
            "uploads.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(UploadSettings { max_request_bytes })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    frontend_url: Option<String>,
    max_pages: Option<u32>,
    viewport_width: Option<u32>,
    viewport_height: Option<u32>,
    navigation_timeout_seconds: Option<u64>,
    helper_discovery_timeout_seconds: Option<u64>,
    helper_poll_millis: Option<u64>,
    frontend_ready_timeout_seconds: Option<u64>,
    image_timeout_seconds: Option<u64>,
    video_timeout_seconds: Option<u64>,
    backend_wait_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawBrowserSettings {
    binary: Option<PathBuf>,
    sandbox: Option<bool>,
    call_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawUploadSettings {
    max_request_bytes: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn positive_secs(
    value: Option<u64>,
    default: u64,
    key: &'static str,
) -> Result<Duration, LoadError> {
    let seconds = value.unwrap_or(default);
    if seconds == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_secs(seconds))
}

fn positive_millis(
    value: Option<u64>,
    default: u64,
    key: &'static str,
) -> Result<Duration, LoadError> {
    let millis = value.unwrap_or(default);
    if millis == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_resolve() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

        assert_eq!(settings.server.addr.port(), DEFAULT_PORT);
        assert_eq!(settings.render.frontend_url, DEFAULT_FRONTEND_URL);
        assert_eq!(settings.render.max_pages.get(), DEFAULT_MAX_PAGES);
        assert_eq!(settings.render.image_timeout, Duration::from_secs(30));
        assert_eq!(settings.render.video_timeout, Duration::from_secs(120));
        assert_eq!(
            settings.uploads.max_request_bytes.get(),
            DEFAULT_UPLOAD_REQUEST_LIMIT_BYTES
        );
        assert!(!settings.browser.sandbox);
    }

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            log_level: Some("debug".to_string()),
            max_pages: Some(5),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
        assert_eq!(settings.render.max_pages.get(), 5);
    }

    #[test]
    fn cli_json_logging_enforces_format() {
        let mut raw = RawSettings::default();
        let overrides = ServeOverrides {
            log_json: Some(true),
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert!(matches!(settings.logging.format, LogFormat::Json));
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let mut raw = RawSettings::default();
        raw.render.max_pages = Some(0);

        let err = Settings::from_raw(raw).expect_err("zero pages must fail");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "render.max_pages",
                ..
            }
        ));
    }

    #[test]
    fn frontend_url_must_be_http() {
        let mut raw = RawSettings::default();
        raw.render.frontend_url = Some("ftp://renderer".to_string());

        let err = Settings::from_raw(raw).expect_err("non-http url must fail");
        assert!(matches!(
            err,
            LoadError::Invalid {
                key: "render.frontend_url",
                ..
            }
        ));
    }

    #[test]
    fn factory_config_carries_timeout_ladder() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
        let factory = PageFactoryConfig::from(&settings.render);

        assert_eq!(factory.navigation_timeout, Duration::from_secs(30));
        assert_eq!(factory.helper_discovery_timeout, Duration::from_secs(15));
        assert_eq!(factory.helper_poll_interval, Duration::from_millis(500));
        assert_eq!(factory.frontend_ready_timeout, Duration::from_secs(10));
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["schemat"]);
        let command = args
            .command
            .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
        assert!(matches!(command, Command::Serve(_)));
    }

    #[test]
    fn parse_serve_overrides() {
        let args = CliArgs::parse_from([
            "schemat",
            "serve",
            "--render-max-pages",
            "6",
            "--browser-sandbox",
            "true",
        ]);

        match args.command.expect("serve command") {
            Command::Serve(serve) => {
                assert_eq!(serve.overrides.max_pages, Some(6));
                assert_eq!(serve.overrides.browser_sandbox, Some(true));
            }
        }
    }
}
