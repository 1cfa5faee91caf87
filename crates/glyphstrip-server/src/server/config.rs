use anyhow::{Context, bail};
use clap::Parser;
use core::time::Duration;
use glyphstrip_core::DEFAULT_STYLE;
use reqwest::Url;

/// Runtime configuration for the `glyphstrip-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first). Collaborator addresses are optional: when one
/// is not given, the service locator falls back to its documented default.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "glyphstrip-server",
    version,
    about = "Renders text by fanning characters out to rendering services"
)]
pub struct CliArgs {
    /// Address to listen on.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:3001"))]
    pub server_addr: String,

    /// Base URL of the letter rendering service.
    ///
    /// Environment variable: `LETTER_SERVICE_URL`
    #[arg(long, env = "LETTER_SERVICE_URL")]
    pub letter_service_url: Option<String>,

    /// Base URL of the digit rendering service.
    ///
    /// Environment variable: `NUMBER_SERVICE_URL`
    #[arg(long, env = "NUMBER_SERVICE_URL")]
    pub number_service_url: Option<String>,

    /// Base URL of the special character rendering service.
    ///
    /// Environment variable: `SPECIAL_CHAR_SERVICE_URL`
    #[arg(long, env = "SPECIAL_CHAR_SERVICE_URL")]
    pub special_char_service_url: Option<String>,

    /// Base URL of the image compositor.
    ///
    /// Environment variable: `COMPOSITOR_SERVICE_URL`
    #[arg(long, env = "COMPOSITOR_SERVICE_URL")]
    pub compositor_service_url: Option<String>,

    /// Deadline for each `GET /health` liveness probe, in milliseconds.
    ///
    /// Environment variable: `HEALTH_TIMEOUT_MS`
    #[arg(long, env = "HEALTH_TIMEOUT_MS", default_value_t = 2_000)]
    pub health_timeout_ms: u64,

    /// Deadline for each per-character `POST /generate`, in milliseconds.
    ///
    /// Environment variable: `RENDER_TIMEOUT_MS`
    #[arg(long, env = "RENDER_TIMEOUT_MS", default_value_t = 5_000)]
    pub render_timeout_ms: u64,

    /// Deadline for the `POST /composite` call, in milliseconds.
    ///
    /// Environment variable: `COMPOSITE_TIMEOUT_MS`
    #[arg(long, env = "COMPOSITE_TIMEOUT_MS", default_value_t = 10_000)]
    pub composite_timeout_ms: u64,

    /// Style sent to the rendering services when a request names none.
    ///
    /// Environment variable: `DEFAULT_STYLE`
    #[arg(long, env = "DEFAULT_STYLE", default_value_t = String::from(DEFAULT_STYLE))]
    pub default_style: String,

    /// Largest accepted request body, in bytes.
    ///
    /// Environment variable: `MAX_BODY_BYTES`
    #[arg(long, env = "MAX_BODY_BYTES", default_value_t = 1024 * 1024)]
    pub max_body_bytes: usize,

    /// Longest accepted text, in characters. Every character is one outbound
    /// dispatch, so this bounds the fan-out of a single request.
    ///
    /// Environment variable: `MAX_TEXT_CHARS`
    #[arg(long, env = "MAX_TEXT_CHARS", default_value_t = 256)]
    pub max_text_chars: usize,
}

/// Explicitly configured collaborator addresses. `None` means "use the
/// default".
#[derive(Debug, Clone, Default)]
pub struct ServiceEndpoints {
    pub letter: Option<Url>,
    pub digit: Option<Url>,
    pub special: Option<Url>,
    pub compositor: Option<Url>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub endpoints: ServiceEndpoints,
    pub health_timeout: Duration,
    pub render_timeout: Duration,
    pub composite_timeout: Duration,
    pub default_style: String,
    pub max_body_bytes: usize,
    pub max_text_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: "0.0.0.0:3001".to_string(),
            endpoints: ServiceEndpoints::default(),
            health_timeout: Duration::from_millis(2_000),
            render_timeout: Duration::from_millis(5_000),
            composite_timeout: Duration::from_millis(10_000),
            default_style: DEFAULT_STYLE.to_string(),
            max_body_bytes: 1024 * 1024,
            max_text_chars: 256,
        }
    }
}

fn parse_endpoint(name: &str, raw: Option<String>) -> anyhow::Result<Option<Url>> {
    let Some(raw) = raw.filter(|s| !s.trim().is_empty()) else {
        return Ok(None);
    };
    let url = Url::parse(raw.trim()).with_context(|| format!("{name} `{raw}` is not a valid URL"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("{name} `{raw}` must use http or https");
    }
    Ok(Some(url))
}

fn non_zero_millis(name: &str, value: u64) -> anyhow::Result<Duration> {
    if value == 0 {
        bail!("{name} must be greater than 0");
    }
    Ok(Duration::from_millis(value))
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.max_text_chars == 0 {
            bail!("MAX_TEXT_CHARS must be greater than 0");
        }
        if args.max_body_bytes == 0 {
            bail!("MAX_BODY_BYTES must be greater than 0");
        }
        let default_style = args.default_style.trim().to_string();
        if default_style.is_empty() {
            bail!("DEFAULT_STYLE must not be empty");
        }

        Ok(Self {
            server_addr: args.server_addr,
            endpoints: ServiceEndpoints {
                letter: parse_endpoint("LETTER_SERVICE_URL", args.letter_service_url)?,
                digit: parse_endpoint("NUMBER_SERVICE_URL", args.number_service_url)?,
                special: parse_endpoint("SPECIAL_CHAR_SERVICE_URL", args.special_char_service_url)?,
                compositor: parse_endpoint("COMPOSITOR_SERVICE_URL", args.compositor_service_url)?,
            },
            health_timeout: non_zero_millis("HEALTH_TIMEOUT_MS", args.health_timeout_ms)?,
            render_timeout: non_zero_millis("RENDER_TIMEOUT_MS", args.render_timeout_ms)?,
            composite_timeout: non_zero_millis("COMPOSITE_TIMEOUT_MS", args.composite_timeout_ms)?,
            default_style,
            max_body_bytes: args.max_body_bytes,
            max_text_chars: args.max_text_chars,
        })
    }
}
