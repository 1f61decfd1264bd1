//! resilient-client: issue one request through the resilient pipeline.
//!
//! ```text
//! resilient-client [-c client.toml] [-X POST] [-H 'k: v']... [-d body] <url>
//!     → config file (or defaults) + flag overrides
//!     → logging / optional Prometheus recorder
//!     → Client::execute
//!     → status, redirect history and body (or a JSON summary) on stdout
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use http::Method;
use serde_json::json;

use resilient_client::config::{load_config, ClientConfig};
use resilient_client::observability::{init_logging, metrics};
use resilient_client::{Client, Response};

#[derive(Parser, Debug)]
#[command(name = "resilient-client")]
#[command(about = "Send an HTTP request with retries, redirects and circuit breaking", long_about = None)]
struct Cli {
    /// Absolute URL, or a path resolved against the configured base URL / endpoints.
    url: String,

    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Extra header, `name: value`. Repeatable.
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Request body.
    #[arg(short, long)]
    data: Option<String>,

    /// TOML client configuration.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured retry count.
    #[arg(long)]
    retries: Option<u32>,

    /// Bound the whole call, retries included.
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long)]
    no_redirect: bool,

    /// Print a JSON summary instead of the raw body.
    #[arg(long)]
    json: bool,

    /// Print Prometheus metrics after the call.
    #[arg(long)]
    metrics: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ClientConfig::default(),
    };
    if let Some(retries) = cli.retries {
        config.retries.count = retries;
    }
    if let Some(ms) = cli.timeout_ms {
        config.timeouts.call_ms = Some(ms);
    }
    if cli.no_redirect {
        config.redirects.follow = false;
    }

    init_logging(&config.observability)?;
    let prometheus = if cli.metrics || config.observability.metrics_enabled {
        Some(metrics::install_prometheus()?)
    } else {
        None
    };

    tracing::info!(
        url = %cli.url,
        method = %cli.method,
        retries = config.retries.count,
        "resilient-client starting"
    );

    let client = Client::with_hyper(&config)?;
    let method = Method::from_bytes(cli.method.to_ascii_uppercase().as_bytes())?;

    let mut request = client.request(method, cli.url.as_str());
    for header in &cli.headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| format!("header {header:?} is not `name: value`"))?;
        request = request.header(name.trim(), value.trim());
    }
    if let Some(data) = cli.data {
        request = request.body(data);
    }

    let outcome = request.send().await;

    let code = match &outcome {
        Ok(response) => {
            print_response(response, cli.json)?;
            if response.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(err) => {
            if cli.json {
                let summary = json!({
                    "error": err.to_string(),
                    "status": err.response().map(|r| r.status().as_u16()),
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                if let Some(response) = err.response() {
                    print_response(response, false)?;
                }
                eprintln!("error: {err}");
            }
            ExitCode::FAILURE
        }
    };

    if let Some(handle) = prometheus {
        print!("{}", handle.render());
    }
    Ok(code)
}

fn print_response(response: &Response, as_json: bool) -> Result<(), serde_json::Error> {
    if as_json {
        let history: Vec<_> = response
            .redirect_history()
            .iter()
            .map(|entry| json!({ "url": entry.url, "status": entry.status.as_u16() }))
            .collect();
        let summary = json!({
            "status": response.status().as_u16(),
            "url": response.url().as_str(),
            "attempt": response.attempt(),
            "trace_id": response.trace_id().to_string(),
            "duration_ms": response.duration().as_millis() as u64,
            "redirects": history,
            "body": response.text(),
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("{} {}", response.status(), response.url());
    for entry in response.redirect_history() {
        println!("  via {} {}", entry.status.as_u16(), entry.url);
    }
    println!("{}", response.text());
    Ok(())
}
