//! upstream-call: issue one call through the configured upstream client.
//!
//! Usage:
//!   upstream-call <METHOD> <path> --config <file> [OPTIONS]

use anyhow::{anyhow, bail, Context};
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use upstream_client::interceptors::{
    HeaderPropagationInterceptor, ResponseStubInterceptor, StaticContext,
};
use upstream_client::{global, ClientSettings, Error, RequestOptions};

#[derive(Debug, Default)]
struct Args {
    method: String,
    path: String,
    config: Option<String>,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
    body: Option<String>,
    retry: Option<u32>,
    optional: bool,
    noi: bool,
    stub: Option<String>,
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 || matches!(args[1].as_str(), "help" | "--help" | "-h") {
        print_usage();
        std::process::exit(if args.len() < 2 { 1 } else { 0 });
    }
    if matches!(args[1].as_str(), "version" | "--version" | "-V") {
        println!("upstream-call {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let parsed = match parse_args(&args[1..]) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {e:#}");
            eprintln!();
            print_usage();
            std::process::exit(2);
        }
    };

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start runtime: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(parsed)) {
        let kind = e
            .downcast_ref::<Error>()
            .and_then(Error::api_kind)
            .map(|k| k.as_str())
            .unwrap_or("error");
        eprintln!("{kind}: {e:#}");
        if let Some(data) = e
            .downcast_ref::<Error>()
            .and_then(Error::api)
            .and_then(|api| api.data.as_ref())
        {
            if let Ok(pretty) = serde_json::to_string_pretty(data) {
                eprintln!("{pretty}");
            }
        }
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"upstream-call: issue one call against a versioned upstream API

USAGE:
    upstream-call <METHOD> <path> --config <file> [OPTIONS]

OPTIONS:
    --config <file>         Client settings document (YAML, or JSON by extension)
    --query <k=v>           Query parameter (repeatable)
    --header <k=v>          Request header (repeatable)
    --body <json>           JSON request body (text if it does not parse)
    --retry <n>             Retry transient failures up to n times
    --optional              Treat 404/410 as success
    --noi                   Legacy upstream mode
    --stub <file>           YAML map of response stubs ("METHOD /path": {{...}})

ENVIRONMENT:
    UPSTREAM_ENDPOINT_URL_PATTERN       Override endpoint_url_pattern
    UPSTREAM_NOI_ENDPOINT_URL_PATTERN   Override noi_endpoint_url_pattern
    UPSTREAM_CIPHER_ALPHABET            Override cipher_alphabet
    RUST_LOG                            Log filter (default: warn)"#
    );
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut parsed = Args::default();
    let mut positional = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let mut value = |flag: &str| {
            iter.next()
                .cloned()
                .ok_or_else(|| anyhow!("{flag} requires a value"))
        };
        match arg.as_str() {
            "--config" => parsed.config = Some(value("--config")?),
            "--query" => parsed.query.push(split_pair(&value("--query")?)?),
            "--header" => parsed.headers.push(split_pair(&value("--header")?)?),
            "--body" => parsed.body = Some(value("--body")?),
            "--retry" => {
                let raw = value("--retry")?;
                parsed.retry = Some(
                    raw.parse()
                        .with_context(|| format!("--retry expects a number, got '{raw}'"))?,
                );
            }
            "--stub" => parsed.stub = Some(value("--stub")?),
            "--optional" => parsed.optional = true,
            "--noi" => parsed.noi = true,
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            _ => positional.push(arg.clone()),
        }
    }

    match positional.as_slice() {
        [method, path] => {
            parsed.method = method.to_ascii_uppercase();
            parsed.path = path.clone();
        }
        _ => bail!("expected <METHOD> <path>"),
    }
    Ok(parsed)
}

fn split_pair(raw: &str) -> anyhow::Result<(String, String)> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.to_string()))
        .ok_or_else(|| anyhow!("expected key=value, got '{raw}'"))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config_path = args
        .config
        .as_deref()
        .ok_or_else(|| anyhow!("--config <file> is required"))?;
    let settings = ClientSettings::from_path(config_path)
        .with_context(|| format!("loading {config_path}"))?
        .apply_env();

    let correlation_id = Uuid::new_v4().to_string();
    let mut builder = settings.into_builder().interceptor(HeaderPropagationInterceptor::new(
        Arc::new(StaticContext::new().with_correlation_id(correlation_id.clone())),
    ));
    if let Some(stub_path) = &args.stub {
        let content = std::fs::read_to_string(stub_path)
            .with_context(|| format!("reading stubs from {stub_path}"))?;
        builder = builder.interceptor(ResponseStubInterceptor::from_yaml_str(&content)?);
    }
    global().configure(builder.build()?)?;

    let method = Method::from_bytes(args.method.as_bytes())
        .with_context(|| format!("invalid method '{}'", args.method))?;

    let mut options = RequestOptions::new()
        .optional(args.optional)
        .noi(args.noi);
    if let Some(retry) = args.retry {
        options = options.retry_count(retry);
    }
    for (k, v) in args.query {
        options = options.query(k, v);
    }
    for (k, v) in args.headers {
        options = options.header(k, v);
    }
    if let Some(body) = args.body {
        options = match serde_json::from_str::<Value>(&body) {
            Ok(json) => options.json(json),
            Err(_) => options.text(body),
        };
    }

    tracing::info!(correlation_id = %correlation_id, method = %method, path = %args.path, "calling upstream");
    let result = global()
        .request::<Value>(method, args.path.as_str(), options)
        .await?;

    eprintln!(
        "{} {}",
        result.status().as_u16(),
        result.response().status_text
    );
    match result.body() {
        Some(body) => println!("{}", serde_json::to_string_pretty(body)?),
        None => {
            let text = result.response().text();
            if !text.is_empty() {
                println!("{text}");
            }
        }
    }
    Ok(())
}
