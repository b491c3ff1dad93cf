//! `ppc request`: one executed request, optionally followed until its
//! operation settles.

use anyhow::{Context, Result, bail};
use clap::Args;
use colored::*;
use log::info;
use powerplatform_client::api::{ApiClient, ApiRequest, ApiResponse, RequestMetadata};
use powerplatform_client::config::ProviderConfig;
use reqwest::Method;
use reqwest::header::{HeaderName, HeaderValue};
use std::fs;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Args)]
pub struct RequestCommand {
    /// HTTP method (GET, POST, PUT, PATCH, DELETE)
    pub method: String,
    /// Absolute request URL
    pub url: String,
    /// Scope to request a token for (resolved from the URL when omitted)
    #[arg(long = "scope")]
    pub scopes: Vec<String>,
    /// Acceptable status code (any status is accepted when omitted)
    #[arg(long = "accept")]
    pub accept: Vec<u16>,
    /// Request body, inline or `@path/to/file`
    #[arg(long)]
    pub body: Option<String>,
    /// Extra header as `Name: value`
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,
    /// Follow the long-running operation started by the response
    #[arg(long)]
    pub wait: bool,
    /// Object name reported in telemetry headers
    #[arg(long, requires = "action")]
    pub object: Option<String>,
    /// Action reported in telemetry headers
    #[arg(long, requires = "object")]
    pub action: Option<String>,
}

pub async fn handle_request_command(config: ProviderConfig, args: RequestCommand) -> Result<()> {
    let request = build_request(&args)?;
    let client = ApiClient::new(config).context("Failed to initialize API client")?;

    let cancel = CancellationToken::new();
    let mut ctx = client.context().with_cancellation(cancel.clone());
    if let (Some(object), Some(action)) = (&args.object, &args.action) {
        ctx = ctx.with_metadata(RequestMetadata::new(object, action));
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Cancelling...".yellow());
            cancel.cancel();
        }
    });

    info!("Executing {} {}", request.method, request.url);
    println!("{} {}", request.method.as_str().cyan().bold(), request.url);

    let start = Instant::now();
    let response = client
        .execute(&ctx, request)
        .await
        .context("Request failed")?;
    print_response(&response, start.elapsed().as_millis());

    if args.wait {
        println!();
        println!("{}", "Waiting for operation to complete...".dimmed());
        let record = client
            .poll_until_terminal(&ctx, &response)
            .await
            .context("Failed while polling operation")?;

        let status = match record.status.as_str() {
            "Succeeded" => record.status.green().bold(),
            "Failed" => record.status.red().bold(),
            _ => record.status.yellow().bold(),
        };
        println!("{} {}", "Operation:".dimmed(), status);
        println!("{}", serde_json::to_string_pretty(&record.payload)?);
    }

    Ok(())
}

fn build_request(args: &RequestCommand) -> Result<ApiRequest> {
    let method = Method::from_bytes(args.method.to_uppercase().as_bytes())
        .with_context(|| format!("Invalid HTTP method: {}", args.method))?;

    let mut request = ApiRequest::new(method, &args.url)
        .scopes(args.scopes.iter().cloned())
        .accept(&args.accept);

    for header in &args.headers {
        let Some((name, value)) = header.split_once(':') else {
            bail!("Header must look like 'Name: value', got '{}'", header);
        };
        let name = HeaderName::from_bytes(name.trim().as_bytes())
            .with_context(|| format!("Invalid header name in '{}'", header))?;
        let value = HeaderValue::from_str(value.trim())
            .with_context(|| format!("Invalid header value in '{}'", header))?;
        request = request.header(name, value);
    }

    if let Some(body) = &args.body {
        let body = match body.strip_prefix('@') {
            Some(path) => fs::read_to_string(path)
                .with_context(|| format!("Failed to read body file: {}", path))?,
            None => body.clone(),
        };
        request = request.raw_body(body);
    }

    Ok(request)
}

fn print_response(response: &ApiResponse, elapsed_ms: u128) {
    let status = response.status_text();
    let status = if response.status.is_success() {
        status.green().bold()
    } else {
        status.red().bold()
    };
    println!("{} {}", status, format!("({} ms)", elapsed_ms).dimmed());

    if response.body.is_empty() {
        return;
    }

    match serde_json::from_slice::<serde_json::Value>(&response.body) {
        Ok(json) => match serde_json::to_string_pretty(&json) {
            Ok(pretty) => println!("{}", pretty),
            Err(_) => println!("{}", response.text()),
        },
        Err(_) => println!("{}", response.text()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(method: &str) -> RequestCommand {
        RequestCommand {
            method: method.into(),
            url: "https://api.bap.microsoft.com/environments".into(),
            scopes: Vec::new(),
            accept: vec![200, 202],
            body: Some("{\"a\":1}".into()),
            headers: vec!["x-ms-test: yes".into()],
            wait: false,
            object: None,
            action: None,
        }
    }

    #[test]
    fn test_build_request() {
        let request = build_request(&args("post")).unwrap();

        assert_eq!(request.method, Method::POST);
        assert_eq!(request.acceptable_statuses, vec![200, 202]);
        assert_eq!(request.headers.get("x-ms-test").unwrap(), "yes");
        assert_eq!(
            request.body,
            powerplatform_client::api::RequestBody::Raw("{\"a\":1}".into())
        );
    }

    #[test]
    fn test_malformed_header_rejected() {
        let mut args = args("GET");
        args.headers = vec!["no-colon".into()];
        assert!(build_request(&args).is_err());
    }
}
