//! Job command handlers
//!
//! Submitting jobs and following their status.

use anyhow::{Context, Result};
use colored::*;
use ferry_core::domain::operation::Operation;
use ferry_core::dto::job::JobStatusBody;
use serde_json::{Value, json};
use std::path::Path;
use std::time::{Duration, Instant};

use super::Commands;
use crate::api::{ApiClient, StatusReply};
use crate::config::Config;

/// Handle job commands
pub async fn handle_job_command(command: Commands, config: &Config) -> Result<()> {
    let client = ApiClient::new(&config.gateway_url);

    match command {
        Commands::Submit {
            operation,
            file,
            code,
            language_version,
        } => {
            let body = match (file, code) {
                (Some(path), _) => read_body(&path)?,
                (None, Some(code)) => code_body(operation, &code, language_version.as_deref()),
                (None, None) => anyhow::bail!("Either --file or --code is required"),
            };
            submit(&client, operation, body).await
        }
        Commands::Status {
            operation,
            job_id,
            no_output,
            debug,
        } => {
            let reply = client.status(operation, &job_id, !no_output, debug).await?;
            print_reply(&reply);
            Ok(())
        }
        Commands::Wait {
            operation,
            job_id,
            interval,
            timeout,
        } => {
            wait(
                &client,
                operation,
                &job_id,
                Duration::from_secs(interval.max(1)),
                Duration::from_secs(timeout),
            )
            .await
        }
    }
}

/// Submit a job and print where to find it
async fn submit(client: &ApiClient, operation: Operation, body: Vec<u8>) -> Result<()> {
    let accepted = client.submit(operation, body).await?;

    println!("{}", "Job accepted".green().bold());
    println!("  Job ID:      {}", accepted.job_id.cyan());
    println!("  Operation:   {}", accepted.operation);
    println!("  Status URL:  {}", accepted.status_url);

    Ok(())
}

/// Poll until the gateway reports a terminal state
async fn wait(
    client: &ApiClient,
    operation: Operation,
    job_id: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let started = Instant::now();

    loop {
        let reply = client.status(operation, job_id, true, false).await?;
        if reply.is_terminal() {
            print_reply(&reply);
            return Ok(());
        }

        let status = reply
            .json()
            .and_then(|v| v["status"].as_str().map(str::to_string))
            .unwrap_or_else(|| "Pending".to_string());
        println!(
            "{} {} ({}s)",
            "…".dimmed(),
            colorize_status(&status),
            started.elapsed().as_secs()
        );

        if started.elapsed() + interval > timeout {
            anyhow::bail!(
                "Job {} still {} after {}s",
                job_id,
                status,
                timeout.as_secs()
            );
        }

        tokio::time::sleep(interval).await;
    }
}

/// Print a status reply
fn print_reply(reply: &StatusReply) {
    let is_json = reply
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.contains("json"));
    let Some(value) = reply.json().filter(|_| is_json) else {
        println!("{}", String::from_utf8_lossy(&reply.body));
        return;
    };

    let Some(body) = status_body(&value) else {
        println!("{}", "Output:".bold());
        print_json(&value);
        return;
    };

    println!(
        "{}",
        format!("Status: {}", colorize_status(body.status.as_str())).bold()
    );

    if let Some(error) = &body.error {
        println!("\n{}", "Error:".bold());
        println!("{}", error.red());
    }

    if let Some(warning) = &body.warning {
        println!("\n{}", warning.yellow());
    }

    if let Some(diagnostics) = &body.diagnostics {
        println!("\n{}", "Diagnostics:".bold());
        match serde_json::to_value(diagnostics) {
            Ok(value) => print_json(&value),
            Err(_) => println!("{:?}", diagnostics),
        }
    }
}

/// Reads a gateway status body; stored outputs do not carry the job keys
fn status_body(value: &Value) -> Option<JobStatusBody> {
    if value.get("jobId").is_none() || value.get("operation").is_none() {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}

fn print_json(value: &Value) {
    match serde_json::to_string_pretty(value) {
        Ok(pretty) => println!("{}", pretty),
        Err(_) => println!("{:?}", value),
    }
}

/// Colorize job status for display
fn colorize_status(status: &str) -> colored::ColoredString {
    match status {
        "Queued" => status.yellow(),
        "Running" => status.cyan(),
        "Succeeded" => status.green(),
        "Failed" => status.red(),
        _ => status.normal(),
    }
}

fn read_body(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

/// Minimal request body for `--code`
fn code_body(operation: Operation, code: &str, language_version: Option<&str>) -> Vec<u8> {
    let mut body = json!({
        "action": operation.as_str(),
        "code": code,
    });
    if let Some(version) = language_version {
        body["languageVersion"] = Value::String(version.to_string());
    }
    body.to_string().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_body() {
        let body: Value =
            serde_json::from_slice(&code_body(Operation::Compile, "print(1)", None)).unwrap();
        assert_eq!(body, json!({ "action": "compile", "code": "print(1)" }));

        let body: Value =
            serde_json::from_slice(&code_body(Operation::Run, "x", Some("3.12"))).unwrap();
        assert_eq!(body["languageVersion"], "3.12");
    }

    #[test]
    fn test_status_body_is_told_apart_from_output() {
        let status = json!({
            "jobId": "0a1b2c3d4e5f60718293a4b5c6d7e8f9",
            "operation": "run",
            "status": "Failed",
            "error": "backend returned 500: boom",
        });
        let body = status_body(&status).unwrap();
        assert_eq!(body.status.as_str(), "Failed");
        assert_eq!(body.error.as_deref(), Some("backend returned 500: boom"));

        let output = json!({ "status": "ok", "stdout": "1\n" });
        assert!(status_body(&output).is_none());

        let lookalike = json!({ "jobId": 7, "operation": "run", "status": "ok" });
        assert!(status_body(&lookalike).is_none());
    }

    #[test]
    fn test_reply_terminal_only_on_200() {
        let reply = |status| StatusReply {
            status,
            content_type: Some("application/json".to_string()),
            body: br#"{"status":"Running"}"#.to_vec(),
        };
        assert!(!reply(202).is_terminal());
        assert!(reply(200).is_terminal());
        assert_eq!(reply(202).json().unwrap()["status"], "Running");
    }
}
