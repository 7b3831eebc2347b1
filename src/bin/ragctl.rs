use std::{
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use reqwest::{Client, multipart};
use rustyrag::{extraction::DocumentFormat, processing::QueryEvent};
use serde::Deserialize;
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "ragctl", about = "Ingest documents into and ask questions of a Rusty RAG server")]
struct Cli {
    /// Base URL of the server.
    #[arg(long, env = "RUSTY_RAG_URL", default_value = "http://127.0.0.1:4100")]
    server: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload files; directories are walked for supported documents.
    Ingest {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Ask a question and stream the cited answer.
    Ask { question: String },
}

#[derive(Deserialize)]
struct IngestResponse {
    message: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::builder()
        .user_agent("ragctl")
        .build()
        .context("failed to build HTTP client")?;
    let server = cli.server.trim_end_matches('/');
    match cli.command {
        Command::Ingest { paths } => ingest(&client, server, &paths).await,
        Command::Ask { question } => ask(&client, server, &question).await,
    }
}

fn collect_documents(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut documents = Vec::new();
    for path in paths {
        if path.is_dir() {
            documents.extend(
                WalkDir::new(path)
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_file())
                    .map(|entry| entry.into_path())
                    .filter(|path| is_supported(path)),
            );
        } else {
            documents.push(path.clone());
        }
    }
    documents
}

fn is_supported(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(DocumentFormat::from_filename)
        .is_some()
}

async fn ingest(client: &Client, server: &str, paths: &[PathBuf]) -> Result<()> {
    let documents = collect_documents(paths);
    if documents.is_empty() {
        bail!("no supported documents found");
    }

    let mut failures = 0usize;
    for path in &documents {
        match upload(client, server, path).await {
            Ok(message) => println!("{}: {message}", path.display()),
            Err(err) => {
                failures += 1;
                eprintln!("{}: {err:#}", path.display());
            }
        }
    }
    if failures > 0 {
        bail!("{failures} of {} documents failed", documents.len());
    }
    Ok(())
}

async fn upload(client: &Client, server: &str, path: &Path) -> Result<String> {
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default()
        .to_string();
    let form = multipart::Form::new().part("file", multipart::Part::bytes(content).file_name(filename));

    let response = client
        .post(format!("{server}/ingest"))
        .multipart(form)
        .send()
        .await
        .context("upload request failed")?;
    if !response.status().is_success() {
        bail!(error_message(response).await);
    }
    let body: IngestResponse = response.json().await.context("invalid ingest response")?;
    Ok(body.message)
}

async fn ask(client: &Client, server: &str, question: &str) -> Result<()> {
    let response = client
        .post(format!("{server}/query"))
        .json(&serde_json::json!({ "query": question }))
        .send()
        .await
        .context("query request failed")?;
    if !response.status().is_success() {
        bail!(error_message(response).await);
    }

    let mut stdout = std::io::stdout();
    let mut buffer = Vec::new();
    let mut bytes = response.bytes_stream();
    while let Some(chunk) = bytes.next().await {
        buffer.extend_from_slice(&chunk.context("answer stream interrupted")?);
        while let Some(newline) = buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }
            let event: QueryEvent =
                serde_json::from_slice(&line).context("malformed answer line")?;
            match event {
                QueryEvent::Chunk(text) => {
                    print!("{text}");
                    stdout.flush().ok();
                }
                QueryEvent::Citations(citations) => {
                    println!("\n\nSources:");
                    for citation in citations {
                        println!(
                            "[{}] {} (chunk {}): {}",
                            citation.id,
                            citation.source,
                            citation.position,
                            preview(&citation.source_text)
                        );
                    }
                    return Ok(());
                }
                QueryEvent::Error(message) => {
                    println!();
                    bail!(message);
                }
            }
        }
    }
    bail!("answer stream ended without citations")
}

async fn error_message(response: reqwest::Response) -> String {
    let status = response.status();
    match response.json::<ErrorResponse>().await {
        Ok(body) => format!("{status}: {}", body.error),
        Err(_) => format!("server returned {status}"),
    }
}

fn preview(text: &str) -> String {
    const LIMIT: usize = 80;
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= LIMIT {
        flattened
    } else {
        let mut short: String = flattened.chars().take(LIMIT).collect();
        short.push('…');
        short
    }
}
