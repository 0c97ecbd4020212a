use anyhow::{Context, anyhow};
use clap::Parser;
use fileup::api::handlers::upload::{FILE_NAME_HEADER, FILE_TYPE_HEADER};
use fileup::services::stream::UploadResponse;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Chunk size used when streaming the file body
const CHUNK_SIZE: usize = 1024;

#[derive(Parser, Debug)]
#[command(author, version, about = "Streams a file to a fileup server", long_about = None)]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 8090)]
    port: u16,

    /// File to upload
    #[arg(short, long)]
    file: PathBuf,

    /// Whole-call timeout in seconds
    #[arg(long, default_value_t = 5)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "upload_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let file_name = args
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("{} has no usable file name", args.file.display()))?
        .to_string();
    let file_type = args
        .file
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();

    let file = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("cannot open file {}", args.file.display()))?;
    let body = reqwest::Body::wrap_stream(ReaderStream::with_capacity(file, CHUNK_SIZE));

    let url = format!("http://{}:{}/upload", args.host, args.port);
    info!("📤 Uploading {} to {}", file_name, url);

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(args.timeout))
        .build()?;

    let response = client
        .post(&url)
        .header(FILE_NAME_HEADER, &file_name)
        .header(FILE_TYPE_HEADER, &file_type)
        .header("content-type", "application/octet-stream")
        .body(body)
        .send()
        .await
        .context("cannot upload file")?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        return Err(anyhow!("upload failed with status {}: {}", status, text));
    }

    let uploaded: UploadResponse = response.json().await.context("cannot receive response")?;
    info!(
        "✅ File uploaded with id: {} and size: {}",
        uploaded.id, uploaded.size
    );

    Ok(())
}
