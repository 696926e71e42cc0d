//! Ask one question and print the streamed response.
//!
//! Prints `Session started with ID: <id>` once the session is announced,
//! then every message the CLI streams back as a line of JSON.
//!
//! ```sh
//! RUST_LOG=claude_query=debug cargo run --example basic_query
//! ```

use claude_query::{ClientConfig, ConsoleSink, Model, QueryRequest, run_query};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> claude_query::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let request = QueryRequest::builder()
        .prompt("Hi")
        .model(Model::Claude35Haiku)
        .build()?;

    let outcome = run_query(request, ClientConfig::default(), ConsoleSink::stdout()).await?;
    tracing::info!(delivered = outcome.delivered, "query finished");
    Ok(())
}
