//! Stop a running query from another task with a `CancellationToken`.
//!
//! ```sh
//! cargo run --example cancellation
//! ```

use std::time::Duration;

use claude_query::{CancellationToken, Client, ClientConfig, Error, QueryRequest};
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> claude_query::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let token = CancellationToken::new();
    let request = QueryRequest::builder()
        .prompt("Write a long essay about the history of systems programming.")
        .model("haiku")
        .build()?;
    let config = ClientConfig::builder()
        .cancellation_token(token.clone())
        .build();

    let client = Client::new(request, config)?;
    let mut stream = client.open().await?;

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(3)).await;
        token.cancel();
    });

    while let Some(item) = stream.next().await {
        match item {
            Ok(message) => println!("{}", message.kind()),
            Err(Error::Cancelled) => println!("cancelled"),
            Err(e) => return Err(e),
        }
    }
    println!("final state: {}", client.state());
    Ok(())
}
