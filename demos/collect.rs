//! Collect a whole response and print only the assistant text.
//!
//! ```sh
//! cargo run --example collect -- "What is a borrow checker?"
//! ```

use std::time::Duration;

use claude_query::{ClientConfig, Message, QueryRequest, query};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> claude_query::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Explain ownership in Rust in two sentences.".to_owned());

    let request = QueryRequest::builder()
        .prompt(prompt)
        .model("sonnet")
        .max_turns(1)
        .build()?;
    let config = ClientConfig::builder()
        .read_timeout(Some(Duration::from_secs(120)))
        .build();

    for message in query(request, config).await? {
        match &message {
            Message::Assistant(_) => {
                if let Some(text) = message.assistant_text() {
                    println!("{text}");
                }
            }
            Message::Result(result) => {
                if let Some(cost) = result.total_cost_usd {
                    eprintln!("cost: ${cost:.4}");
                }
            }
            _ => {}
        }
    }
    Ok(())
}
