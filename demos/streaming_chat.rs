//! Streaming example: print an answer word by word as it arrives, then the
//! usage numbers once the stream closes.
//!
//! Run with:
//! ```sh
//! ANTHROPIC_API_KEY=sk-ant-... cargo run --example streaming_chat
//! ```

#[cfg(feature = "provider-anthropic")]
use futures::StreamExt;
#[cfg(feature = "provider-anthropic")]
use std::io::Write;
#[cfg(feature = "provider-anthropic")]
use uni_parla::api::{ModelSpec, Smoothing};
#[cfg(feature = "provider-anthropic")]
use uni_parla::client::ModelClient;
#[cfg(feature = "provider-anthropic")]
use uni_parla::message::Message;

#[cfg(feature = "provider-anthropic")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Build a client that re-chunks the stream on word boundaries
    let client = ModelClient::builder()
        .model(ModelSpec::new("anthropic", "claude-sonnet-4-5"))
        .smoothing(Smoothing::Word)
        .try_build()
        .await?;

    // 2. Start the stream
    let mut stream = client
        .stream_chat(vec![Message::user(
            "Tell a three-sentence story about a lighthouse keeper.",
        )])
        .await?;

    // 3. Print chunks as they arrive
    while let Some(chunk) = stream.text.next().await {
        print!("{}", chunk?);
        std::io::stdout().flush()?;
    }
    println!();

    // 4. Side channels resolve after the text ends
    if let Some(usage) = stream.usage.await {
        println!(
            "({} prompt + {} completion tokens)",
            usage.prompt_tokens, usage.completion_tokens
        );
    }

    Ok(())
}

#[cfg(not(feature = "provider-anthropic"))]
fn main() {
    eprintln!(
        "This example requires the `provider-anthropic` feature.\n\
         Run with: cargo run --example streaming_chat --features provider-anthropic"
    );
}
