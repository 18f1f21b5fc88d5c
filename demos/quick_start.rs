//! Quick-start example: ask an OpenAI model one question.
//!
//! Run with:
//! ```sh
//! OPENAI_API_KEY=sk-... cargo run --example quick_start
//! ```

#[cfg(feature = "provider-openai")]
use uni_parla::client::ModelClient;
#[cfg(feature = "provider-openai")]
use uni_parla::message::Message;

#[cfg(feature = "provider-openai")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Point the client at a provider and model
    let client = ModelClient::new("openai", "gpt-4o-mini");

    // 2. Send a conversation
    let reply = client
        .chat(vec![
            Message::system("You answer in one short paragraph."),
            Message::user("What is an ownership model?"),
        ])
        .await?;

    // 3. Use the answer
    println!("{}", reply.text);
    if let Some(usage) = reply.usage {
        println!("({} tokens)", usage.total_tokens);
    }

    Ok(())
}

#[cfg(not(feature = "provider-openai"))]
fn main() {
    eprintln!(
        "This example requires the `provider-openai` feature.\n\
         Run with: cargo run --example quick_start --features provider-openai"
    );
}
