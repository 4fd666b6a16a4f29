//! Poll messages over HTTP

use iggy_client::*;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("Iggy Rust client - poll messages example");
    println!("========================================");

    let client = ClientBuilder::new()
        .protocol(Protocol::Http)
        .base_address("http://127.0.0.1:3000")
        .header("x-client", "iggy-rust-example")
        .without_batching()
        .build()
        .await?;

    let mut request = PollRequest {
        consumer: Consumer::new(1),
        stream_id: Identifier::numeric(1),
        topic_id: Identifier::named("orders")?,
        partition_id: 1,
        strategy: PollingStrategy::offset(0),
        count: 100,
        auto_commit: false,
    };

    for poll in 0..10 {
        let polled = client.poll_messages(&request).await?;
        if polled.messages.is_empty() {
            println!("Poll {}: no messages", poll + 1);
            tokio::time::sleep(Duration::from_millis(500)).await;
            continue;
        }

        println!(
            "Poll {}: {} messages, partition offset {}",
            poll + 1,
            polled.messages.len(),
            polled.current_offset
        );
        for message in &polled.messages {
            println!(
                "   offset={} id={} state={:?} payload='{}'",
                message.offset,
                message.id,
                message.state,
                String::from_utf8_lossy(&message.payload)
            );
        }

        if let Some(last) = polled.messages.last() {
            request.strategy = PollingStrategy::offset(last.offset + 1);
        }
    }

    Ok(())
}
