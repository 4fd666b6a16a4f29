//! Send messages through the batching dispatcher

use iggy_client::*;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    println!("Iggy Rust client - send messages example");
    println!("========================================");

    let client = Arc::new(
        ClientBuilder::new()
            .base_address("127.0.0.1:8090")
            .protocol(Protocol::Tcp)
            .batching(IntervalBatchingSettings {
                interval: Duration::from_millis(100),
                max_messages_per_batch: 1000,
                ..IntervalBatchingSettings::default()
            })
            .build()
            .await?,
    );

    println!("Connected to Iggy broker");

    let stream = Identifier::numeric(1);
    let topic = Identifier::named("orders")?;

    // One message with headers
    let message = Message::new(r#"{"order_id":456,"total":99.99}"#)
        .with_header("content-type", HeaderValue::string("application/json"))
        .with_header("attempt", HeaderValue::uint32(1));
    client
        .send_messages(
            stream.clone(),
            topic.clone(),
            Partitioning::partition_id(1),
            vec![message],
        )
        .await?;

    // Many concurrent callers targeting the same partition end up in shared batches
    println!("\nQueueing 1000 messages from 10 tasks...");
    let start = std::time::Instant::now();
    let mut tasks = tokio::task::JoinSet::new();
    for task in 0..10u128 {
        let client = Arc::clone(&client);
        let stream = stream.clone();
        let topic = topic.clone();
        tasks.spawn(async move {
            for i in 0..100u128 {
                let id = task * 100 + i + 1;
                let message = Message::with_id(id, format!("message #{}", id));
                client
                    .send_messages(
                        stream.clone(),
                        topic.clone(),
                        Partitioning::partition_id(1),
                        vec![message],
                    )
                    .await?;
            }
            Ok::<(), IggyClientError>(())
        });
    }
    while let Some(result) = tasks.join_next().await {
        if let Ok(Err(e)) = result {
            eprintln!("Failed to queue messages: {}", e);
        }
    }

    // Give the dispatcher a few ticks to flush
    sleep(Duration::from_millis(500)).await;

    let metrics = client.metrics();
    println!(
        "Flushed {} messages in {} batches ({} errors) in {:?}",
        metrics.messages_sent,
        metrics.batches_sent,
        metrics.send_errors,
        start.elapsed()
    );

    client.shutdown().await;
    println!("Client shut down");
    Ok(())
}
