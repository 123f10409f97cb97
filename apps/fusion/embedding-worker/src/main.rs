//! Embedding Worker Service - Entry Point
//!
//! Background worker that periodically backfills missing incident
//! embeddings.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    fusion_embedding_worker::run().await
}
