//! Mail Dispatch Worker - Entry Point
//!
//! Handles one queue event delivered as JSON on a file or stdin.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    mail_dispatch_worker::run().await
}
