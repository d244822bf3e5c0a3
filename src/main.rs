// `main.rs` only declares modules and delegates to `server::run()`. The
// broker session lives in `mqtt` and `supervisor`, the shared state in
// `store` and `counter`, and the HTTP surface in `handlers`.
mod backoff;
mod broker;
mod config;
mod counter;
mod error;
mod handlers;
mod metrics;
mod mqtt;
mod reading;
mod server;
mod signals;
mod state;
mod store;
mod supervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    server::run().await
}
