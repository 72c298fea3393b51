use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;

pub fn build_http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("wardrobe-stylist/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")
}
