pub mod agent;
pub mod analysis;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod llm;
pub mod models;
pub mod server;
pub mod sms;
pub mod tools;

use agent::GbalaAgent;
use cli::Args;
use log::info;
use server::Server;
use sms::SmsClient;
use std::error::Error;
use std::sync::Arc;
use tokio::sync::RwLock;

pub fn log_configuration(args: &Args) {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("API Key Required: {}", args.server_api_key.as_deref().is_some_and(|k| !k.is_empty()));
    info!("Rate Limit: {}/s", args.rate_limit_per_second);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("Chat LLM Type: {}", args.chat_llm_type);
    info!("Chat Model: {}", args.chat_model.as_deref().unwrap_or("adapter default"));
    info!("LLM Timeout: {}s", args.llm_timeout_secs);
    info!("Prompts Path: {}", args.prompts_path.as_deref().unwrap_or("built-in"));
    info!("Dataset Path: {}", args.dataset_path.as_deref().unwrap_or("built-in sample"));
    info!("Dashboard Area: {}", args.dashboard_area);
    info!("Weather Forecast: {}", args.weather_forecast);
    info!("-------------------------");
}

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    log_configuration(&args);

    let agent = Arc::new(RwLock::new(GbalaAgent::new(&args)?));
    let sms = SmsClient::from_args(&args)?;
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, agent, sms, args);
    server.run().await?;

    Ok(())
}
