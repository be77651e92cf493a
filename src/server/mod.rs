pub mod api;

use crate::agent::GbalaAgent;
use crate::cli::Args;
use crate::sms::SmsClient;

use axum::Router;
use log::{ info, warn };
use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;

pub struct Server {
    addr: String,
    agent: Arc<RwLock<GbalaAgent>>,
    sms: SmsClient,
    args: Args,
}

impl Server {
    pub fn new(addr: String, agent: Arc<RwLock<GbalaAgent>>, sms: SmsClient, args: Args) -> Self {
        Self { addr, agent, sms, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let state = api::AppState::new(
            Arc::clone(&self.agent),
            self.sms.clone(),
            self.args.server_api_key.clone(),
            self.args.rate_limit_per_second
        );
        let app = api::router(state);
        let addr = self.addr.parse::<SocketAddr>()?;

        match (self.args.enable_tls, &self.args.tls_cert_path, &self.args.tls_key_path) {
            (true, Some(cert_path), Some(key_path)) => serve_tls(addr, app, cert_path, key_path).await,
            (true, _, _) => {
                warn!("ENABLE_TLS is set but TLS_CERT_PATH or TLS_KEY_PATH is missing. Serving plain HTTP.");
                serve_plain(addr, app).await
            }
            _ => serve_plain(addr, app).await,
        }
    }
}

async fn serve_tls(
    addr: SocketAddr,
    app: Router,
    cert_path: &str,
    key_path: &str
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let tls_config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
    info!("HTTPS server listening on https://{}", addr);
    axum_server::bind_rustls(addr, tls_config).serve(app.into_make_service()).await?;
    Ok(())
}

async fn serve_plain(addr: SocketAddr, app: Router) -> Result<(), Box<dyn Error + Send + Sync>> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on http://{}", addr);
    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
