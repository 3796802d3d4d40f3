//! `assay serve`: expose sessions over SSE.

use assay_config::AppConfig;

pub async fn run(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    config.gateway.port = port.unwrap_or(config.gateway.port);

    let base = format!("http://{}:{}", config.gateway.host, config.gateway.port);
    println!("🔬 assay gateway on {base}");
    println!("   GET {base}/health");
    println!("   GET {base}/api/chat/stream?message=<task>&session_id=<optional>");

    assay_gateway::start(config).await?;
    Ok(())
}
