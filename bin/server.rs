// Family Basket - Web Server
// REST API + list widget with Axum

use anyhow::{Context, Result};
use family_basket::api::{router, AppState};
use family_basket::{logging, AppConfig};
use tracing::info;

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::from_env()?;
    logging::init(&config.logging)?;

    println!("🌐 Family Basket - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let services = config.build_services()?;
    println!("✓ List backend: {}", services.store().describe());
    if !services.has_generator() {
        println!("⚠️  GEMINI_API_KEY not set - recipe suggestions disabled");
    }

    let app = router(AppState::new(services));

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(bind = %config.bind, version = family_basket::VERSION, "Server listening");
    println!("\n🚀 Server running on http://{}", config.bind);
    println!("   API: http://{}/api/items", config.bind);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server failed")?;

    println!("\n✅ Server stopped");
    Ok(())
}
