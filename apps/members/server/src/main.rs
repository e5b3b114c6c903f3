//! Members Server Entry Point

use eyre::Result;
use members_server::telemetry::install_color_eyre;

#[tokio::main]
async fn main() -> Result<()> {
    install_color_eyre();

    members_server::run().await
}
