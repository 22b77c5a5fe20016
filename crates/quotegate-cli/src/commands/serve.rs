use std::net::SocketAddr;
use std::sync::Arc;

use quotegate_core::{FetchFacade, GatewayConfig};
use quotegate_store::EmbeddedDriver;
use tracing::info;

use crate::cli::ServeArgs;
use crate::error::CliError;

pub async fn run(args: &ServeArgs) -> Result<(), CliError> {
    let config = GatewayConfig::from_env()?;
    info!(
        backend = %config.variant,
        shape = %config.shape,
        descriptor = %config.descriptor.redacted(),
        "gateway configured"
    );
    if let Some(path) = &config.driver_search_path {
        info!(path = %path.display(), "driver search path set");
    }

    let facade = Arc::new(FetchFacade::from_config(&config, Arc::new(EmbeddedDriver::new())));
    quotegate_web::serve(facade, SocketAddr::new(args.host, args.port)).await?;
    Ok(())
}
