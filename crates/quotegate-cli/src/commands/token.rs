use quotegate_core::GatewayConfig;
use time::format_description::well_known::Rfc3339;
use tracing::info;

use crate::cli::TokenArgs;
use crate::error::CliError;

pub async fn run(args: &TokenArgs) -> Result<(), CliError> {
    let config = GatewayConfig::from_env()?;
    let cache = config.credential_cache();

    let credential = if args.refresh {
        cache.force_refresh().await?
    } else {
        cache.get().await?
    };
    info!(path = %config.token_cache_path.display(), "credential ready");

    println!(
        "credential valid until {} (cached at {})",
        credential.expires_at().format(&Rfc3339)?,
        config.token_cache_path.display()
    );
    Ok(())
}
