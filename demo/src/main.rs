//! oidc-guard demo
//!
//! Validates a single bearer token against a realm and prints the resulting
//! principal as JSON, followed by the authorization decision for `--role`.
//!
//! ```text
//! OIDC_BASE_URL=http://localhost:8080 OIDC_REALM=project-realm OIDC_CLIENT_ID=project-web \
//!     oidc-guard-demo --role admin --role editor "$ACCESS_TOKEN"
//! ```
//!
//! Logs go to stderr and are controlled by `RUST_LOG` (default `info`).

use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use oidc_guard::{ErrorCategory, OidcAuthenticator, OidcConfig, RoleSet, authorize};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "oidc-guard-demo", version, about = "Validate an OIDC bearer token")]
struct Cli {
    /// Identity provider base URL
    #[arg(long, env = "OIDC_BASE_URL", default_value = "http://localhost:8080")]
    base_url: String,

    /// Realm name
    #[arg(long, env = "OIDC_REALM")]
    realm: String,

    /// Client identifier expected in the `aud` claim
    #[arg(long, env = "OIDC_CLIENT_ID")]
    client_id: String,

    /// JWKS cache TTL in seconds
    #[arg(long, env = "OIDC_JWKS_CACHE_TTL", default_value_t = 300)]
    jwks_cache_ttl: u64,

    /// Required realm role; repeat for "any of"
    #[arg(long = "role", value_name = "ROLE")]
    roles: Vec<String>,

    /// Fetch signing keys before validating
    #[arg(long)]
    warm_up: bool,

    /// The raw JWT (without the "Bearer " prefix)
    token: String,
}

fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_logging();
    let cli = Cli::parse();

    let config = OidcConfig::new(cli.base_url, cli.realm, cli.client_id)
        .with_jwks_cache_ttl(Duration::from_secs(cli.jwks_cache_ttl));

    let authenticator = OidcAuthenticator::initialize(config)
        .await
        .context("failed to initialize OIDC authenticator")?;

    if cli.warm_up {
        authenticator.warm_up().await;
    }

    let principal = match authenticator.authenticate(&cli.token).await {
        Ok(principal) => principal,
        Err(e) => {
            warn!(error = %e, "Token rejected");
            let code = match e.category() {
                ErrorCategory::Unauthenticated => 2,
                _ => 1,
            };
            eprintln!("{e}");
            return Ok(ExitCode::from(code));
        }
    };

    println!("{}", serde_json::to_string_pretty(&principal)?);

    let required: RoleSet = cli.roles.into_iter().collect();
    let allowed = authorize(&principal, &required);
    info!(allowed, required = ?required, "Authorization decision");
    println!("authorized: {allowed}");

    Ok(if allowed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(3)
    })
}
