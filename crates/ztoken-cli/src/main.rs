//! ztoken HTTP Client
//!
//! Signs a principal credential for the calling service, exchanges it for a
//! role token, and issues one GET request to a provider with the token
//! attached. The provider's body is written to stdout unmodified; a denial or
//! any other status exits non-zero.

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

use ztoken_client::{
    send_authorized, ClientConfig, ProviderResponse, RoleTokenProvider, SimpleIdentityProvider,
};
use ztoken_core::KeyPair;

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "ztoken-http-client")]
#[command(about = "Call a provider with a role token from the ztoken authority")]
#[command(version)]
struct Args {
    /// Domain name of the calling service
    #[arg(short = 'd', long, env = "ZTOKEN_DOMAIN")]
    domain: String,

    /// Service name of the calling service
    #[arg(short = 's', long, env = "ZTOKEN_SERVICE")]
    service: String,

    /// Private key path (PKCS#8 PEM or base64 raw Ed25519 key)
    #[arg(short = 'p', long = "pkey", env = "ZTOKEN_PRIVATE_KEY")]
    pkey: PathBuf,

    /// Key identifier the public key is registered under
    #[arg(short = 'k', long = "keyid", env = "ZTOKEN_KEY_ID")]
    keyid: String,

    /// Request URL
    #[arg(short = 'u', long, env = "ZTOKEN_REQUEST_URL")]
    url: String,

    /// Token authority URL
    #[arg(short = 'z', long = "ztsurl", env = "ZTOKEN_AUTHORITY_URL")]
    ztsurl: String,

    /// Provider domain name
    #[arg(short = 'P', long, env = "ZTOKEN_PROVIDER_DOMAIN")]
    provider: String,

    /// Provider role name
    #[arg(short = 'r', long, env = "ZTOKEN_PROVIDER_ROLE")]
    role: String,

    /// Enable debug logging
    #[arg(short, long, env = "ZTOKEN_VERBOSE")]
    verbose: bool,
}

impl Args {
    /// Client configuration: the authority URL from the command line, every
    /// other setting from `ZTOKEN_*` variables
    fn client_config(&self) -> Result<ClientConfig> {
        let config = ClientConfig::from_lookup(|name| match name {
            "ZTOKEN_AUTHORITY_URL" => Some(self.ztsurl.clone()),
            _ => std::env::var(name).ok(),
        })?;
        Ok(config)
    }
}

async fn run(args: Args) -> Result<()> {
    let key = KeyPair::load(&args.pkey, args.keyid.as_str())
        .with_context(|| format!("Unable to load private key {}", args.pkey.display()))?;
    let identity = Arc::new(SimpleIdentityProvider::new(
        args.domain.as_str(),
        args.service.as_str(),
        key,
    ));

    let config = args.client_config()?;
    let tokens = RoleTokenProvider::new(identity, &config)?;

    let header = tokens
        .authorization_header(&args.provider, &args.role)
        .await
        .with_context(|| {
            format!(
                "Unable to retrieve role token for: {} in domain: {}",
                args.role, args.provider
            )
        })?;
    debug!(provider = %args.provider, role = %args.role, "Obtained role token");

    let http = reqwest::Client::new();
    match send_authorized(&http, &args.url, &header).await? {
        ProviderResponse::Success(body) => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "Successful response: ")?;
            stdout.write_all(&body)?;
            stdout.flush()?;
            Ok(())
        }
        ProviderResponse::Forbidden => bail!("Request was forbidden - not authorized"),
        ProviderResponse::Failed(status) => {
            bail!("Request failed - response status code: {}", status)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout carries only the provider response
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::WARN })
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    run(args).await
}
