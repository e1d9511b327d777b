//! Example: Validate an inbound Authorization header
//!
//! Authenticates one request against the public Bot Framework trust policy
//! and prints the resulting identity or rejection.
//!
//! Usage:
//!   cargo run --example validate_header -- <app-id> <app-password> "<Authorization header>" \
//!       [service-url] [channel-id]
//!
//! Pass an empty app id to see the auth-disabled path:
//!   cargo run --example validate_header -- "" "" ""
//!
//! Set `RUST_LOG=connector_auth=debug` to watch classification and key
//! discovery.

use connector_auth::{
    AuthenticationConfig, Authenticator, InboundActivity, SimpleCredentialProvider,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("connector_auth=info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let app_id = args.next().unwrap_or_default();
    let app_password = args.next().unwrap_or_default();
    let header = args.next().unwrap_or_default();
    let service_url = args
        .next()
        .unwrap_or_else(|| "https://smba.trafficmanager.net/teams/".to_string());
    let channel_id = args.next().unwrap_or_else(|| "msteams".to_string());

    let authenticator = Authenticator::new(AuthenticationConfig::default())?;
    let credentials = SimpleCredentialProvider::new(app_id, app_password);
    let activity = InboundActivity::new("message", service_url.as_str(), channel_id);

    println!("Validating request for service URL {service_url}");

    match authenticator
        .authenticate_request(&activity, Some(header.as_str()), &credentials)
        .await
    {
        Ok(identity) if identity.is_anonymous() => {
            println!("Authentication disabled: anonymous identity");
        }
        Ok(identity) => {
            println!("Authenticated as app {:?}", identity.app_id());
            for (name, value) in identity.claims() {
                println!("  {name} = {value}");
            }
            println!(
                "Service URL trusted: {}",
                identity
                    .app_id()
                    .is_some_and(|app| authenticator.trusted_service_urls().is_trusted(app, &service_url))
            );
        }
        Err(e) => {
            println!("Rejected ({}): {e}", e.status_code());
            if e.is_credential_missing() {
                println!("  no usable credential was presented");
            }
        }
    }

    Ok(())
}
