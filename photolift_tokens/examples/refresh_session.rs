use clap::Parser;
use photolift_tokens::refresh::{HttpRefreshTokenClient, RefreshTokenClient};
use photolift_tokens::session::SessionEvents;
use photolift_tokens::{ClientId, ClientSecret, Principal, RefreshToken, SubjectId, TokenHandler};
use std::sync::Arc;

/// Exercises a full session lifecycle against a live identity provider:
/// exchange a refresh token, seed the cache the way a sign-in callback
/// would, validate the session, then sign out.
#[derive(Debug, Parser)]
struct Opts {
    /// The provider's token endpoint
    #[arg(short, long, env)]
    token_url: reqwest::Url,

    /// The OAuth2 client ID
    #[arg(short, long, env)]
    client_id: String,

    /// The OAuth2 client secret
    #[arg(short = 's', long, env, hide_env_values = true)]
    client_secret: String,

    /// The subject identifier of the signed-in user
    #[arg(long, env)]
    subject: String,

    /// A currently valid refresh token for that user
    #[arg(long, env, hide_env_values = true)]
    refresh_token: String,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .pretty()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let opts = Opts::parse();

    let client = HttpRefreshTokenClient::new(
        reqwest::Client::builder().https_only(true).build()?,
        opts.token_url,
        ClientId::from(opts.client_id),
        ClientSecret::from(opts.client_secret),
    );

    let refresh_token = RefreshToken::from(opts.refresh_token);
    let exchanged = client.refresh(&refresh_token).await?;
    tracing::info!(
        token_type = exchanged.token_type(),
        expires_in = exchanged.expires_in().0,
        "exchanged the supplied refresh token"
    );

    let handler = Arc::new(TokenHandler::new(client));
    let events = SessionEvents::new(Arc::clone(&handler));
    let principal = Principal::authenticated(SubjectId::from(opts.subject));

    handler.set_token(&principal, exchanged).await;

    let verdict = events.validate_principal(&principal).await?;
    tracing::info!(?verdict, "validated the seeded session");

    let result = handler.get_token(&principal).await?;
    if let Some(token) = result.token() {
        tracing::info!(
            access_token = %token.access_token(),
            "served the cached bearer credential"
        );
    }

    events.on_sign_out(&principal).await;
    let verdict = events.validate_principal(&principal).await?;
    tracing::info!(?verdict, "validated again after sign-out");

    Ok(())
}
