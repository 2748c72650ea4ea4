use axum::Router;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use base_app_auth::middleware::{AuthError, AuthState, AuthUser, SessionAuth, SessionAuthConfig};
use base_app_auth::{IdentityClient, ProfileStore, RestProfileStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

type AppState = AuthState<IdentityClient, RestProfileStore>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let config = SessionAuthConfig::from_env()?;
    let profiles = RestProfileStore::new(config.provider().config().clone());
    let auth = SessionAuth::new(config, profiles);

    auth.events().subscribe(|event, session| {
        tracing::debug!(?event, signed_in = session.is_some(), "Auth state changed");
    });

    let pages = Router::new()
        .route("/", get(home))
        .route("/login", get(login))
        .route("/dashboard", get(dashboard))
        .with_state(auth.state().clone());

    let app = auth
        .protect(pages)
        .merge(auth.routes())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(%bind_addr, "base-app listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn home() -> Html<&'static str> {
    Html(
        r#"<h1>Base app</h1>
<p><a href="/login">Sign in</a> or go to your <a href="/dashboard">dashboard</a>.</p>"#,
    )
}

#[derive(Deserialize)]
struct LoginParams {
    error: Option<String>,
    message: Option<String>,
}

async fn login(Query(params): Query<LoginParams>) -> Html<String> {
    let notice = match (params.error, params.message) {
        (Some(error), _) => format!(r#"<p class="error">{}</p>"#, escape(&error)),
        (None, Some(message)) if message == "check_email" => {
            "<p>Check your email to confirm your account.</p>".to_owned()
        }
        _ => String::new(),
    };
    Html(format!(
        r#"<h1>Sign in</h1>
{notice}
<form method="post" action="/auth/sign-in">
  <input name="email" type="email" placeholder="Email" required>
  <input name="password" type="password" placeholder="Password" required>
  <button formaction="/auth/sign-in">Sign in</button>
  <button formaction="/auth/sign-up">Sign up</button>
</form>
<p><a href="/auth/authorize/github">Continue with GitHub</a></p>"#
    ))
}

async fn dashboard(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Html<String>, AuthError> {
    let profile = state
        .profiles()
        .find(&auth.access_token, auth.user.id)
        .await
        .map_err(AuthError::Profile)?;

    let name = profile
        .and_then(|p| p.username)
        .or(auth.user.email)
        .unwrap_or_else(|| auth.user.id.to_string());

    Ok(Html(format!(
        r#"<h1>Dashboard</h1>
<p>Signed in as {}.</p>
<form method="post" action="/auth/sign-out"><button>Sign out</button></form>"#,
        escape(&name)
    )))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
