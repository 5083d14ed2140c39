//! CLI command handlers. Every command resolves the stored session first.

use crate::auth::{decode_expiry, StoreKey};
use crate::config::CellarConfig;
use crate::service::Cellar;
use crate::session::SessionState;
use crate::types::{LoginCredentials, RegisterData};

use super::{GetArgs, LoginArgs, RegisterArgs, UseArgs};

type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Build a `Cellar` from the environment, applying CLI overrides.
pub fn open(api_url: Option<String>) -> Result<Cellar, Box<dyn std::error::Error>> {
    let mut config = CellarConfig::from_env()?;
    if let Some(url) = api_url {
        config.api_base_url = url;
    }
    Ok(Cellar::new(config)?)
}

/// Handle `cellar login`.
pub async fn handle_login(cellar: &Cellar, args: LoginArgs) -> CommandResult {
    cellar.initialize().await;
    let user = cellar
        .login(&LoginCredentials::new(args.email, args.password))
        .await?;
    println!("Signed in as {} <{}>", display_name(&user.full_name, &user.email), user.email);
    if let Some(active) = cellar.active_membership() {
        println!("Active winery: {} ({})", active.winery.name, active.role);
    }
    Ok(())
}

/// Handle `cellar logout`.
pub async fn handle_logout(cellar: &Cellar) -> CommandResult {
    cellar.initialize().await;
    cellar.logout();
    println!("Signed out");
    Ok(())
}

/// Handle `cellar status`.
pub async fn handle_status(cellar: &Cellar) -> CommandResult {
    let state = cellar.initialize().await;
    println!("API: {}", cellar.config().api_base_url);

    match state {
        SessionState::Authenticated(user) => {
            println!("Signed in as {} <{}>", display_name(&user.full_name, &user.email), user.email);
            let access = cellar.store().load(StoreKey::AccessToken)?;
            if let Some(expires) = access.as_deref().and_then(decode_expiry) {
                println!("Access token expires {}", expires.to_rfc3339());
            }
            match cellar.active_membership() {
                Some(active) => println!("Active winery: {} ({})", active.winery.name, active.role),
                None => println!("No active winery"),
            }
        }
        _ => println!("Not signed in. Run `cellar login --email <email>`."),
    }
    Ok(())
}

/// Handle `cellar register`.
pub async fn handle_register(cellar: &Cellar, args: RegisterArgs) -> CommandResult {
    let data = RegisterData {
        email: args.email,
        full_name: args.full_name,
        password: args.password.clone(),
        password_confirm: args.password,
    };
    let user = cellar.register(&data).await?;
    println!("Registered {}. Run `cellar login` to sign in.", user.email);
    Ok(())
}

/// Handle `cellar wineries`.
pub async fn handle_wineries(cellar: &Cellar) -> CommandResult {
    require_session(cellar).await?;
    let memberships = cellar.refresh_memberships().await;
    if memberships.is_empty() {
        println!("No winery memberships");
        return Ok(());
    }
    let active = cellar.tenants().active_id();
    for membership in memberships {
        let marker = if Some(membership.winery.id) == active { "*" } else { " " };
        println!(
            "{marker} {}  {:<30} {}",
            membership.winery.id, membership.winery.name, membership.role
        );
    }
    Ok(())
}

/// Handle `cellar use <winery-id>`.
pub async fn handle_use(cellar: &Cellar, args: UseArgs) -> CommandResult {
    require_session(cellar).await?;
    if cellar.memberships().is_empty() {
        cellar.refresh_memberships().await;
    }
    let membership = cellar.select_tenant(args.winery_id)?;
    println!("Active winery: {} ({})", membership.winery.name, membership.role);
    Ok(())
}

/// Handle `cellar get <path>`.
pub async fn handle_get(cellar: &Cellar, args: GetArgs) -> CommandResult {
    require_session(cellar).await?;
    let body: serde_json::Value = cellar.api().get_json(&args.path).await?;
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn require_session(cellar: &Cellar) -> Result<(), crate::CellarError> {
    if cellar.initialize().await.is_authenticated() {
        Ok(())
    } else {
        Err(crate::CellarError::NotAuthenticated)
    }
}

fn display_name<'a>(full_name: &'a str, email: &'a str) -> &'a str {
    if full_name.trim().is_empty() {
        email
    } else {
        full_name
    }
}
