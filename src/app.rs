/*
 * Responsibility
 * - 引数解析 → Config 読み込み → 依存生成 → コマンド実行
 * - 結果を stdout に、ログを stderr に出す
 * - AppError を終了コードに変換
 */
use std::io::Read;
use std::panic;
use std::process::{self, ExitCode};

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::config::Config;
use crate::error::AppError;
use crate::services::auth::AuthorizationStatus;
use crate::state::AppState;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise only warnings.
    // Ex:
    // RUST_LOG=idtoken_verifier=debug idtoken-verifier verify --client-id ... <token>
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    // stdout carries the result only.
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");

        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let config = match Config::from_env().and_then(|c| c.with_overrides(cli.global.overrides())) {
        Ok(config) => config,
        Err(err) => return report(AppError::from(err)),
    };
    init_panic_hook(!config.app_env.is_production());

    match execute(config, cli.command).await {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(err) => report(err),
    }
}

fn report(err: AppError) -> ExitCode {
    if let AppError::NotAuthorized(status) = &err {
        println!("{}", status.code());
    }
    warn!(error = %err, exit_code = err.exit_code(), "command failed");
    ExitCode::from(err.exit_code())
}

/// Run one command against a resolved configuration and return what goes to stdout.
pub async fn execute(config: Config, command: Command) -> Result<String, AppError> {
    let state = AppState::new(config)?;

    match command {
        Command::Verify { token, claims } => {
            let token = read_token(&token)?;
            verify(&state, &token, claims).await
        }
        Command::Authorize { credential } => authorize(&state, &credential).await,
    }
}

async fn verify(state: &AppState, token: &str, print_claims: bool) -> Result<String, AppError> {
    let verifier = state.verifier()?;
    let claims = verifier.verify(token).await?;

    info!(sub = %claims.subject(), iss = %claims.iss, "token verified");

    if print_claims {
        Ok(serde_json::to_string_pretty(&claims)?)
    } else {
        Ok(claims.subject().to_string())
    }
}

async fn authorize(state: &AppState, credential: &str) -> Result<String, AppError> {
    let authorizer = state.authorizer()?;
    if authorizer.is_empty() {
        warn!("no authorization provider configured (set CLIENT_ID or FACEBOOK_CLIENT_ID)");
    }

    let response = authorizer.authorize(credential.trim()).await;
    let status = response.status;
    match response.user_id {
        Some(user_id) if status == AuthorizationStatus::Authorized => {
            Ok(format!("{} {}", status.code(), user_id))
        }
        _ => Err(AppError::NotAuthorized(status)),
    }
}

fn read_token(arg: &str) -> Result<String, AppError> {
    if arg != "-" {
        return Ok(arg.to_string());
    }

    let mut token = String::new();
    std::io::stdin().read_to_string(&mut token)?;
    Ok(token.trim().to_string())
}
