/*
 * Responsibility
 * - アプリ共通の AppError 定義
 * - 終了コードへの変換 (HTTP status の代わり)
 * - config / verification / IO error を統一的に変換
 */
use thiserror::Error;

use crate::config::ConfigError;
use crate::services::auth::{AuthorizationStatus, VerifyError};

pub const EXIT_REJECTED: u8 = 1;
pub const EXIT_USAGE: u8 = 2;
pub const EXIT_UNAVAILABLE: u8 = 3;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("token verification failed: {0}")]
    Verify(#[from] VerifyError),

    #[error("not authorized: {0}")]
    NotAuthorized(AuthorizationStatus),

    #[error("failed to read token: {0}")]
    Input(#[from] std::io::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to render claims: {0}")]
    Output(#[from] serde_json::Error),
}

impl AppError {
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) | AppError::Input(_) => EXIT_USAGE,
            AppError::Verify(e) if e.is_rejection() => EXIT_REJECTED,
            AppError::NotAuthorized(_) => EXIT_REJECTED,
            AppError::Verify(_) | AppError::Http(_) | AppError::Output(_) => EXIT_UNAVAILABLE,
        }
    }
}
