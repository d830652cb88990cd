/*
 * Responsibility
 * - tokio runtime 起動
 * - app::run() の呼び出し（ロジックは置かない）
 */
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    idtoken_verifier::app::run().await
}
