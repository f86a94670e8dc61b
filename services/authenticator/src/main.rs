use authenticator::account::InMemoryAccountStore;
use authenticator::attempt::InMemoryAttemptStore;
use authenticator::config::AuthConfig;
use authenticator::core::{self, Authenticator};
use authenticator::http;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Arg, Command};
use flux::token::TokenSecret;
use slog::info;
use std::sync::Arc;

#[rocket::main]
async fn main() {
    let matches = Command::new("Authenticator Service")
        .version("1.0")
        .about("Runs the XL4Net auth gateway.")
        .arg(Arg::new("CONFIG_FILE").help("Path to the config file").required(true))
        .get_matches();

    let config_path = matches.get_one::<String>("CONFIG_FILE").unwrap();
    let config = AuthConfig::load(config_path).expect("failed to load auth gateway config");

    let logger = flux::logging::init(sloggers::types::Severity::Info);
    info!(logger, "starting auth gateway"; "bind_address" => &config.bind_address);

    let secret_bytes = STANDARD
        .decode(&config.token_secret_base64)
        .expect("token_secret_base64 must be valid base64");
    let secret = TokenSecret::new(secret_bytes);

    let accounts = Arc::new(InMemoryAccountStore::new());
    let attempts = Arc::new(InMemoryAttemptStore::new());
    let authenticator = Authenticator::new(accounts, attempts.clone(), secret, logger.clone());

    spawn_attempt_purge_task(attempts, logger.clone());

    let outcome = rocket::build()
        .mount("/auth", rocket::routes![http::register, http::login, http::validate])
        .manage(authenticator)
        .launch()
        .await;

    if let Err(err) = outcome {
        eprintln!("auth gateway exited with error: {err}");
    }
}

fn spawn_attempt_purge_task(attempts: Arc<InMemoryAttemptStore>, logger: slog::Logger) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(24 * 60 * 60));
        loop {
            interval.tick().await;
            core::purge_stale_attempts(attempts.as_ref(), &logger);
        }
    });
}
