//! Generates the shared HMAC secret used by the auth gateway to sign
//! bearer tokens and by the game server to validate them
//! (`flux::token::TokenSecret`, `AuthConfig.token_secret_base64`).

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Arg, Command};
use rand::RngCore;
use std::fs;

const SECRET_LEN: usize = 32;

fn main() {
    let matches = Command::new("Secret Generator")
        .version("1.0")
        .about("Generates a base64-encoded HMAC secret for the auth gateway / game server pair.")
        .arg(
            Arg::new("OUT_FILE")
                .help("Path to write the base64 secret to; prints to stdout if omitted")
                .required(false),
        )
        .get_matches();

    let mut secret = [0u8; SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut secret);
    let encoded = STANDARD.encode(secret);

    match matches.get_one::<String>("OUT_FILE") {
        Some(path) => {
            fs::write(path, &encoded).expect("failed to write secret file");
            println!("Wrote {} bytes of secret (base64) to {}", SECRET_LEN, path);
        }
        None => println!("{}", encoded),
    }
}
