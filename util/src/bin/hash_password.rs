//! Hashes a password with the same Argon2id parameters the auth gateway
//! uses at registration time, for manually seeding demo accounts.

use authenticator::hash::hash_password;
use clap::{Arg, Command};

fn main() {
    let matches = Command::new("Password Hasher")
        .version("1.0")
        .about("Hashes a password with the auth gateway's Argon2id parameters.")
        .arg(Arg::new("PASSWORD").help("Password to hash").required(true))
        .get_matches();

    let password = matches.get_one::<String>("PASSWORD").unwrap();
    let hash = hash_password(password).expect("password hashing failed");
    println!("{}", hash);
}
