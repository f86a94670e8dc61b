//! Prints a default `GameConfig` as TOML, for an operator to redirect
//! into a starting config file.

use gamecore::config::GameConfig;

fn main() {
    let config = serdeconv::to_toml_string(&GameConfig::default()).expect("failed to render default config");
    println!("{}", config);
}
