//! Plain serde-derived config records, loaded with `serdeconv`. No
//! framework: each component owns its own record and a `Default` impl
//! carrying the §6 defaults, the way `game/core/src/config.rs` does.

use crate::error::{FluxError, FluxResult};
use serde::de::DeserializeOwned;
use std::path::Path;

/// Load a config record of type `T` from a TOML file, falling back to
/// `T::default()` reporting isn't this function's job — callers that want
/// a fallback should catch the error and call `T::default()` themselves.
pub fn load_toml<T, P>(path: P) -> FluxResult<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    serdeconv::from_toml_file(path).map_err(|e| FluxError::Config(e.to_string()))
}
