//! Authentication cookies and the header derived from them.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::error::ClientError;

/// Cookies every authenticated request must carry.
pub const REQUIRED_COOKIES: [&str; 5] = ["SAPISID", "HSID", "SSID", "APISID", "SID"];

/// Cookie jar supplied by the caller. Acquiring the cookies is out of scope.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct Cookies(HashMap<String, String>);

impl fmt::Debug for Cookies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.0.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Cookies")
            .field("names", &names)
            .finish_non_exhaustive()
    }
}

impl Cookies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Result<&str, ClientError> {
        self.0
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| ClientError::MissingCookie(name.to_string()))
    }

    /// The required cookies as name/value pairs, failing on the first one absent.
    pub fn required(&self) -> Result<Vec<(String, String)>, ClientError> {
        REQUIRED_COOKIES
            .iter()
            .map(|name| Ok((name.to_string(), self.get(name)?.to_string())))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Cookies {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// Headers authorizing a request on behalf of the `SAPISID` holder.
///
/// The hash binds the cookie to `origin` and a millisecond timestamp:
/// `SAPISIDHASH <ms>_<sha1("<ms> <sapisid> <origin>")>`.
pub fn authorization_headers(sapisid: &str, origin: &str, time_msec: i64) -> Vec<(String, String)> {
    let digest = Sha1::digest(format!("{time_msec} {sapisid} {origin}").as_bytes());
    vec![
        (
            "authorization".to_string(),
            format!("SAPISIDHASH {time_msec}_{}", hex::encode(digest)),
        ),
        ("x-origin".to_string(), origin.to_string()),
        ("x-goog-authuser".to_string(), "0".to_string()),
    ]
}
