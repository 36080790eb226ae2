use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

/// The authentication plugins this core understands. Only
/// `mysql_native_password` is actually supported (§1 Non-goals); the others
/// are named so a handshake can be rejected with a clear
/// `UnsupportedFeature` rather than misinterpreting the auth data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPlugin {
    MySqlNativePassword,
    CachingSha2Password,
    Sha256Password,
    Other,
}

impl AuthPlugin {
    pub fn from_name(name: &str) -> Self {
        match name {
            "mysql_native_password" => AuthPlugin::MySqlNativePassword,
            "caching_sha2_password" => AuthPlugin::CachingSha2Password,
            "sha256_password" => AuthPlugin::Sha256Password,
            _ => AuthPlugin::Other,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AuthPlugin::MySqlNativePassword => "mysql_native_password",
            AuthPlugin::CachingSha2Password => "caching_sha2_password",
            AuthPlugin::Sha256Password => "sha256_password",
            AuthPlugin::Other => "",
        }
    }

    pub fn require_native_password(self) -> Result<()> {
        match self {
            AuthPlugin::MySqlNativePassword => Ok(()),
            _ => Err(Error::UnsupportedFeature(
                "authentication plugin other than mysql_native_password",
            )),
        }
    }
}

/// `SHA1(password) XOR SHA1(seed || SHA1(SHA1(password)))`, the
/// `mysql_native_password` scramble (§4.B "Password scramble"). An empty
/// password yields an empty response.
pub fn scramble_native_password(password: &str, seed: &[u8]) -> Vec<u8> {
    if password.is_empty() {
        return Vec::new();
    }

    let stage1 = Sha1::digest(password.as_bytes());
    let stage2 = Sha1::digest(stage1.as_slice());

    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.update(stage2.as_slice());
    let stage3 = hasher.finalize();

    stage1
        .iter()
        .zip(stage3.iter())
        .map(|(a, b)| a ^ b)
        .collect()
}
