use hmac::{ Hmac, Mac };
use sha2::Sha256;
use std::collections::HashMap;
use thiserror::Error;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

// Accepts the key itself (header or `api_key`) or `sig = hex(HMAC-SHA256(key, ts))`.
pub const MAX_CLOCK_SKEW_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,
    #[error("invalid api key")]
    BadKey,
    #[error("timestamp out of range")]
    Expired,
    #[error("bad signature")]
    BadSignature,
}

pub fn sign(secret: &str, ts: &str) -> Result<String, AuthError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::BadSignature)?;
    mac.update(ts.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

pub fn authorize(
    secret: Option<&str>,
    query: &str,
    header_key: Option<&str>,
    now: i64
) -> Result<(), AuthError> {
    let secret = match secret {
        Some(k) if !k.is_empty() => k,
        _ => {
            return Ok(());
        }
    };

    let params: HashMap<String, String> = form_urlencoded
        ::parse(query.as_bytes())
        .into_owned()
        .collect();

    if let Some(key) = header_key.or_else(|| params.get("api_key").map(String::as_str)) {
        return if key == secret { Ok(()) } else { Err(AuthError::BadKey) };
    }

    let ts = params.get("ts").or_else(|| params.get("X-Api-Ts"));
    let sig = params.get("sig").or_else(|| params.get("X-Api-Sign"));
    let (ts, sig) = match (ts, sig) {
        (Some(ts), Some(sig)) => (ts, sig),
        _ => {
            return Err(AuthError::Missing);
        }
    };

    let ts_i: i64 = ts.parse().map_err(|_| AuthError::Expired)?;
    if (now - ts_i).abs() > MAX_CLOCK_SKEW_SECS {
        return Err(AuthError::Expired);
    }

    let expected = hex::decode(sig).map_err(|_| AuthError::BadSignature)?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| AuthError::BadSignature)?;
    mac.update(ts.as_bytes());
    mac.verify_slice(&expected).map_err(|_| AuthError::BadSignature)
}
