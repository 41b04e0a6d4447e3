//! Compact JWS tokens
//!
//! Tokens are `base64url(header).base64url(payload).base64url(signature)`.
//! This module holds the header and options types and the claim checks that
//! run after a signature has been verified.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::jwk::{Jwk, base64_url_decode};

/// Protected header of a compact JWS.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwk: Option<Jwk>,
}

/// Token payload as a JSON object.
pub type JwtClaims = serde_json::Map<String, Value>;

/// Checks applied by `KeyService::verify` once the signature is valid.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Expected `aud` (matches a string `aud` or any member of an array).
    pub audience: Option<String>,
    /// Expected `iss`.
    pub issuer: Option<String>,
    /// Expected `sub`.
    pub subject: Option<String>,
    /// Slack applied to `exp`, `nbf` and `iat` comparisons.
    pub clock_tolerance: Duration,
    /// Maximum age computed from `iat`. Makes `iat` mandatory.
    pub max_token_age: Option<Duration>,
    /// Expected `typ` header.
    pub typ: Option<String>,
    /// Claims that must be present regardless of value.
    pub required_claims: Vec<String>,
    /// Evaluate time claims at this unix time (seconds) instead of now.
    pub current_time: Option<u64>,
}

/// A token whose signature and claims passed verification.
#[derive(Debug, Clone)]
pub struct VerifiedJwt {
    pub header: JwtHeader,
    pub claims: JwtClaims,
}

/// Split a compact token into its three segments.
pub(crate) fn split_token(token: &str) -> Result<(&str, &str, &str)> {
    let mut parts = token.split('.');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) if !h.is_empty() && !p.is_empty() => Ok((h, p, s)),
        _ => Err(Error::VerificationFailed("malformed compact token".into())),
    }
}

pub(crate) fn decode_segment<T: serde::de::DeserializeOwned>(name: &str, segment: &str) -> Result<T> {
    let bytes = base64_url_decode(segment)
        .map_err(|e| Error::VerificationFailed(format!("invalid base64 in {name}: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::VerificationFailed(format!("invalid {name} JSON: {e}")))
}

fn numeric_claim(claims: &JwtClaims, name: &str) -> Result<Option<u64>> {
    match claims.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| Error::VerificationFailed(format!("{name:?} is not a numeric date"))),
    }
}

fn string_claim<'a>(claims: &'a JwtClaims, name: &str) -> Option<&'a str> {
    claims.get(name).and_then(Value::as_str)
}

/// Apply `options` to a verified header and payload at unix time `now`.
pub(crate) fn check_claims(
    header: &JwtHeader,
    claims: &JwtClaims,
    options: &VerifyOptions,
    now: u64,
) -> Result<()> {
    if let Some(expected) = options.typ.as_deref() {
        if header.typ.as_deref() != Some(expected) {
            return Err(Error::VerificationFailed(format!(
                "unexpected \"typ\": expected {expected:?}, got {:?}",
                header.typ
            )));
        }
    }

    let tolerance = options.clock_tolerance.as_secs();

    if let Some(exp) = numeric_claim(claims, "exp")? {
        if now >= exp.saturating_add(tolerance) {
            return Err(Error::VerificationFailed("token expired".into()));
        }
    }

    if let Some(nbf) = numeric_claim(claims, "nbf")? {
        if nbf > now.saturating_add(tolerance) {
            return Err(Error::VerificationFailed("token not yet valid".into()));
        }
    }

    let iat = numeric_claim(claims, "iat")?;
    if let Some(iat) = iat {
        if iat > now.saturating_add(tolerance) {
            return Err(Error::VerificationFailed("token issued in the future".into()));
        }
    }

    if let Some(max_age) = options.max_token_age {
        let iat = iat.ok_or_else(|| Error::VerificationFailed("missing \"iat\" claim".into()))?;
        let age = now.saturating_sub(iat);
        if age > max_age.as_secs().saturating_add(tolerance) {
            return Err(Error::VerificationFailed(format!(
                "token too old: {age}s exceeds {}s",
                max_age.as_secs()
            )));
        }
    }

    if let Some(expected) = options.issuer.as_deref() {
        if string_claim(claims, "iss") != Some(expected) {
            return Err(Error::VerificationFailed(format!(
                "issuer mismatch: expected {expected}"
            )));
        }
    }

    if let Some(expected) = options.subject.as_deref() {
        if string_claim(claims, "sub") != Some(expected) {
            return Err(Error::VerificationFailed(format!(
                "subject mismatch: expected {expected}"
            )));
        }
    }

    if let Some(expected) = options.audience.as_deref() {
        let matches = match claims.get("aud") {
            Some(Value::String(aud)) => aud == expected,
            Some(Value::Array(auds)) => auds.iter().any(|a| a.as_str() == Some(expected)),
            _ => false,
        };
        if !matches {
            return Err(Error::VerificationFailed(format!(
                "audience mismatch: expected {expected}"
            )));
        }
    }

    for name in &options.required_claims {
        if !claims.contains_key(name) {
            return Err(Error::VerificationFailed(format!("missing {name:?} claim")));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const NOW: u64 = 1_700_000_000;

    fn claims(value: Value) -> JwtClaims {
        value.as_object().cloned().unwrap()
    }

    fn header(typ: Option<&str>) -> JwtHeader {
        JwtHeader {
            alg: "ES256".into(),
            typ: typ.map(String::from),
            ..Default::default()
        }
    }

    fn reason(result: Result<()>) -> String {
        match result {
            Err(Error::VerificationFailed(reason)) => reason,
            other => panic!("expected VerificationFailed, got {other:?}"),
        }
    }

    #[test]
    fn split_requires_three_segments() {
        assert!(split_token("a.b.c").is_ok());
        assert!(split_token("a.b").is_err());
        assert!(split_token("a.b.c.d").is_err());
        assert!(split_token(".b.c").is_err());
    }

    #[test]
    fn expired_token_is_rejected_unless_tolerated() {
        let c = claims(json!({ "exp": NOW - 5 }));
        let strict = VerifyOptions::default();
        assert_eq!(reason(check_claims(&header(None), &c, &strict, NOW)), "token expired");

        let lenient = VerifyOptions {
            clock_tolerance: Duration::from_secs(10),
            ..Default::default()
        };
        assert!(check_claims(&header(None), &c, &lenient, NOW).is_ok());
    }

    #[test]
    fn not_before_in_future_is_rejected() {
        let c = claims(json!({ "nbf": NOW + 120 }));
        let r = reason(check_claims(&header(None), &c, &VerifyOptions::default(), NOW));
        assert_eq!(r, "token not yet valid");
    }

    #[test]
    fn max_age_requires_iat() {
        let options = VerifyOptions {
            max_token_age: Some(Duration::from_secs(60)),
            ..Default::default()
        };
        let r = reason(check_claims(&header(None), &claims(json!({})), &options, NOW));
        assert!(r.contains("iat"));

        let old = claims(json!({ "iat": NOW - 61 }));
        assert!(reason(check_claims(&header(None), &old, &options, NOW)).contains("too old"));

        let fresh = claims(json!({ "iat": NOW - 59 }));
        assert!(check_claims(&header(None), &fresh, &options, NOW).is_ok());
    }

    #[test]
    fn audience_matches_string_or_array() {
        let options = VerifyOptions {
            audience: Some("did:web:pds.example".into()),
            ..Default::default()
        };
        let single = claims(json!({ "aud": "did:web:pds.example" }));
        let many = claims(json!({ "aud": ["other", "did:web:pds.example"] }));
        let wrong = claims(json!({ "aud": "did:web:elsewhere" }));
        assert!(check_claims(&header(None), &single, &options, NOW).is_ok());
        assert!(check_claims(&header(None), &many, &options, NOW).is_ok());
        assert!(reason(check_claims(&header(None), &wrong, &options, NOW)).contains("audience"));
    }

    #[test]
    fn issuer_and_subject_must_match() {
        let options = VerifyOptions {
            issuer: Some("https://auth.example".into()),
            subject: Some("did:plc:alice".into()),
            ..Default::default()
        };
        let good = claims(json!({ "iss": "https://auth.example", "sub": "did:plc:alice" }));
        let bad_sub = claims(json!({ "iss": "https://auth.example", "sub": "did:plc:bob" }));
        assert!(check_claims(&header(None), &good, &options, NOW).is_ok());
        assert!(reason(check_claims(&header(None), &bad_sub, &options, NOW)).contains("subject"));
    }

    #[test]
    fn required_claims_must_be_present() {
        let options = VerifyOptions {
            required_claims: vec!["jti".into()],
            ..Default::default()
        };
        let r = reason(check_claims(&header(None), &claims(json!({ "iat": NOW })), &options, NOW));
        assert!(r.contains("jti"));
    }

    #[test]
    fn typ_header_must_match() {
        let options = VerifyOptions {
            typ: Some("dpop+jwt".into()),
            ..Default::default()
        };
        let c = claims(json!({}));
        assert!(check_claims(&header(Some("dpop+jwt")), &c, &options, NOW).is_ok());
        assert!(reason(check_claims(&header(Some("JWT")), &c, &options, NOW)).contains("typ"));
    }

    #[test]
    fn non_numeric_exp_is_rejected() {
        let c = claims(json!({ "exp": "tomorrow" }));
        assert!(check_claims(&header(None), &c, &VerifyOptions::default(), NOW).is_err());
    }
}
