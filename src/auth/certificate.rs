//! Client-certificate assertions: PKCS#12 or PEM loading and RS256 signing.
//!
//! Inline material is a base64 PKCS#12 bundle or PEM text. A certificate file
//! holds a binary PKCS#12 bundle, its base64 form, or PEM text.

use super::AuthError;
use super::strategy::CertificateSource;
use base64::Engine;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use log::debug;
use p12_keystore::KeyStore;
use rustls_pemfile::Item;
use serde::Serialize;
use sha1::{Digest, Sha1};
use std::io::BufReader;

const ASSERTION_LIFETIME_SECS: i64 = 10 * 60;
const PEM_MARKER: &[u8] = b"-----BEGIN";

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    aud: &'a str,
    iss: &'a str,
    sub: &'a str,
    jti: String,
    nbf: i64,
    iat: i64,
    exp: i64,
}

pub(crate) struct ClientCertificate {
    /// Base64url SHA-1 of the DER certificate, sent as `x5t`.
    thumbprint: String,
    key: EncodingKey,
}

impl ClientCertificate {
    pub(crate) async fn load(
        source: &CertificateSource,
        password: Option<&str>,
    ) -> Result<Self, AuthError> {
        let raw = match source {
            CertificateSource::Inline(secret) => secret.expose().as_bytes().to_vec(),
            CertificateSource::File(path) => {
                tokio::fs::read(path).await.map_err(|source| AuthError::Io {
                    path: path.clone(),
                    source,
                })?
            }
        };
        Self::from_bytes(&raw, password)
    }

    pub(crate) fn from_bytes(raw: &[u8], password: Option<&str>) -> Result<Self, AuthError> {
        if raw.windows(PEM_MARKER.len()).any(|w| w == PEM_MARKER) {
            return Self::from_pem(raw);
        }

        // base64 text first, binary DER otherwise
        let der = std::str::from_utf8(raw)
            .ok()
            .map(|text| text.split_whitespace().collect::<String>())
            .and_then(|text| STANDARD.decode(text).ok())
            .unwrap_or_else(|| raw.to_vec());
        Self::from_pkcs12(&der, password.unwrap_or_default())
    }

    pub(crate) fn from_pkcs12(der: &[u8], password: &str) -> Result<Self, AuthError> {
        let store = KeyStore::from_pkcs12(der, password)
            .map_err(|e| AuthError::Certificate(format!("invalid PKCS#12 bundle: {}", e)))?;

        let (alias, chain) = store.private_key_chain().ok_or_else(|| {
            AuthError::Certificate("no private key found in PKCS#12 bundle".into())
        })?;
        let certificate = chain.chain().first().ok_or_else(|| {
            AuthError::Certificate("no certificate found in PKCS#12 bundle".into())
        })?;
        debug!("Loaded client certificate '{}' from PKCS#12 bundle", alias);

        Self::from_parts(certificate.as_der(), &encode_pem("PRIVATE KEY", chain.key()))
    }

    pub(crate) fn from_pem(pem: &[u8]) -> Result<Self, AuthError> {
        let mut reader = BufReader::new(pem);
        let mut certificate_der = None;
        let mut key_pem = None;

        for item in rustls_pemfile::read_all(&mut reader) {
            let item = item.map_err(|e| AuthError::Certificate(format!("invalid PEM: {}", e)))?;
            match item {
                Item::X509Certificate(der) if certificate_der.is_none() => {
                    certificate_der = Some(der.as_ref().to_vec());
                }
                Item::Pkcs1Key(der) if key_pem.is_none() => {
                    key_pem = Some(encode_pem("RSA PRIVATE KEY", der.secret_pkcs1_der()));
                }
                Item::Pkcs8Key(der) if key_pem.is_none() => {
                    key_pem = Some(encode_pem("PRIVATE KEY", der.secret_pkcs8_der()));
                }
                _ => {}
            }
        }

        let certificate_der = certificate_der
            .ok_or_else(|| AuthError::Certificate("no certificate found in PEM".into()))?;
        let key_pem = key_pem.ok_or_else(|| {
            if String::from_utf8_lossy(pem).contains("ENCRYPTED PRIVATE KEY") {
                AuthError::Certificate(
                    "encrypted PEM keys are not supported, use a PKCS#12 bundle".into(),
                )
            } else {
                AuthError::Certificate("no RSA private key found in PEM".into())
            }
        })?;

        Self::from_parts(&certificate_der, &key_pem)
    }

    fn from_parts(certificate_der: &[u8], key_pem: &str) -> Result<Self, AuthError> {
        let key = EncodingKey::from_rsa_pem(key_pem.as_bytes())?;
        let thumbprint = URL_SAFE_NO_PAD.encode(Sha1::digest(certificate_der));
        Ok(Self { thumbprint, key })
    }

    pub(crate) fn assertion(&self, client_id: &str, audience: &str) -> Result<String, AuthError> {
        let mut header = Header::new(Algorithm::RS256);
        header.x5t = Some(self.thumbprint.clone());

        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            aud: audience,
            iss: client_id,
            sub: client_id,
            jti: uuid::Uuid::new_v4().to_string(),
            nbf: now,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        Ok(jsonwebtoken::encode(&header, &claims, &self.key)?)
    }
}

fn encode_pem(label: &str, der: &[u8]) -> String {
    let body = STANDARD.encode(der);
    let mut pem = format!("-----BEGIN {}-----\n", label);
    for chunk in body.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(chunk));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {}-----\n", label));
    pem
}
