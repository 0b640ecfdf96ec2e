//! Certificate material and X.509 client identity generation
//!
//! This module provides the key-pair and certificate wrapper types used by
//! the identity store, plus self-signed client certificate generation using
//! standard X.509 and ECDSA P-256.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

// Certificate generation and parsing
use rcgen::{Certificate as RcgenCertificate, CertificateParams, KeyPair};
use rustls_pki_types::CertificateDer;
use x509_parser::prelude::*;

// Cryptographic support
use p256::ecdsa::SigningKey;
use pkcs8::EncodePrivateKey;
use sha2::{Digest, Sha256};

use crate::error::{KeyError, Result};

/// Validity window for freshly generated client identities.
const SELF_SIGNED_VALIDITY_DAYS: u64 = 3650;

/// ECDSA P-256 key pair backing a client identity
#[derive(Debug, Clone)]
pub struct EcdsaKeyPair {
    signing_key: SigningKey,
}

impl EcdsaKeyPair {
    /// Generate a new ECDSA P-256 key pair
    pub fn new() -> Result<Self> {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        Ok(Self { signing_key })
    }

    /// Get private key in PKCS#8 DER format
    pub fn private_key_der(&self) -> Result<Vec<u8>> {
        self.signing_key
            .to_pkcs8_der()
            .map(|der| der.as_bytes().to_vec())
            .map_err(|e| KeyError::SerializationError(format!("PKCS#8 encoding error: {e}")))
    }

    /// Convert to rcgen KeyPair for certificate building
    pub fn to_rcgen_key_pair(&self) -> Result<KeyPair> {
        let private_key_der = self.private_key_der()?;
        KeyPair::from_der(&private_key_der)
            .map_err(|e| KeyError::CertificateError(format!("rcgen KeyPair conversion error: {e}")))
    }
}

/// Standard X.509 certificate wrapper
#[derive(Debug, Clone)]
pub struct X509Certificate {
    /// DER-encoded certificate bytes
    der_bytes: Vec<u8>,
    /// Certificate subject
    subject: String,
    /// Certificate issuer
    issuer: String,
}

impl X509Certificate {
    /// Create from DER-encoded bytes
    pub fn from_der(der_bytes: Vec<u8>) -> Result<Self> {
        let (_, parsed_cert) = x509_parser::certificate::X509Certificate::from_der(&der_bytes)
            .map_err(|e| {
                KeyError::CertificateError(format!("Failed to parse certificate: {e}"))
            })?;

        let subject = parsed_cert.subject().to_string();
        let issuer = parsed_cert.issuer().to_string();

        Ok(Self {
            der_bytes,
            subject,
            issuer,
        })
    }

    /// Get DER-encoded bytes
    pub fn der_bytes(&self) -> &[u8] {
        &self.der_bytes
    }

    /// Get certificate subject
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Get certificate issuer
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Parse the certificate for field access
    pub fn parsed(&self) -> Result<x509_parser::certificate::X509Certificate> {
        let (_, cert) = x509_parser::certificate::X509Certificate::from_der(&self.der_bytes)
            .map_err(|e| {
                KeyError::CertificateError(format!("Failed to parse certificate: {e}"))
            })?;
        Ok(cert)
    }

    /// Subject common name, when present
    pub fn common_name(&self) -> Option<String> {
        let parsed = self.parsed().ok()?;
        let cn = parsed
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(|s| s.to_string());
        cn
    }

    /// Subject email: rfc822Name SAN entry first, then the emailAddress
    /// attribute of the subject DN
    pub fn email(&self) -> Option<String> {
        let parsed = self.parsed().ok()?;
        if let Ok(Some(san)) = parsed.subject_alternative_name() {
            for name in &san.value.general_names {
                if let GeneralName::RFC822Name(addr) = name {
                    return Some(addr.to_string());
                }
            }
        }
        let email = parsed
            .subject()
            .iter_email()
            .next()
            .and_then(|attr| attr.as_str().ok())
            .map(|s| s.to_string());
        email
    }

    /// SHA-256 digest of the DER encoding. Stable for the lifetime of the
    /// certificate; used as the fingerprint source.
    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(&self.der_bytes).into()
    }

    /// Lowercase hex rendering of [`Self::digest`]
    pub fn hex_digest(&self) -> String {
        hex::encode(self.digest())
    }

    /// Start of the validity window
    pub fn not_before(&self) -> Result<SystemTime> {
        let parsed = self.parsed()?;
        Ok(parsed.validity().not_before.to_datetime().into())
    }

    /// Expiry of the validity window
    pub fn not_after(&self) -> Result<SystemTime> {
        let parsed = self.parsed()?;
        Ok(parsed.validity().not_after.to_datetime().into())
    }

    /// Convert to rustls certificate format
    pub fn to_rustls_certificate(&self) -> CertificateDer<'static> {
        CertificateDer::from(self.der_bytes.clone())
    }
}

impl Serialize for X509Certificate {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.der_bytes.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for X509Certificate {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let der_bytes: Vec<u8> = Vec::deserialize(deserializer)?;
        Self::from_der(der_bytes).map_err(|e| {
            serde::de::Error::custom(format!("Failed to deserialize certificate: {e}"))
        })
    }
}

/// Build a fresh self-signed client identity binding `name` and `email`.
///
/// A new P-256 key is generated on every call; the certificate carries
/// `CN=name`, an rfc822Name SAN with `email` (when non-empty), and the key
/// usages a TLS client certificate needs.
pub fn generate_self_signed(name: &str, email: &str) -> Result<(X509Certificate, EcdsaKeyPair)> {
    let key_pair = EcdsaKeyPair::new()?;

    let mut params = CertificateParams::new(vec![]);
    params.distinguished_name = rcgen::DistinguishedName::new();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, name);
    if !email.is_empty() {
        params
            .subject_alt_names
            .push(rcgen::SanType::Rfc822Name(email.to_string()));
    }

    params.is_ca = rcgen::IsCa::ExplicitNoCa;
    params.key_usages = vec![
        rcgen::KeyUsagePurpose::DigitalSignature,
        rcgen::KeyUsagePurpose::KeyEncipherment,
    ];
    params.extended_key_usages = vec![rcgen::ExtendedKeyUsagePurpose::ClientAuth];

    let not_before = SystemTime::now();
    let not_after = not_before + Duration::from_secs(SELF_SIGNED_VALIDITY_DAYS * 24 * 60 * 60);
    params.not_before = not_before.into();
    params.not_after = not_after.into();

    let rcgen_key_pair = key_pair.to_rcgen_key_pair()?;
    params.key_pair = Some(rcgen_key_pair);

    let cert = RcgenCertificate::from_params(params)
        .map_err(|e| KeyError::GenerationFailure(format!("Failed to build certificate: {e}")))?;
    let cert_der = cert
        .serialize_der()
        .map_err(|e| KeyError::GenerationFailure(format!("Failed to encode certificate: {e}")))?;

    Ok((X509Certificate::from_der(cert_der)?, key_pair))
}
