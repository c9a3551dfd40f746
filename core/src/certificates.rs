//! Client certificate resolution.
//!
//! # Design
//! Certificates come from one of three places: the current user's personal
//! store (looked up by SHA-1 thumbprint), a file, or a base64 string. Files and
//! strings hold a PKCS#12 container, a PEM bundle, or a single DER
//! certificate. The key phrase unlocks PKCS#12 containers and encrypted PEM
//! keys; an empty phrase is valid for both.
//!
//! A PKCS#12 key stays with the certificate it was stored with. In a PEM
//! bundle the private key belongs to the first certificate.
//!
//! The personal store is a directory of bundles. `DirectoryStore` re-reads it
//! on every lookup and holds nothing open between calls. The store sits
//! behind the `CertificateStore` trait so tests point it at a temp dir.
//!
//! Results are always ordered with private-key holders first.

use std::fmt;
use std::path::{Path, PathBuf};

use base64::Engine;
use ring::digest::{digest, SHA1_FOR_LEGACY_USE_ONLY};
use tracing::{debug, warn};
use x509_parser::prelude::*;

use crate::error::{Result, WebError};
use crate::types::CertificateSource;

/// Environment variable overriding the personal store directory.
pub const STORE_ENV: &str = "WEB_TASK_CERT_STORE";

const STORE_EXTENSIONS: &[&str] = &["pem", "crt", "cer", "der", "pfx", "p12"];

const MAX_CHAIN_DEPTH: usize = 10;

/// A private key in DER form with the PEM label it was found under.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    label: String,
    der: Vec<u8>,
}

impl PrivateKey {
    pub fn to_pem(&self) -> String {
        ::pem::encode(&::pem::Pem::new(self.label.clone(), self.der.clone()))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// An X.509 certificate, optionally paired with its private key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    der: Vec<u8>,
    subject: Vec<u8>,
    issuer: Vec<u8>,
    thumbprint: String,
    private_key: Option<PrivateKey>,
}

impl Certificate {
    pub fn from_der(der: Vec<u8>) -> Result<Self> {
        let (subject, issuer) = {
            let (_, parsed) = X509Certificate::from_der(&der)
                .map_err(|e| WebError::Certificate(format!("invalid certificate: {e}")))?;
            (
                parsed.subject().as_raw().to_vec(),
                parsed.issuer().as_raw().to_vec(),
            )
        };
        let thumbprint = thumbprint(&der);
        Ok(Self {
            der,
            subject,
            issuer,
            thumbprint,
            private_key: None,
        })
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Upper-case hex SHA-1 of the DER encoding.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    pub fn private_key(&self) -> Option<&PrivateKey> {
        self.private_key.as_ref()
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer
    }

    pub fn to_pem(&self) -> String {
        ::pem::encode(&::pem::Pem::new("CERTIFICATE", self.der.clone()))
    }
}

/// Upper-case hex SHA-1 of `der`.
pub fn thumbprint(der: &[u8]) -> String {
    hex::encode_upper(digest(&SHA1_FOR_LEGACY_USE_ONLY, der).as_ref())
}

/// Strip separators and whitespace and upper-case, so `ab:cd 12` matches `ABCD12`.
pub fn normalize_thumbprint(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Decode a PKCS#12 container, a PEM bundle or a single DER certificate.
pub fn parse_bundle(bytes: &[u8], key_phrase: &str) -> Result<Vec<Certificate>> {
    if looks_like_pkcs12(bytes) {
        return parse_pkcs12(bytes, key_phrase);
    }

    let blocks = ::pem::parse_many(bytes)
        .map_err(|e| WebError::Certificate(format!("invalid PEM data: {e}")))?;
    if blocks.is_empty() {
        return Ok(vec![Certificate::from_der(bytes.to_vec())?]);
    }

    let mut certificates = Vec::new();
    let mut key = None;
    for block in blocks {
        match block.tag() {
            "CERTIFICATE" => certificates.push(Certificate::from_der(block.contents().to_vec())?),
            "PRIVATE KEY" | "RSA PRIVATE KEY" | "EC PRIVATE KEY" => {
                key = Some(PrivateKey {
                    label: block.tag().to_string(),
                    der: block.contents().to_vec(),
                });
            }
            "ENCRYPTED PRIVATE KEY" => key = Some(decrypt_key(block.contents(), key_phrase)?),
            other => debug!(tag = other, "ignoring PEM block"),
        }
    }

    let Some(first) = certificates.first_mut() else {
        return Err(WebError::Certificate(
            "bundle contains no certificates".to_string(),
        ));
    };
    first.private_key = key;
    Ok(certificates)
}

/// A PFX is `SEQUENCE { INTEGER 3, ... }`; an X.509 certificate opens with a
/// nested `SEQUENCE` instead.
fn looks_like_pkcs12(bytes: &[u8]) -> bool {
    let [0x30, len, rest @ ..] = bytes else {
        return false;
    };
    let skip = if len & 0x80 == 0 {
        0
    } else {
        usize::from(len & 0x7f)
    };
    rest.get(skip..skip + 3) == Some(&[0x02, 0x01, 0x03][..])
}

fn parse_pkcs12(bytes: &[u8], key_phrase: &str) -> Result<Vec<Certificate>> {
    let keystore = p12_keystore::KeyStore::from_pkcs12(bytes, key_phrase)
        .map_err(|e| WebError::Certificate(format!("cannot open PKCS#12 container: {e}")))?;

    let mut certificates: Vec<Certificate> = Vec::new();
    let mut push = |certificate: Certificate| {
        match certificates
            .iter_mut()
            .find(|c| c.thumbprint == certificate.thumbprint)
        {
            Some(existing) if certificate.has_private_key() => *existing = certificate,
            Some(_) => {}
            None => certificates.push(certificate),
        }
    };

    for (alias, entry) in keystore.entries() {
        match entry {
            p12_keystore::KeyStoreEntry::PrivateKeyChain(chain) => {
                let mut certs = chain.chain().iter();
                let Some(leaf) = certs.next() else {
                    warn!(alias = %alias, "PKCS#12 key without a certificate");
                    continue;
                };
                let mut leaf = Certificate::from_der(leaf.as_der().to_vec())?;
                leaf.private_key = Some(PrivateKey {
                    label: "PRIVATE KEY".to_string(),
                    der: chain.key().to_vec(),
                });
                push(leaf);
                for cert in certs {
                    push(Certificate::from_der(cert.as_der().to_vec())?);
                }
            }
            p12_keystore::KeyStoreEntry::Certificate(cert) => {
                push(Certificate::from_der(cert.as_der().to_vec())?);
            }
            #[allow(unreachable_patterns)]
            _ => debug!(alias = %alias, "ignoring PKCS#12 entry"),
        }
    }

    if certificates.is_empty() {
        return Err(WebError::Certificate(
            "PKCS#12 container holds no certificates".to_string(),
        ));
    }
    debug!(count = certificates.len(), "decoded PKCS#12 container");
    Ok(certificates)
}

fn decrypt_key(der: &[u8], key_phrase: &str) -> Result<PrivateKey> {
    let info = pkcs8::EncryptedPrivateKeyInfo::try_from(der)
        .map_err(|e| WebError::Certificate(format!("invalid encrypted private key: {e}")))?;
    let document = info
        .decrypt(key_phrase)
        .map_err(|e| WebError::Certificate(format!("cannot decrypt private key: {e}")))?;
    Ok(PrivateKey {
        label: "PRIVATE KEY".to_string(),
        der: document.as_bytes().to_vec(),
    })
}

/// A source of installed certificates.
pub trait CertificateStore: Send + Sync {
    /// Every certificate currently installed.
    fn certificates(&self) -> Result<Vec<Certificate>>;
}

/// A personal store kept as a directory of PEM/DER files.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `$WEB_TASK_CERT_STORE`, else `$HOME/.config/web-task/certs/my`.
    pub fn from_env() -> Self {
        if let Some(root) = std::env::var_os(STORE_ENV) {
            return Self::new(root);
        }
        let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
        Self::new(home.join(".config").join("web-task").join("certs").join("my"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl CertificateStore for DirectoryStore {
    fn certificates(&self) -> Result<Vec<Certificate>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(WebError::CertificateFile {
                    path: self.root.clone(),
                    source,
                })
            }
        };

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| STORE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            })
            .collect();
        paths.sort();

        let mut certificates = Vec::new();
        for path in paths {
            let bytes = std::fs::read(&path).map_err(|source| WebError::CertificateFile {
                path: path.clone(),
                source,
            })?;
            match parse_bundle(&bytes, "") {
                Ok(found) => certificates.extend(found),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable store entry"),
            }
        }
        Ok(certificates)
    }
}

/// Resolve the certificates for a `ClientCertificate` authentication.
pub fn resolve(
    source: &CertificateSource,
    load_entire_chain: bool,
    store: &dyn CertificateStore,
) -> Result<Vec<Certificate>> {
    let mut certificates = match source {
        CertificateSource::Store { thumbprint } => {
            find_in_store(store, &normalize_thumbprint(thumbprint), load_entire_chain)?
        }
        CertificateSource::File { path, key_phrase } => {
            let bytes = std::fs::read(path).map_err(|source| WebError::CertificateFile {
                path: path.clone(),
                source,
            })?;
            parse_bundle(&bytes, key_phrase)?
        }
        CertificateSource::String { base64, key_phrase } => {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(base64.trim())
                .map_err(|e| WebError::Certificate(format!("invalid base64 certificate: {e}")))?;
            parse_bundle(&bytes, key_phrase)?
        }
    };
    order_by_private_key(&mut certificates);
    Ok(certificates)
}

fn find_in_store(
    store: &dyn CertificateStore,
    thumbprint: &str,
    load_entire_chain: bool,
) -> Result<Vec<Certificate>> {
    let installed = store.certificates()?;
    let leaf = installed
        .iter()
        .filter(|c| c.thumbprint == thumbprint)
        .max_by_key(|c| c.has_private_key())
        .cloned()
        .ok_or_else(|| WebError::CertificateNotFound {
            thumbprint: thumbprint.to_string(),
        })?;

    if load_entire_chain {
        Ok(build_chain(leaf, &installed))
    } else {
        Ok(vec![leaf])
    }
}

/// Walk issuer names from `leaf` towards a self-signed root. No revocation check.
fn build_chain(leaf: Certificate, pool: &[Certificate]) -> Vec<Certificate> {
    let mut chain = vec![leaf];
    while chain.len() < MAX_CHAIN_DEPTH {
        let current = &chain[chain.len() - 1];
        if current.is_self_signed() {
            break;
        }
        let issuer = pool
            .iter()
            .find(|candidate| {
                candidate.subject == current.issuer
                    && !chain.iter().any(|seen| seen.thumbprint == candidate.thumbprint)
            })
            .cloned();
        match issuer {
            Some(issuer) => chain.push(issuer),
            None => break,
        }
    }
    chain
}

fn order_by_private_key(certificates: &mut [Certificate]) {
    certificates.sort_by_key(|c| !c.has_private_key());
}
