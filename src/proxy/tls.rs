//! Leaf certificates for intercepted HTTPS hosts

use parking_lot::RwLock;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType, IsCa, KeyPair,
    KeyUsagePurpose, SanType,
};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::CertificateError;

/// Certificate and private key for one host, PEM encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafCertificate {
    /// Host the certificate was issued for
    pub host: String,

    /// Certificate PEM
    pub cert_pem: String,

    /// Private key PEM
    pub key_pem: String,
}

/// Capability to obtain a leaf certificate for a host.
///
/// The interception layer terminates TLS with it; everything downstream sees
/// plain messages.
pub trait LeafCertificateSource: Send + Sync {
    fn leaf_certificate_for(&self, host: &str) -> Result<Arc<LeafCertificate>, CertificateError>;
}

/// In-memory certificate authority that signs leaf certificates on demand
pub struct CertificateAuthority {
    /// CA certificate
    ca_cert: Certificate,

    /// CA key pair
    ca_key: KeyPair,

    /// Issued certificates by host
    cert_cache: RwLock<HashMap<String, Arc<LeafCertificate>>>,
}

impl CertificateAuthority {
    /// Create a new CA with a fresh key
    pub fn new() -> Result<Self, CertificateError> {
        let key_pair = KeyPair::generate().map_err(|e| CertificateError::Authority(e.to_string()))?;
        Self::with_key(key_pair)
    }

    /// Recreate the CA around a PEM private key
    pub fn from_key_file(key_path: &Path) -> Result<Self, CertificateError> {
        let key_pem = fs::read_to_string(key_path).map_err(|e| {
            CertificateError::Authority(format!("{}: {}", key_path.display(), e))
        })?;
        let key_pair =
            KeyPair::from_pem(&key_pem).map_err(|e| CertificateError::Authority(e.to_string()))?;
        Self::with_key(key_pair)
    }

    fn with_key(key_pair: KeyPair) -> Result<Self, CertificateError> {
        let mut params = CertificateParams::default();
        params.is_ca = IsCa::Ca(BasicConstraints::Constrained(0));
        params.key_usages = vec![
            KeyUsagePurpose::DigitalSignature,
            KeyUsagePurpose::KeyCertSign,
            KeyUsagePurpose::CrlSign,
        ];

        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, "harrow interception CA");
        dn.push(DnType::OrganizationName, "harrow");
        params.distinguished_name = dn;

        let ca_cert = params
            .self_signed(&key_pair)
            .map_err(|e| CertificateError::Authority(e.to_string()))?;

        Ok(Self {
            ca_cert,
            ca_key: key_pair,
            cert_cache: RwLock::new(HashMap::new()),
        })
    }

    /// CA certificate PEM, for installing into a client trust store
    pub fn ca_cert_pem(&self) -> String {
        self.ca_cert.pem()
    }

    /// Write the CA certificate and key
    pub fn save_to_files(&self, cert_path: &Path, key_path: &Path) -> Result<(), CertificateError> {
        let write = |path: &Path, contents: String| {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .map_err(|e| CertificateError::Authority(format!("{}: {}", parent.display(), e)))?;
            }
            fs::write(path, contents)
                .map_err(|e| CertificateError::Authority(format!("{}: {}", path.display(), e)))
        };

        write(cert_path, self.ca_cert.pem())?;
        write(key_path, self.ca_key.serialize_pem())?;
        tracing::info!(path = %cert_path.display(), "Saved CA certificate");
        Ok(())
    }

    /// Number of hosts with an issued certificate
    pub fn cached_hosts(&self) -> usize {
        self.cert_cache.read().len()
    }

    fn issue(&self, host: &str) -> Result<LeafCertificate, CertificateError> {
        let generation = |reason: String| CertificateError::Generation {
            host: host.to_string(),
            reason,
        };

        let mut params = CertificateParams::default();
        let mut dn = DistinguishedName::new();
        dn.push(DnType::CommonName, host);
        params.distinguished_name = dn;

        params.subject_alt_names = match host.parse::<std::net::IpAddr>() {
            Ok(ip) => vec![SanType::IpAddress(ip)],
            Err(_) => vec![SanType::DnsName(
                host.try_into().map_err(|e: rcgen::Error| generation(e.to_string()))?,
            )],
        };

        let key_pair = KeyPair::generate().map_err(|e| generation(e.to_string()))?;
        let cert = params
            .signed_by(&key_pair, &self.ca_cert, &self.ca_key)
            .map_err(|e| generation(e.to_string()))?;

        Ok(LeafCertificate {
            host: host.to_string(),
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        })
    }
}

impl LeafCertificateSource for CertificateAuthority {
    fn leaf_certificate_for(&self, host: &str) -> Result<Arc<LeafCertificate>, CertificateError> {
        let host = host.trim().to_ascii_lowercase();
        if let Some(cert) = self.cert_cache.read().get(&host) {
            return Ok(Arc::clone(cert));
        }

        let mut cache = self.cert_cache.write();
        // Another caller may have issued it while we waited for the lock
        if let Some(cert) = cache.get(&host) {
            return Ok(Arc::clone(cert));
        }

        let cert = Arc::new(self.issue(&host)?);
        tracing::debug!(host = %host, "Issued leaf certificate");
        cache.insert(host, Arc::clone(&cert));
        Ok(cert)
    }
}
