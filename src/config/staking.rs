//! Staking credentials
//!
//! Parses PEM staking certificate/key pairs and derives node identities.

use ripemd::Ripemd160;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Staking material parse failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StakingError {
    #[error("no certificate found in staking cert: {0}")]
    NoCertificate(String),

    #[error("no private key found in staking key: {0}")]
    NoPrivateKey(String),

    #[error("staking cert/key pair rejected: {0}")]
    InvalidPair(String),
}

/// Node identity derived from the staking certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId([u8; 20]);

impl NodeId {
    /// RIPEMD160(SHA256(cert DER))
    pub fn from_cert_der(der: &[u8]) -> Self {
        let sha = Sha256::digest(der);
        let digest = Ripemd160::digest(sha);
        let mut id = [0u8; 20];
        id.copy_from_slice(&digest);
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeID-{}", hex::encode(self.0))
    }
}

/// A well-formed staking certificate/key pair
#[derive(Debug, Clone)]
pub struct StakingMaterial {
    /// Leaf certificate first
    certs: Vec<CertificateDer<'static>>,
}

impl StakingMaterial {
    /// Parse and cross-check a PEM cert/key pair.
    ///
    /// The pair must load into a TLS server configuration, which rejects
    /// unparseable keys and (for supported key types) keys that do not
    /// belong to the certificate.
    pub fn parse(cert_pem: &[u8], key_pem: &[u8]) -> Result<Self, StakingError> {
        let mut cert_reader = cert_pem;
        let certs = rustls_pemfile::certs(&mut cert_reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| StakingError::NoCertificate(e.to_string()))?;
        if certs.is_empty() {
            return Err(StakingError::NoCertificate(
                "no PEM CERTIFICATE block".to_string(),
            ));
        }

        let mut key_reader = key_pem;
        let key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_reader)
            .map_err(|e| StakingError::NoPrivateKey(e.to_string()))?
            .ok_or_else(|| StakingError::NoPrivateKey("no PEM private key block".to_string()))?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| StakingError::InvalidPair(e.to_string()))?
            .with_no_client_auth()
            .with_single_cert(certs.clone(), key)
            .map_err(|e| StakingError::InvalidPair(e.to_string()))?;

        Ok(Self { certs })
    }

    /// Identity of the node owning this material
    pub fn node_id(&self) -> NodeId {
        NodeId::from_cert_der(self.certs[0].as_ref())
    }

    /// Leaf certificate in DER form
    pub fn leaf_der(&self) -> &[u8] {
        self.certs[0].as_ref()
    }
}
