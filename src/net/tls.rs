//! TLS termination.
//!
//! # Responsibilities
//! - Build the listener's rustls configuration from PEM bytes
//! - Require and verify client certificates against the CA bundle
//!
//! # Design Decisions
//! - Uses rustls (no OpenSSL dependency)
//! - TLS 1.3 only; no insecure-skip-verify escape hatch
//! - PEM parsing failures surface as config-time errors, never at accept

use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};

use crate::config::ListenerConfig;

/// Error type for TLS configuration failures.
#[derive(Debug)]
pub enum TlsError {
    /// PEM material could not be parsed.
    Pem(std::io::Error),
    /// The CA bundle contained no usable certificates.
    EmptyCaBundle,
    /// A CA certificate was rejected by the trust store.
    CaCertificate(rustls::Error),
    /// The private key field held no supported key.
    NoPrivateKey,
    /// The client certificate verifier could not be built.
    ClientVerifier(rustls::server::VerifierBuilderError),
    /// The server certificate/key pair was rejected.
    ServerIdentity(rustls::Error),
}

impl std::fmt::Display for TlsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TlsError::Pem(e) => write!(f, "failed to parse PEM material: {}", e),
            TlsError::EmptyCaBundle => write!(f, "CA bundle contains no certificates"),
            TlsError::CaCertificate(e) => write!(f, "CA certificate rejected: {}", e),
            TlsError::NoPrivateKey => write!(f, "no private key found in key PEM"),
            TlsError::ClientVerifier(e) => write!(f, "failed to build client verifier: {}", e),
            TlsError::ServerIdentity(e) => write!(f, "invalid server certificate/key pair: {}", e),
        }
    }
}

impl std::error::Error for TlsError {}

/// Build the listener's rustls configuration: TLS 1.3 only, server identity
/// from the configured certificate and key, client certificates required and
/// verified against the CA bundle.
pub fn server_config(config: &ListenerConfig) -> Result<Arc<ServerConfig>, TlsError> {
    let mut ca_reader = config.ca.as_slice();
    let ca_certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut ca_reader)
        .collect::<Result<_, _>>()
        .map_err(TlsError::Pem)?;
    if ca_certs.is_empty() {
        return Err(TlsError::EmptyCaBundle);
    }

    let mut roots = RootCertStore::empty();
    for cert in ca_certs {
        roots.add(cert).map_err(TlsError::CaCertificate)?;
    }

    let mut cert_reader = config.certificate.as_slice();
    let cert_chain: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<_, _>>()
        .map_err(TlsError::Pem)?;

    let mut key_reader = config.private_key.as_slice();
    let private_key: PrivateKeyDer<'static> = rustls_pemfile::private_key(&mut key_reader)
        .map_err(TlsError::Pem)?
        .ok_or(TlsError::NoPrivateKey)?;

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(TlsError::ClientVerifier)?;

    let server_config = ServerConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
        .with_client_cert_verifier(verifier)
        .with_single_cert(cert_chain, private_key)
        .map_err(TlsError::ServerIdentity)?;

    Ok(Arc::new(server_config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ListenerConfig;
    use std::sync::Once;

    static INIT_CRYPTO: Once = Once::new();

    fn init_crypto_provider() {
        INIT_CRYPTO.call_once(|| {
            rustls::crypto::ring::default_provider()
                .install_default()
                .ok();
        });
    }

    fn listener_config(ca: &[u8], certificate: &[u8], private_key: &[u8]) -> ListenerConfig {
        ListenerConfig {
            listen_addr: "127.0.0.1:0".into(),
            ca: ca.to_vec(),
            certificate: certificate.to_vec(),
            private_key: private_key.to_vec(),
        }
    }

    fn generated_identity() -> (Vec<u8>, Vec<u8>, Vec<u8>) {
        let ca_key = rcgen::KeyPair::generate().unwrap();
        let mut ca_params = rcgen::CertificateParams::new(Vec::new()).unwrap();
        ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        ca_params.distinguished_name = rcgen::DistinguishedName::new();
        ca_params
            .distinguished_name
            .push(rcgen::DnType::CommonName, "test-ca");
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let server_key = rcgen::KeyPair::generate().unwrap();
        let server_params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        let server_cert = server_params.signed_by(&server_key, &ca_cert, &ca_key).unwrap();

        (
            ca_cert.pem().into_bytes(),
            server_cert.pem().into_bytes(),
            server_key.serialize_pem().into_bytes(),
        )
    }

    #[test]
    fn test_valid_material_accepted() {
        init_crypto_provider();
        let (ca, certificate, private_key) = generated_identity();
        let config = listener_config(&ca, &certificate, &private_key);
        assert!(server_config(&config).is_ok());
    }

    #[test]
    fn test_empty_ca_bundle_rejected() {
        let (_, certificate, private_key) = generated_identity();
        let config = listener_config(b"", &certificate, &private_key);
        assert!(matches!(server_config(&config), Err(TlsError::EmptyCaBundle)));
    }

    #[test]
    fn test_garbage_key_rejected() {
        let (ca, certificate, _) = generated_identity();
        let config = listener_config(&ca, &certificate, b"not a key");
        assert!(matches!(server_config(&config), Err(TlsError::NoPrivateKey)));
    }
}
