//! TLS for the secure-mode listener
//!
//! The certificate chain and key are read once at startup. The resulting
//! rustls config offers `h2` and `http/1.1` over ALPN so native RPC clients
//! and browsers can share the one port.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

use crate::config::TlsFiles;

/// ALPN protocols offered, in preference order
pub const ALPN_PROTOCOLS: [&[u8]; 2] = [b"h2", b"http/1.1"];

/// Certificate or key loading failure
#[derive(Debug, Error)]
pub enum TlsError {
    /// Certificate file missing or unreadable
    #[error("cannot read certificate chain {}: {source}", path.display())]
    CertificateRead {
        /// Configured certificate path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Key file missing or unreadable
    #[error("cannot read private key {}: {source}", path.display())]
    KeyRead {
        /// Configured key path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The file parsed but held no `CERTIFICATE` block
    #[error("no PEM certificates in {}", path.display())]
    NoCertificates {
        /// Configured certificate path
        path: PathBuf,
    },

    /// The file parsed but held no PKCS#1, PKCS#8 or SEC1 key
    #[error("no PEM private key in {}", path.display())]
    NoPrivateKey {
        /// Configured key path
        path: PathBuf,
    },

    /// Malformed PEM
    #[error("malformed PEM in {}: {reason}", path.display())]
    Pem {
        /// File that failed to parse
        path: PathBuf,
        /// Parser message
        reason: String,
    },

    /// rustls refused the pair, e.g. the key does not match the certificate
    #[error("rustls rejected the certificate: {0}")]
    Rustls(#[from] rustls::Error),
}

/// Build the listener's rustls config from PEM files
///
/// # Errors
///
/// Any [`TlsError`]; the gateway refuses to start on all of them.
pub fn load_server_config(files: &TlsFiles) -> Result<Arc<rustls::ServerConfig>, TlsError> {
    let certs = read_certificates(&files.cert_file)?;
    let key = read_private_key(&files.key_file)?;

    // More than one crypto provider can end up compiled in; pick ring explicitly
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let mut config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

    Ok(Arc::new(config))
}

/// [`load_server_config`] wrapped in an acceptor
///
/// # Errors
///
/// See [`load_server_config`].
pub fn acceptor(files: &TlsFiles) -> Result<TlsAcceptor, TlsError> {
    load_server_config(files).map(TlsAcceptor::from)
}

fn read_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::CertificateRead {
        path: path.to_path_buf(),
        source,
    })?;
    let certs = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::Pem {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates {
            path: path.to_path_buf(),
        });
    }
    Ok(certs)
}

fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let file = File::open(path).map_err(|source| TlsError::KeyRead {
        path: path.to_path_buf(),
        source,
    })?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| TlsError::Pem {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .ok_or_else(|| TlsError::NoPrivateKey {
            path: path.to_path_buf(),
        })
}
