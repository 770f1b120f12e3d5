use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::pem::PemObject;
use rustls::pki_types::CertificateDer;
use rustls::{ClientConfig, RootCertStore};
use tokio_tungstenite::Connector;
use tracing::{debug, warn};

use crate::config::TlsConfig;
use crate::error::{JetstreamError, Result};

/// Builds the trust store: bundled webpki roots, or the platform store, plus an optional CA file.
pub fn root_store(native_roots: bool, cafile: Option<&Path>) -> Result<RootCertStore> {
    let mut root_cert_store = RootCertStore::empty();

    if native_roots {
        let loaded = rustls_native_certs::load_native_certs();
        for e in &loaded.errors {
            warn!("Skipping native certificate source: {}", e);
        }
        let (added, ignored) = root_cert_store.add_parsable_certificates(loaded.certs);
        debug!(added, ignored, "loaded native roots");
    } else {
        root_cert_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    }

    if let Some(cafile) = cafile {
        for cert in CertificateDer::pem_file_iter(cafile).map_err(pem_error)? {
            root_cert_store.add(cert.map_err(pem_error)?)?;
        }
        debug!("added CA file {}", cafile.display());
    }

    Ok(root_cert_store)
}

/// Client connector handed to the WebSocket dial for `wss://` endpoints.
pub fn connector(tls: &TlsConfig) -> Result<Connector> {
    let roots = root_store(tls.native_roots, tls.ca_file.as_deref())?;

    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(Connector::Rustls(Arc::new(config)))
}

fn pem_error(e: rustls::pki_types::pem::Error) -> JetstreamError {
    JetstreamError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, format!("{e:?}")))
}
