//! TLS setup for the HTTP client.
//!
//! Native root certificates are loaded from the OS store once per process and
//! reused by every client built afterwards.

use rustls_pki_types::CertificateDer;
use std::sync::{Arc, OnceLock};

/// Always holds the load result; an empty vec means no certs were found.
static NATIVE_ROOTS: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

fn load_native_roots() -> Vec<CertificateDer<'static>> {
    let result = rustls_native_certs::load_native_certs();

    for err in &result.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }

    if result.certs.is_empty() {
        tracing::warn!("no native root CA certificates found");
    } else {
        tracing::debug!(count = result.certs.len(), "loaded native root certificates");
    }

    result.certs
}

/// Native root certificates, loaded on first use.
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS.get_or_init(load_native_roots).as_slice()
}

/// Crypto provider for TLS connections.
///
/// Uses the process-wide default when one is installed, otherwise an
/// aws-lc-rs provider that is not installed globally.
pub fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Build a rustls `ClientConfig` trusting the native root certificates.
///
/// # Errors
///
/// Returns an error if the OS store is empty or none of its certificates
/// parse, so a broken trust store is reported when the client is built
/// rather than on the first handshake.
pub fn native_roots_client_config() -> Result<rustls::ClientConfig, String> {
    let certs = native_root_certs();
    if certs.is_empty() {
        return Err("no native root CA certificates found in OS certificate store".to_owned());
    }

    let mut root_store = rustls::RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(certs.iter().cloned());

    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates could not be parsed");
    }
    if added == 0 {
        return Err(format!(
            "no valid native root CA certificates parsed (found {}, all {ignored} failed to parse)",
            certs.len()
        ));
    }

    rustls::ClientConfig::builder_with_provider(crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| format!("failed to set TLS protocol versions: {e}"))
        .map(|builder| {
            builder
                .with_root_certificates(root_store)
                .with_no_client_auth()
        })
}
