//! In-place TLS upgrade of the RDP socket.
//!
//! Certificate verification is off by default — this is an automation
//! client that routinely talks to servers with self-signed certificates —
//! but [`TlsOptions::verify_certificates`] turns the platform verifier on.
//! The peer's SubjectPublicKey is extracted for the CredSSP binding.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _};
use x509_cert::der::{Decode as _, Encode as _};

pub type TlsStream<S> = tokio_rustls::client::TlsStream<S>;

/// Knobs for the TLS upgrade.
#[derive(Debug, Clone, Default)]
pub struct TlsOptions {
    /// Verify the server certificate against the WebPKI roots.
    ///
    /// Off by default; production deployments that control their
    /// certificates should enable this.
    pub verify_certificates: bool,
}

/// Upgrades `stream` in place and returns it together with the server's
/// DER-encoded public key.
pub async fn upgrade<S>(stream: S, server_name: &str, options: &TlsOptions) -> io::Result<(TlsStream<S>, Vec<u8>)>
where
    S: Unpin + AsyncRead + AsyncWrite,
{
    let mut tls_stream = {
        let mut config = if options.verify_certificates {
            let mut roots = tokio_rustls::rustls::RootCertStore::empty();
            roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|anchor| {
                tokio_rustls::rustls::OwnedTrustAnchor::from_subject_spki_name_constraints(
                    anchor.subject,
                    anchor.spki,
                    anchor.name_constraints,
                )
            }));

            tokio_rustls::rustls::ClientConfig::builder()
                .with_safe_defaults()
                .with_root_certificates(roots)
                .with_no_client_auth()
        } else {
            tokio_rustls::rustls::ClientConfig::builder()
                .with_safe_defaults()
                .with_custom_certificate_verifier(Arc::new(danger::NoCertificateVerification))
                .with_no_client_auth()
        };

        // TLS session resumption is not supported by CredSSP ([MS-CSSP]
        // section 2.1).
        config.resumption = tokio_rustls::rustls::client::Resumption::disabled();

        let server_name = match tokio_rustls::rustls::ServerName::try_from(server_name) {
            Ok(name) => name,
            // Bare IP addresses are not DNS names.
            Err(_) => match server_name.parse::<std::net::IpAddr>() {
                Ok(address) => tokio_rustls::rustls::ServerName::IpAddress(address),
                Err(_) => return Err(io::Error::other("invalid TLS server name")),
            },
        };

        tokio_rustls::TlsConnector::from(Arc::new(config))
            .connect(server_name, stream)
            .await?
    };

    tls_stream.flush().await?;

    let server_public_key = {
        let cert = tls_stream
            .get_ref()
            .1
            .peer_certificates()
            .and_then(|certificates| certificates.first())
            .ok_or_else(|| io::Error::other("peer certificate is missing"))?;
        extract_tls_server_public_key(&cert.0)?
    };

    Ok((tls_stream, server_public_key))
}

/// Pulls the DER SubjectPublicKey out of an X.509 certificate.
pub fn extract_tls_server_public_key(cert: &[u8]) -> io::Result<Vec<u8>> {
    let cert = x509_cert::Certificate::from_der(cert).map_err(io::Error::other)?;

    let key = cert
        .tbs_certificate
        .subject_public_key_info
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| io::Error::other("subject public key BIT STRING has unused bits"))?
        .to_vec();

    Ok(key)
}

/// Re-encodes a certificate's SubjectPublicKeyInfo, for callers that need
/// the full structure rather than the raw key.
pub fn extract_tls_server_spki(cert: &[u8]) -> io::Result<Vec<u8>> {
    let cert = x509_cert::Certificate::from_der(cert).map_err(io::Error::other)?;

    cert.tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(io::Error::other)
}

mod danger {
    use std::time::SystemTime;

    use tokio_rustls::rustls::client::{ServerCertVerified, ServerCertVerifier};
    use tokio_rustls::rustls::{Certificate, Error, ServerName};

    pub(super) struct NoCertificateVerification;

    impl ServerCertVerifier for NoCertificateVerification {
        fn verify_server_cert(
            &self,
            _end_entity: &Certificate,
            _intermediates: &[Certificate],
            _server_name: &ServerName,
            _scts: &mut dyn Iterator<Item = &[u8]>,
            _ocsp_response: &[u8],
            _now: SystemTime,
        ) -> Result<ServerCertVerified, Error> {
            Ok(ServerCertVerified::assertion())
        }
    }
}
