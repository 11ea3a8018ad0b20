// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TLS setup for the printer's MQTT broker.
//!
//! The printer serves a self-signed certificate issued for its serial
//! number, so by default the certificate is not verified. Providing a CA
//! bundle switches to regular verification against that CA.

use std::sync::Arc;

use rumqttc::TlsConfiguration;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, ring};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};

use crate::error::ProtocolError;

/// Accepts any server certificate but still checks handshake signatures.
#[derive(Debug)]
struct AcceptAnyCertificate(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

/// Builds the broker TLS configuration.
///
/// With `ca_pem` the broker certificate is verified against it; without,
/// any certificate is accepted.
///
/// # Errors
///
/// Returns [`ProtocolError::Tls`] if the rustls configuration cannot be built.
pub fn configuration(ca_pem: Option<Vec<u8>>) -> Result<TlsConfiguration, ProtocolError> {
    // Process-wide default for code paths that build their own ClientConfig
    let _ = ring::default_provider().install_default();

    if let Some(ca) = ca_pem {
        return Ok(TlsConfiguration::Simple {
            ca,
            alpn: None,
            client_auth: None,
        });
    }

    let provider = Arc::new(ring::default_provider());
    let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| ProtocolError::Tls(e.to_string()))?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate(provider)))
        .with_no_client_auth();

    Ok(TlsConfiguration::Rustls(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insecure_configuration_builds() {
        assert!(matches!(
            configuration(None),
            Ok(TlsConfiguration::Rustls(_))
        ));
    }

    #[test]
    fn ca_configuration_keeps_pem() {
        let pem = b"-----BEGIN CERTIFICATE-----\n...".to_vec();
        let Ok(TlsConfiguration::Simple { ca, .. }) = configuration(Some(pem.clone())) else {
            panic!("expected a CA-verified configuration");
        };
        assert_eq!(ca, pem);
    }
}
