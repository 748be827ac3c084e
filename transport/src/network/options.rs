#![deny(unsafe_code)]
//! Named session options
//!
//! Options are a small name/value side channel through which the messaging
//! client hands material to the transport. Only the client certificate is
//! recognized; it is forwarded into the TLS layer on the next `open`.

/// Option name carrying client-certificate PEM (certificate chain followed by
/// its private key)
pub const OPTION_CLIENT_CERTIFICATE: &str = "x509certificate";

/// Snapshot of the options held by an adapter
#[derive(Debug, Clone, Default)]
pub struct OptionSet {
    client_certificate: Option<Vec<u8>>,
}

impl OptionSet {
    /// Client identity PEM, when one was set
    pub fn client_certificate(&self) -> Option<&[u8]> {
        self.client_certificate.as_deref()
    }

    pub(crate) fn set_client_certificate(&mut self, pem: &[u8]) {
        self.client_certificate = Some(pem.to_vec());
    }
}
