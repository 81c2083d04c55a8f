//! Client identity and group authorization.
//!
//! Clients carry their identity in the certificate Common Name, formatted as
//! `user@group`. The group half is matched against the configured allowlist.

use std::collections::HashSet;

use rustls::pki_types::CertificateDer;
use x509_parser::prelude::{FromDer, X509Certificate};

/// Identity extracted from a client certificate Common Name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub user: String,
    pub group: String,
}

impl ClientIdentity {
    /// Parse a Common Name of the form `user@group`. Anything else, including
    /// empty halves or extra separators, is rejected.
    pub(crate) fn parse(common_name: &str) -> Option<Self> {
        let parts: Vec<&str> = common_name.split('@').collect();
        if parts.len() != 2 || parts[0].is_empty() || parts[1].is_empty() {
            return None;
        }

        Some(Self {
            user: parts[0].to_string(),
            group: parts[1].to_string(),
        })
    }
}

/// Scan the presented certificate chain for an identity whose group is in
/// `authorized_groups`.
///
/// Every certificate is inspected; the first identity with an authorized
/// group wins. A certificate that cannot be parsed, or whose CN does not
/// carry a well-formed `user@group` identity, rejects the whole connection.
pub fn authorize_peer(
    certificates: &[CertificateDer<'_>],
    authorized_groups: &HashSet<String>,
) -> Option<ClientIdentity> {
    for certificate in certificates {
        let Ok((_, parsed)) = X509Certificate::from_der(certificate.as_ref()) else {
            return None;
        };

        let common_name = parsed
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())?;

        let identity = ClientIdentity::parse(common_name)?;
        if authorized_groups.contains(&identity.group) {
            return Some(identity);
        }
    }

    None
}
