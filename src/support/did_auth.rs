//! A single-party demo stand-in for DID-Auth v1 (spec §1, §6), which this
//! workspace treats as an external collaborator on both the issuing
//! ([`DidAuthIssuer`]) and verifying ([`DidAuthVerifier`]) side. Real DID-Auth
//! binds a token to a payer's signing key; this demo just round-trips the
//! payer DID and the URL/method the token is scoped to through a delimited
//! string, so the two demo binaries can exercise the authenticated
//! `nuwa.*` routes against each other without a real DID stack.

use subrav_http::DidAuthVerifier;
use subrav_payer::DidAuthIssuer;

const DELIMITER: char = '|';

#[derive(Debug, Clone)]
pub struct DemoDidAuth {
    payer_did: String,
}

impl DemoDidAuth {
    pub fn new(payer_did: impl Into<String>) -> Self {
        DemoDidAuth { payer_did: payer_did.into() }
    }
}

impl DidAuthIssuer for DemoDidAuth {
    type Error = std::convert::Infallible;

    async fn issue(&self, url: &str, method: &str) -> Result<String, Self::Error> {
        Ok(format!("{}{DELIMITER}{}{DELIMITER}{}", self.payer_did, url, method))
    }
}

impl DidAuthVerifier for DemoDidAuth {
    type Error = std::convert::Infallible;

    async fn verify(&self, token: &str, url: &str, method: &str) -> Result<Option<String>, Self::Error> {
        let mut parts = token.splitn(3, DELIMITER);
        let (Some(did), Some(token_url), Some(token_method)) = (parts.next(), parts.next(), parts.next()) else {
            return Ok(None);
        };
        if token_url == url && token_method.eq_ignore_ascii_case(method) {
            Ok(Some(did.to_string()))
        } else {
            Ok(None)
        }
    }
}
