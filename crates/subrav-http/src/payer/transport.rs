//! The reqwest-backed [`PayeeTransport`]/[`DidAuthIssuer`] pair a
//! [`PayerClient`](subrav_payer::PayerClient) needs to actually reach a
//! payee: discovery, recovery, and commit are plain JSON calls against the
//! paths [`crate::payee::routes`]'s counterpart registers
//! (`/.well-known/nuwa-payment/info`, `/nuwa.recovery`, `/nuwa.commit`).
//! DID-Auth token issuance itself is a further external collaborator this
//! crate does not implement — callers supply their own
//! [`DidAuthIssuer`](subrav_payer::DidAuthIssuer) (a DID-Auth v1 signer keyed
//! the same way [`subrav_codec::signer::SubRavSigner`] is).

use reqwest::Client;

use subrav_payer::PayeeTransport;
use subrav_types::proto::builtin::{CommitRequest, RecoveryResponse};
use subrav_types::proto::{DiscoveryInfo, WireSignedSubRav};
use subrav_types::subrav::SignedSubRAV;

use crate::auth::AUTHORIZATION_HEADER;

#[derive(Debug, thiserror::Error)]
pub enum HttpTransportError {
    #[error("request to payee failed: {0}")]
    Request(#[from] reqwest::Error),
}

/// Talks to one payee host over plain HTTP/JSON.
#[derive(Debug, Clone)]
pub struct HttpPayeeTransport {
    client: Client,
    base_url: String,
}

impl HttpPayeeTransport {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        HttpPayeeTransport { client, base_url: base_url.into() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url.trim_end_matches('/'))
    }
}

impl PayeeTransport for HttpPayeeTransport {
    type Error = HttpTransportError;

    async fn discover(&self) -> Result<DiscoveryInfo, Self::Error> {
        let response = self.client.get(self.url("/.well-known/nuwa-payment/info")).send().await?;
        let response = response.error_for_status()?;
        Ok(response.json::<DiscoveryInfo>().await?)
    }

    async fn recover(&self, auth_token: &str) -> Result<RecoveryResponse, Self::Error> {
        let response = self
            .client
            .post(self.url("/nuwa.recovery"))
            .header(AUTHORIZATION_HEADER, auth_token)
            .send()
            .await?;
        let response = response.error_for_status()?;
        Ok(response.json::<RecoveryResponse>().await?)
    }

    async fn commit(&self, auth_token: &str, signed: &SignedSubRAV) -> Result<(), Self::Error> {
        let body = CommitRequest { signed_sub_rav: WireSignedSubRav::from(signed) };
        let response = self
            .client
            .post(self.url("/nuwa.commit"))
            .header(AUTHORIZATION_HEADER, auth_token)
            .json(&body)
            .send()
            .await?;
        response.error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path_regardless_of_trailing_slash() {
        let with_slash = HttpPayeeTransport::new(Client::new(), "https://payee.example/");
        let without_slash = HttpPayeeTransport::new(Client::new(), "https://payee.example");
        assert_eq!(with_slash.url("/nuwa.recovery"), "https://payee.example/nuwa.recovery");
        assert_eq!(without_slash.url("/nuwa.recovery"), "https://payee.example/nuwa.recovery");
    }
}
