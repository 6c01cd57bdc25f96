use std::sync::Arc;
use std::time::Duration;

use hyper::body::{Bytes, to_bytes};
use hyper::client::HttpConnector;
use hyper::header::RETRY_AFTER;
use hyper::{Body, Client, Request, StatusCode};
use hyper_rustls::HttpsConnector;
use rustls::{ClientConfig, OwnedTrustAnchor, RootCertStore};
use serde::de::DeserializeOwned;
use tokio::time::timeout;
use webpki_roots::TLS_SERVER_ROOTS;

use crate::traits::{AdapterError, AdapterResult};

pub(crate) type HyperClient = Client<HttpsConnector<HttpConnector>, Body>;

pub(crate) const USER_AGENT: &str = concat!("agent-host/", env!("CARGO_PKG_VERSION"));

#[allow(clippy::unnecessary_wraps)]
pub(crate) fn build_https_client() -> AdapterResult<HyperClient> {
    let mut roots = RootCertStore::empty();
    roots.add_trust_anchors(TLS_SERVER_ROOTS.iter().map(|anchor| {
        OwnedTrustAnchor::from_subject_spki_name_constraints(
            anchor.subject,
            anchor.spki,
            anchor.name_constraints,
        )
    }));

    let config = ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(roots)
        .with_no_client_auth();

    let mut http = HttpConnector::new();
    http.enforce_http(false);

    let connector = HttpsConnector::from((http, Arc::new(config)));

    Ok(Client::builder().build::<_, Body>(connector))
}

/// Sends `request` and returns the body of a successful response.
///
/// `429` maps to [`AdapterError::RateLimited`]; any other non-success status
/// maps to [`AdapterError::Response`].
pub(crate) async fn fetch(
    client: &HyperClient,
    request: Request<Body>,
    limit: Duration,
    provider: &str,
) -> AdapterResult<Bytes> {
    let response = timeout(limit, client.request(request))
        .await
        .map_err(|_| AdapterError::transport(format!("{provider} request timed out")))?
        .map_err(|err| AdapterError::transport(format!("{provider} request failed: {err}")))?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        return Err(AdapterError::RateLimited { retry_after });
    }

    let bytes = to_bytes(response.into_body()).await.map_err(|err| {
        AdapterError::transport(format!("failed to read {provider} response: {err}"))
    })?;

    if !status.is_success() {
        let reason = String::from_utf8_lossy(&bytes).to_string();
        return Err(AdapterError::response(format!(
            "{provider} returned {status}: {reason}"
        )));
    }

    Ok(bytes)
}

pub(crate) fn decode_json<T: DeserializeOwned>(bytes: &[u8], provider: &str) -> AdapterResult<T> {
    serde_json::from_slice(bytes).map_err(|err| {
        AdapterError::response(format!("failed to decode {provider} response: {err}"))
    })
}
