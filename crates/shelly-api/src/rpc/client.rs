// RPC-over-HTTP client
//
// Wraps `reqwest::Client` with Shelly-specific URL construction
// (`/rpc/<Method>?id=<n>`) and response classification. Endpoint methods
// live in sibling modules as inherent impls to keep this file focused on
// transport mechanics.

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Error body Shelly devices return with non-2xx statuses.
#[derive(serde::Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: Option<String>,
}

/// Longest body excerpt carried inside an error.
const BODY_PREVIEW: usize = 200;

/// Raw HTTP client for one device's RPC interface.
///
/// Cheap to clone; the underlying `reqwest::Client` is reference counted.
#[derive(Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Option<(String, SecretString)>,
}

impl RpcClient {
    /// Create a client for `host` using the shared transport settings.
    ///
    /// `host` may be a bare address (`192.168.1.20`, `plug.lan:8080`) or a
    /// full URL; bare addresses are reached over plain HTTP.
    pub fn new(host: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let base_url = base_url_for(host)?;
        let http = transport.build_client()?;
        Ok(Self::with_client(http, base_url))
    }

    /// Create a client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            credentials: None,
        }
    }

    /// Attach credentials sent as HTTP basic auth on every request.
    pub fn with_credentials(mut self, username: String, password: SecretString) -> Self {
        self.credentials = Some((username, password));
        self
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/rpc/{method}`, with `?id={id}` for component methods.
    pub(crate) fn method_url(&self, method: &str, id: Option<u32>) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let mut url = Url::parse(&format!("{base}/rpc/{method}"))?;
        if let Some(id) = id {
            url.query_pairs_mut().append_pair("id", &id.to_string());
        }
        Ok(url)
    }

    // ── Request helpers ──────────────────────────────────────────────

    /// Invoke `method` and decode the response body into `T`.
    pub async fn call<T: DeserializeOwned>(&self, method: &str, id: Option<u32>) -> Result<T, Error> {
        let url = self.method_url(method, id)?;
        debug!(%url, "GET");

        let mut builder = self.http.get(url.clone());
        if let Some((user, password)) = &self.credentials {
            builder = builder.basic_auth(user, Some(password.expose_secret()));
        }
        let resp = builder.send().await.map_err(Error::Transport)?;

        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;
        trace!(%url, status = status.as_u16(), bytes = body.len(), "response received");

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(Error::Authentication {
                url: url.to_string(),
            });
        }

        if !status.is_success() {
            if let Ok(rpc) = serde_json::from_str::<RpcErrorBody>(&body) {
                return Err(Error::Rpc {
                    method: method.to_owned(),
                    code: rpc.code,
                    message: rpc.message.unwrap_or_default(),
                });
            }
            return Err(Error::Status {
                status: status.as_u16(),
                url: url.to_string(),
                body: preview(&body).to_owned(),
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: format!("{method}: {e} (body preview: {:?})", preview(&body)),
            body,
        })
    }
}

/// Normalise a configured host into the device base URL.
pub fn base_url_for(host: &str) -> Result<Url, Error> {
    let host = host.trim();
    if host.contains("://") {
        Ok(Url::parse(host)?)
    } else {
        Ok(Url::parse(&format!("http://{host}"))?)
    }
}

fn preview(body: &str) -> &str {
    let mut end = body.len().min(BODY_PREVIEW);
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn client(host: &str) -> RpcClient {
        RpcClient::with_client(reqwest::Client::new(), base_url_for(host).unwrap())
    }

    #[test]
    fn bare_host_gets_http_scheme() {
        let url = base_url_for("192.168.1.20").unwrap();
        assert_eq!(url.as_str(), "http://192.168.1.20/");
    }

    #[test]
    fn explicit_scheme_and_port_are_kept() {
        let url = base_url_for("https://plug.lan:8443").unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.port(), Some(8443));
    }

    #[test]
    fn method_url_appends_component_id() {
        let c = client("10.0.0.5");
        assert_eq!(
            c.method_url("Switch.GetStatus", Some(3)).unwrap().as_str(),
            "http://10.0.0.5/rpc/Switch.GetStatus?id=3"
        );
        assert_eq!(
            c.method_url("Shelly.GetStatus", None).unwrap().as_str(),
            "http://10.0.0.5/rpc/Shelly.GetStatus"
        );
    }

    #[test]
    fn preview_respects_char_boundaries() {
        let body = "é".repeat(150);
        let p = preview(&body);
        assert!(p.len() <= BODY_PREVIEW);
        assert!(body.starts_with(p));
    }
}
