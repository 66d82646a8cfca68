use std::time::Duration;

use anyhow::Error;
use reqwest::blocking::Client;
use serde::Deserialize;
use thiserror::Error;

use crate::danbooru::io::Login;

/// The search endpoint queried for the top-scored post of a tag.
pub(crate) const SEARCH_ENDPOINT: &str = "https://danbooru.donmai.us/posts.json";

/// Field set requested from the API; the candidate image URLs plus the id
/// for diagnostics.
const SEARCH_FIELDS: &str = "large_file_url,file_url,preview_file_url,id";

/// User agent used when no username is configured. A distinctive UA keeps
/// the requests from being classified as a scripted attack.
const DEFAULT_USER_AGENT: &str = "ArtistManager/HighRes_v7";

/// Timeout for a single search request.
const SEARCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Errors raised by a single search call. The strict/relaxed fallback policy
/// lives in the caller; this type only reports what one request did.
#[derive(Debug, Error)]
pub(crate) enum SearchError {
    #[error("network connection failed (DNS or connection refused)")]
    Network,
    #[error("request timed out")]
    Timeout,
    #[error("API returned non-JSON data (possibly an interception page)")]
    ProtocolViolation,
    #[error("search result was empty (tag may not match)")]
    NoMatch,
    #[error("record found but it carries no image URL (id: {id:?})")]
    NoUsableAsset { id: Option<i64> },
    #[error("API {code}: {reason}")]
    Remote { code: u16, reason: &'static str },
}

/// Human-readable reasons for the status codes the API is known to return.
pub(crate) fn reason_for_status(code: u16) -> &'static str {
    match code {
        200 => "request succeeded",
        204 => "request succeeded (no content)",
        400 => "bad request (malformed parameters)",
        401 => "authentication failed (check username/API key)",
        403 => "access denied (insufficient permissions or banned)",
        404 => "not found",
        410 => "pagination limit reached (gone)",
        420 => "invalid record",
        422 => "resource locked or failed validation",
        423 => "resource already exists",
        424 => "invalid parameters",
        429 => "rate limited (too many requests, slow down)",
        500 => "internal server error",
        502 => "bad gateway (server overloaded)",
        503 => "service unavailable (downbooru)",
        _ => "unknown error",
    }
}

/// The subset of a post entry we ask the API for.
#[derive(Debug, Deserialize)]
pub(crate) struct PostEntry {
    #[serde(default)]
    pub(crate) id: Option<i64>,
    #[serde(default)]
    pub(crate) large_file_url: Option<String>,
    #[serde(default)]
    pub(crate) file_url: Option<String>,
    #[serde(default)]
    pub(crate) preview_file_url: Option<String>,
}

/// Issues tag-filtered search queries against the remote API and extracts the
/// best available image URL from the ranked response fields.
pub(crate) struct SearchClient {
    client: Client,
    login: Login,
    endpoint: String,
}

impl SearchClient {
    /// Creates a client against the production search endpoint.
    pub(crate) fn new(login: Login) -> Result<Self, Error> {
        Self::with_endpoint(login, SEARCH_ENDPOINT)
    }

    /// Creates a client against an explicit endpoint.
    pub(crate) fn with_endpoint(login: Login, endpoint: &str) -> Result<Self, Error> {
        let client = Client::builder()
            .user_agent(user_agent_for(&login))
            .build()?;

        Ok(SearchClient {
            client,
            login,
            endpoint: endpoint.to_string(),
        })
    }

    /// The underlying HTTP client, shared with the downloader so both reuse
    /// the same connection pool and user agent.
    pub(crate) fn http_client(&self) -> &Client {
        &self.client
    }

    /// Searches for the top-scored post of `name` under the given rating
    /// filter (empty string for no filter) and returns its best image URL.
    pub(crate) fn search(&self, name: &str, rating: &str) -> Result<String, SearchError> {
        let tags = if rating.is_empty() {
            format!("{name} order:score")
        } else {
            format!("{name} {rating} order:score")
        };
        trace!("searching for tags {:?}", tags);

        let mut request = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("tags", tags.as_str()),
                ("limit", "1"),
                ("only", SEARCH_FIELDS),
            ])
            .timeout(SEARCH_TIMEOUT);
        if !self.login.is_empty() {
            request = request.basic_auth(self.login.username(), Some(self.login.api_key()));
        }

        let response = request.send().map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SearchError::Remote {
                code: status.as_u16(),
                reason: reason_for_status(status.as_u16()),
            });
        }

        let posts: Vec<PostEntry> = response
            .json()
            .map_err(|_| SearchError::ProtocolViolation)?;
        let Some(post) = posts.into_iter().next() else {
            return Err(SearchError::NoMatch);
        };

        let id = post.id;
        [post.large_file_url, post.file_url, post.preview_file_url]
            .into_iter()
            .flatten()
            .find(|url| !url.is_empty())
            .ok_or(SearchError::NoUsableAsset { id })
    }
}

fn classify_transport(err: reqwest::Error) -> SearchError {
    if err.is_timeout() {
        SearchError::Timeout
    } else {
        SearchError::Network
    }
}

fn user_agent_for(login: &Login) -> String {
    if login.username().is_empty() {
        DEFAULT_USER_AGENT.to_string()
    } else {
        format!("ArtistManager/2.0 ({})", login.username())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::danbooru::testutil::{StubResponse, StubServer};

    fn client_for(server: &StubServer) -> SearchClient {
        SearchClient::with_endpoint(Login::default(), &server.url("/posts.json")).unwrap()
    }

    #[test]
    fn empty_result_is_no_match() {
        let server = StubServer::serve(vec![StubResponse::json("200 OK", "[]")]);
        let client = client_for(&server);

        assert!(matches!(client.search("bob", "rating:general"), Err(SearchError::NoMatch)));
        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].contains("rating%3Ageneral"));
        assert!(requests[0].contains("limit=1"));
    }

    #[test]
    fn rating_filter_collapses_when_empty() {
        let server = StubServer::serve(vec![StubResponse::json("200 OK", "[]")]);
        let client = client_for(&server);

        let _ = client.search("bob", "");
        let requests = server.requests();
        assert!(requests[0].contains("tags=bob+order%3Ascore"));
    }

    #[test]
    fn url_fields_are_ranked() {
        let body = r#"[{"id":7,"large_file_url":"http://x/large.jpg","file_url":"http://x/full.jpg","preview_file_url":"http://x/prev.jpg"}]"#;
        let server = StubServer::serve(vec![StubResponse::json("200 OK", body)]);
        let client = client_for(&server);

        assert_eq!(client.search("bob", "").unwrap(), "http://x/large.jpg");
    }

    #[test]
    fn empty_url_fields_are_skipped() {
        let body = r#"[{"id":7,"large_file_url":"","file_url":"http://x/full.jpg"}]"#;
        let server = StubServer::serve(vec![StubResponse::json("200 OK", body)]);
        let client = client_for(&server);

        assert_eq!(client.search("bob", "").unwrap(), "http://x/full.jpg");
    }

    #[test]
    fn record_without_urls_is_unusable() {
        let server = StubServer::serve(vec![StubResponse::json("200 OK", r#"[{"id":42}]"#)]);
        let client = client_for(&server);

        assert!(matches!(
            client.search("bob", ""),
            Err(SearchError::NoUsableAsset { id: Some(42) })
        ));
    }

    #[test]
    fn non_json_body_is_a_protocol_violation() {
        let server = StubServer::serve(vec![StubResponse::new(
            "200 OK",
            "text/html",
            b"<html>challenge page</html>".to_vec(),
        )]);
        let client = client_for(&server);

        assert!(matches!(client.search("bob", ""), Err(SearchError::ProtocolViolation)));
    }

    #[test]
    fn remote_status_maps_to_reason_table() {
        let server = StubServer::serve(vec![StubResponse::json("429 Too Many Requests", "[]")]);
        let client = client_for(&server);

        let err = client.search("bob", "rating:general").unwrap_err();
        assert!(matches!(err, SearchError::Remote { code: 429, .. }));
        assert!(err.to_string().contains("rate limited"));
        assert_eq!(reason_for_status(418), "unknown error");
    }

    #[test]
    fn connection_refused_is_a_network_error() {
        // Bind-then-drop guarantees nothing is listening on the port.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let client =
            SearchClient::with_endpoint(Login::default(), &format!("http://{address}/posts.json"))
                .unwrap();
        assert!(matches!(client.search("bob", ""), Err(SearchError::Network)));
    }
}
