//! Blocking session over a shared HTTP agent.
//!
//! # Design
//! `Session` pairs a `KnowShowGoClient` with one `ureq::Agent` opened at
//! construction and kept for the session's lifetime. Each operation is
//! `build_*` → `execute` → `parse_*`; nothing is cached or retried.
//!
//! The agent keeps its connection pool behind an `Arc`, so `Session` is
//! `Send + Sync` and cheap to clone. Clones share the pool, and concurrent
//! calls from several threads are fine.

use std::fmt;

use serde::Serialize;
use serde_json::Value;
use ureq::{Agent, RequestBuilder};

use crate::client::{parse_json, KnowShowGoClient};
use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{
    ConceptSearch, Direction, JsonObject, NewAssociation, NewConcept, NewNode, NewPrototype,
    OrmRegistration,
};

/// Blocking KnowShowGo API client.
#[derive(Clone)]
pub struct Session {
    client: KnowShowGoClient,
    agent: Agent,
    user_agent: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.client.base_url())
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::with_config(ClientConfig::default())
    }
}

impl Session {
    pub fn new(base_url: &str) -> Self {
        Self::with_config(ClientConfig::new(base_url))
    }

    pub fn with_config(config: ClientConfig) -> Self {
        // 4xx/5xx come back as data so `parse_*` owns status interpretation.
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(config.timeout)
            .build()
            .new_agent();
        Self {
            client: KnowShowGoClient::new(&config.base_url),
            agent,
            user_agent: config.user_agent,
        }
    }

    /// The sans-IO builder/parser this session drives.
    pub fn client(&self) -> &KnowShowGoClient {
        &self.client
    }

    /// Apply query pairs, headers and the user agent to either request typestate.
    fn prepare<B>(
        &self,
        builder: RequestBuilder<B>,
        query: &[(String, String)],
        headers: &[(String, String)],
    ) -> RequestBuilder<B> {
        let builder = query
            .iter()
            .fold(builder, |b, (k, v)| b.query(k.as_str(), v.as_str()));
        headers
            .iter()
            .fold(builder, |b, (k, v)| b.header(k.as_str(), v.as_str()))
            .header("user-agent", self.user_agent.as_str())
    }

    /// Perform one HTTP exchange. Error statuses are returned as data.
    pub fn execute(&self, req: HttpRequest) -> Result<HttpResponse, ApiError> {
        let HttpRequest {
            method,
            url,
            query,
            headers,
            body,
        } = req;

        let result = match method {
            HttpMethod::Get => self.prepare(self.agent.get(url.as_str()), &query, &headers).call(),
            HttpMethod::Post => {
                let builder = self.prepare(self.agent.post(url.as_str()), &query, &headers);
                match body {
                    Some(body) => builder.send(body.as_bytes()),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.inspect_err(|e| {
            tracing::warn!(%method, %url, error = %e, "knowshowgo transport failure");
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_string(), v.to_string()))
            })
            .collect();
        // Read raw bytes with no size cap so the status survives any body.
        let bytes = response
            .body_mut()
            .with_config()
            .limit(u64::MAX)
            .read_to_vec()?;
        let body = if status >= 400 {
            String::from_utf8_lossy(&bytes).into_owned()
        } else {
            String::from_utf8(bytes).map_err(|e| ApiError::DeserializationError(e.to_string()))?
        };

        if status >= 400 {
            tracing::warn!(%method, %url, status, "knowshowgo error status");
        } else {
            tracing::debug!(%method, %url, status, "knowshowgo request");
        }

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    /// Generic request primitive: send `endpoint` with optional query pairs
    /// and JSON body, fail on 4xx/5xx, return the parsed JSON body.
    pub fn request<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<Value, ApiError> {
        let req = self.client.build_request(method, endpoint, query, body)?;
        parse_json(self.execute(req)?)
    }

    pub fn create_prototype(&self, input: &NewPrototype) -> Result<String, ApiError> {
        let req = self.client.build_create_prototype(input)?;
        self.client.parse_create_prototype(self.execute(req)?)
    }

    pub fn get_prototype(&self, uuid: &str) -> Result<JsonObject, ApiError> {
        let req = self.client.build_get_prototype(uuid);
        self.client.parse_get_prototype(self.execute(req)?)
    }

    pub fn create_concept(&self, input: &NewConcept) -> Result<String, ApiError> {
        let req = self.client.build_create_concept(input)?;
        self.client.parse_create_concept(self.execute(req)?)
    }

    pub fn get_concept(&self, uuid: &str) -> Result<JsonObject, ApiError> {
        let req = self.client.build_get_concept(uuid);
        self.client.parse_get_concept(self.execute(req)?)
    }

    /// Semantic search. Returns the server's `results` list as-is.
    pub fn search_concepts(&self, input: &ConceptSearch) -> Result<Vec<Value>, ApiError> {
        let req = self.client.build_search_concepts(input)?;
        self.client.parse_search_concepts(self.execute(req)?)
    }

    pub fn add_association(&self, input: &NewAssociation) -> Result<(), ApiError> {
        let req = self.client.build_add_association(input)?;
        self.client.parse_add_association(self.execute(req)?)
    }

    pub fn get_associations(&self, uuid: &str, direction: Direction) -> Result<Vec<Value>, ApiError> {
        let req = self.client.build_get_associations(uuid, direction);
        self.client.parse_get_associations(self.execute(req)?)
    }

    pub fn create_node_with_document(&self, input: &NewNode) -> Result<String, ApiError> {
        let req = self.client.build_create_node_with_document(input)?;
        self.client.parse_create_node_with_document(self.execute(req)?)
    }

    pub fn update_node_embedding(&self, uuid: &str) -> Result<(), ApiError> {
        let req = self.client.build_update_node_embedding(uuid);
        self.client.parse_update_node_embedding(self.execute(req)?)
    }

    pub fn register_prototype(&self, input: &OrmRegistration) -> Result<(), ApiError> {
        let req = self.client.build_register_prototype(input)?;
        self.client.parse_register_prototype(self.execute(req)?)
    }

    pub fn create_instance(
        &self,
        prototype_name: &str,
        properties: &JsonObject,
    ) -> Result<JsonObject, ApiError> {
        let req = self.client.build_create_instance(prototype_name, properties)?;
        self.client.parse_create_instance(self.execute(req)?)
    }

    pub fn get_instance(&self, prototype_name: &str, uuid: &str) -> Result<JsonObject, ApiError> {
        let req = self.client.build_get_instance(prototype_name, uuid);
        self.client.parse_get_instance(self.execute(req)?)
    }

    pub fn health_check(&self) -> Result<JsonObject, ApiError> {
        let req = self.client.build_health_check();
        self.client.parse_health_check(self.execute(req)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn session_is_send_and_sync() {
        assert_send_sync::<Session>();
    }

    #[test]
    fn default_session_targets_local_endpoint() {
        let session = Session::default();
        assert_eq!(session.client().base_url(), "http://localhost:3000");
    }

    #[test]
    fn new_strips_trailing_slash() {
        let session = Session::new("http://graph.internal:8080/");
        assert_eq!(session.client().base_url(), "http://graph.internal:8080");
    }

    /// Serve exactly one canned HTTP response on a random port.
    fn serve_once(response: &'static [u8]) -> String {
        use std::io::{Read, Write};

        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            stream.write_all(response).unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn error_status_with_binary_body_keeps_status() {
        let base = serve_once(
            b"HTTP/1.1 502 Bad Gateway\r\nContent-Length: 2\r\nConnection: close\r\n\r\n\xff\xfe",
        );
        let err = Session::new(&base).get_prototype("x").unwrap_err();
        assert!(matches!(err, ApiError::HttpError { status: 502, .. }));
        assert_eq!(err.status(), Some(502));
    }

    #[test]
    fn success_with_binary_body_is_a_deserialization_error() {
        let base = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n\xff\xfe",
        );
        let err = Session::new(&base).health_check().unwrap_err();
        assert!(matches!(err, ApiError::DeserializationError(_)));
    }

    #[test]
    fn connection_refused_is_a_transport_error() {
        // Bind then drop to get a port nothing listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let session = Session::new(&format!("http://127.0.0.1:{port}"));
        let err = session.health_check().unwrap_err();
        assert!(matches!(err, ApiError::Transport(_)));
        assert_eq!(err.status(), None);
    }
}
