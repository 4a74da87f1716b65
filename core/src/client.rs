//! Stateless HTTP request builder and response parser for the KnowShowGo API.
//!
//! # Design
//! `KnowShowGoClient` holds only a `base_url` and carries no mutable state
//! between calls. Each operation is split into a `build_*` method that
//! produces an `HttpRequest` and a `parse_*` method that consumes an
//! `HttpResponse`. `Session` glues the two together over a real connection;
//! anything else (a test, a replay log, a different transport) can drive
//! them directly.

use percent_encoding::{utf8_percent_encode, AsciiSet, PercentEncode, CONTROLS};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::types::{
    ConceptSearch, Direction, JsonObject, NewAssociation, NewConcept, NewInstance, NewNode,
    NewPrototype, OrmRegistration,
};

/// Stateless request builder / response parser for the KnowShowGo API.
#[derive(Debug, Clone)]
pub struct KnowShowGoClient {
    base_url: String,
}

impl KnowShowGoClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Generic request primitive: `base_url + endpoint`, query pairs, and an
    /// optional JSON body.
    pub fn build_request<B: Serialize + ?Sized>(
        &self,
        method: HttpMethod,
        endpoint: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<HttpRequest, ApiError> {
        let (headers, body) = match body {
            Some(body) => {
                let body = serde_json::to_string(body)
                    .map_err(|e| ApiError::SerializationError(e.to_string()))?;
                (
                    vec![("content-type".to_string(), "application/json".to_string())],
                    Some(body),
                )
            }
            None => (Vec::new(), None),
        };
        Ok(HttpRequest {
            method,
            url: format!("{}{endpoint}", self.base_url),
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            headers,
            body,
        })
    }

    fn get(&self, endpoint: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: format!("{}{endpoint}", self.base_url),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    fn post<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<HttpRequest, ApiError> {
        self.build_request(HttpMethod::Post, endpoint, &[], Some(body))
    }

    // --- prototypes ---

    pub fn build_create_prototype(&self, input: &NewPrototype) -> Result<HttpRequest, ApiError> {
        self.post("/api/prototypes", input)
    }

    pub fn parse_create_prototype(&self, response: HttpResponse) -> Result<String, ApiError> {
        parse_uuid(response)
    }

    pub fn build_get_prototype(&self, uuid: &str) -> HttpRequest {
        self.get(&format!("/api/prototypes/{}", segment(uuid)))
    }

    pub fn parse_get_prototype(&self, response: HttpResponse) -> Result<JsonObject, ApiError> {
        parse_json(response)
    }

    // --- concepts ---

    pub fn build_create_concept(&self, input: &NewConcept) -> Result<HttpRequest, ApiError> {
        self.post("/api/concepts", input)
    }

    pub fn parse_create_concept(&self, response: HttpResponse) -> Result<String, ApiError> {
        parse_uuid(response)
    }

    pub fn build_get_concept(&self, uuid: &str) -> HttpRequest {
        self.get(&format!("/api/concepts/{}", segment(uuid)))
    }

    pub fn parse_get_concept(&self, response: HttpResponse) -> Result<JsonObject, ApiError> {
        parse_json(response)
    }

    pub fn build_search_concepts(&self, input: &ConceptSearch) -> Result<HttpRequest, ApiError> {
        self.post("/api/concepts/search", input)
    }

    pub fn parse_search_concepts(&self, response: HttpResponse) -> Result<Vec<Value>, ApiError> {
        parse_list_field(response, "results")
    }

    // --- associations ---

    pub fn build_add_association(&self, input: &NewAssociation) -> Result<HttpRequest, ApiError> {
        self.post("/api/associations", input)
    }

    pub fn parse_add_association(&self, response: HttpResponse) -> Result<(), ApiError> {
        parse_empty(response)
    }

    pub fn build_get_associations(&self, uuid: &str, direction: Direction) -> HttpRequest {
        let mut req = self.get(&format!("/api/associations/{}", segment(uuid)));
        req.query
            .push(("direction".to_string(), direction.as_str().to_string()));
        req
    }

    pub fn parse_get_associations(&self, response: HttpResponse) -> Result<Vec<Value>, ApiError> {
        parse_list_field(response, "associations")
    }

    // --- nodes with documents ---

    pub fn build_create_node_with_document(&self, input: &NewNode) -> Result<HttpRequest, ApiError> {
        self.post("/api/nodes", input)
    }

    pub fn parse_create_node_with_document(&self, response: HttpResponse) -> Result<String, ApiError> {
        parse_uuid(response)
    }

    /// Asks the server to recompute a node's embedding. The request has no body.
    pub fn build_update_node_embedding(&self, uuid: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Post,
            ..self.get(&format!("/api/nodes/{}/embedding", segment(uuid)))
        }
    }

    pub fn parse_update_node_embedding(&self, response: HttpResponse) -> Result<(), ApiError> {
        parse_empty(response)
    }

    // --- ORM ---

    pub fn build_register_prototype(&self, input: &OrmRegistration) -> Result<HttpRequest, ApiError> {
        self.post("/api/orm/register", input)
    }

    pub fn parse_register_prototype(&self, response: HttpResponse) -> Result<(), ApiError> {
        parse_empty(response)
    }

    pub fn build_create_instance(
        &self,
        prototype_name: &str,
        properties: &JsonObject,
    ) -> Result<HttpRequest, ApiError> {
        self.post(
            &format!("/api/orm/{}/create", segment(prototype_name)),
            &NewInstance { properties },
        )
    }

    pub fn parse_create_instance(&self, response: HttpResponse) -> Result<JsonObject, ApiError> {
        parse_json(response)
    }

    pub fn build_get_instance(&self, prototype_name: &str, uuid: &str) -> HttpRequest {
        self.get(&format!("/api/orm/{}/{}", segment(prototype_name), segment(uuid)))
    }

    pub fn parse_get_instance(&self, response: HttpResponse) -> Result<JsonObject, ApiError> {
        parse_json(response)
    }

    // --- health ---

    pub fn build_health_check(&self) -> HttpRequest {
        self.get("/health")
    }

    pub fn parse_health_check(&self, response: HttpResponse) -> Result<JsonObject, ApiError> {
        parse_json(response)
    }
}

/// Characters escaped inside a single path segment, `/` and `%` included.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Percent-encode a uuid or prototype name for use as one path segment.
fn segment(value: &str) -> PercentEncode<'_> {
    utf8_percent_encode(value, PATH_SEGMENT)
}

/// Map 4xx/5xx statuses to the appropriate `ApiError` variant.
fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if !response.is_error() {
        return Ok(());
    }
    if response.status == 404 {
        return Err(ApiError::NotFound {
            body: response.body.clone(),
        });
    }
    Err(ApiError::HttpError {
        status: response.status,
        body: response.body.clone(),
    })
}

/// Check the status, then deserialize the whole body.
pub fn parse_json<T: DeserializeOwned>(response: HttpResponse) -> Result<T, ApiError> {
    check_status(&response)?;
    serde_json::from_str(&response.body).map_err(|e| ApiError::DeserializationError(e.to_string()))
}

fn parse_uuid(response: HttpResponse) -> Result<String, ApiError> {
    let mut body: JsonObject = parse_json(response)?;
    match body.remove("uuid") {
        Some(Value::String(uuid)) => Ok(uuid),
        _ => Err(ApiError::MissingField("uuid")),
    }
}

fn parse_list_field(response: HttpResponse, field: &'static str) -> Result<Vec<Value>, ApiError> {
    let mut body: JsonObject = parse_json(response)?;
    match body.remove(field) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(ApiError::MissingField(field)),
    }
}

/// For operations without a return value. An empty body is accepted; anything
/// else must still be JSON.
fn parse_empty(response: HttpResponse) -> Result<(), ApiError> {
    check_status(&response)?;
    if response.body.trim().is_empty() {
        return Ok(());
    }
    serde_json::from_str::<Value>(&response.body)
        .map(drop)
        .map_err(|e| ApiError::DeserializationError(e.to_string()))
}
