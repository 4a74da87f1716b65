use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

/// Length of the vectors produced by `POST /api/nodes/{uuid}/embedding`.
pub const EMBEDDING_DIMENSIONS: usize = 8;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prototype {
    pub uuid: String,
    pub name: String,
    pub description: Option<String>,
    pub context: Option<String>,
    pub labels: Vec<String>,
    pub embedding: Option<Vec<f64>>,
    pub parent_prototype_uuids: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Concept {
    pub uuid: String,
    pub prototype_uuid: String,
    pub json_obj: Map<String, Value>,
    pub embedding: Option<Vec<f64>>,
    pub previous_version_uuid: Option<String>,
    pub version: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Association {
    pub from_concept_uuid: String,
    pub to_concept_uuid: String,
    pub relation_type: String,
    pub strength: f64,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub uuid: String,
    pub label: String,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
    pub associations: Vec<Value>,
    pub prototype_uuid: Option<String>,
    pub embedding: Option<Vec<f64>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrototype {
    pub name: String,
    pub description: Option<String>,
    pub context: Option<String>,
    pub labels: Option<Vec<String>>,
    pub embedding: Option<Vec<f64>>,
    pub parent_prototype_uuids: Option<Vec<String>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConcept {
    pub prototype_uuid: String,
    pub json_obj: Map<String, Value>,
    pub embedding: Option<Vec<f64>>,
    pub previous_version_uuid: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchConcepts {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f64,
    pub prototype_filter: Option<String>,
}

fn default_top_k() -> usize {
    10
}

fn default_threshold() -> f64 {
    0.7
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssociation {
    pub from_concept_uuid: String,
    pub to_concept_uuid: String,
    pub relation_type: String,
    #[serde(default = "default_strength")]
    pub strength: f64,
}

fn default_strength() -> f64 {
    1.0
}

#[derive(Deserialize)]
pub struct AssociationParams {
    pub direction: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNode {
    pub label: String,
    pub summary: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<Map<String, Value>>,
    pub associations: Option<Vec<Value>>,
    pub prototype_uuid: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPrototype {
    pub prototype_name: String,
    pub options: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub struct CreateInstance {
    pub properties: Map<String, Value>,
}

#[derive(Default)]
pub struct Store {
    pub prototypes: HashMap<String, Prototype>,
    pub concepts: HashMap<String, Concept>,
    pub associations: Vec<Association>,
    pub nodes: HashMap<String, Node>,
    /// ORM prototype name -> prototype uuid.
    pub orm: HashMap<String, String>,
}

impl Store {
    /// Concepts and document nodes can both be association endpoints.
    fn has_endpoint(&self, uuid: &str) -> bool {
        self.concepts.contains_key(uuid) || self.nodes.contains_key(uuid)
    }
}

pub type Db = Arc<RwLock<Store>>;

/// Error response: a status and `{"error": message}`.
#[derive(Debug)]
pub struct Rejection(StatusCode, String);

impl Rejection {
    fn not_found(kind: &str, uuid: &str) -> Self {
        Rejection(StatusCode::NOT_FOUND, format!("{kind} {uuid} not found"))
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

pub fn app() -> Router {
    let db: Db = Arc::new(RwLock::new(Store::default()));
    Router::new()
        .route("/health", get(health))
        .route("/api/prototypes", post(create_prototype))
        .route("/api/prototypes/{uuid}", get(get_prototype))
        .route("/api/concepts", post(create_concept))
        .route("/api/concepts/search", post(search_concepts))
        .route("/api/concepts/{uuid}", get(get_concept))
        .route("/api/associations", post(add_association))
        .route("/api/associations/{uuid}", get(get_associations))
        .route("/api/nodes", post(create_node))
        .route("/api/nodes/{uuid}/embedding", post(update_node_embedding))
        .route("/api/orm/register", post(register_prototype))
        .route("/api/orm/{name}/create", post(create_instance))
        .route("/api/orm/{name}/{uuid}", get(get_instance))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn new_uuid() -> String {
    Uuid::new_v4().to_string()
}

async fn health(State(db): State<Db>) -> Json<Value> {
    let store = db.read().await;
    Json(json!({
        "status": "ok",
        "prototypes": store.prototypes.len(),
        "concepts": store.concepts.len(),
        "associations": store.associations.len(),
        "nodes": store.nodes.len(),
    }))
}

// --- prototypes ---

async fn create_prototype(
    State(db): State<Db>,
    Json(input): Json<CreatePrototype>,
) -> Result<(StatusCode, Json<Value>), Rejection> {
    let mut store = db.write().await;
    let parents = input.parent_prototype_uuids.unwrap_or_default();
    if let Some(missing) = parents.iter().find(|p| !store.prototypes.contains_key(*p)) {
        return Err(Rejection::not_found("parent prototype", missing));
    }
    let prototype = Prototype {
        uuid: new_uuid(),
        name: input.name,
        description: input.description,
        context: input.context,
        labels: input.labels.unwrap_or_default(),
        embedding: input.embedding,
        parent_prototype_uuids: parents,
    };
    let uuid = prototype.uuid.clone();
    tracing::debug!(%uuid, name = %prototype.name, "prototype created");
    store.prototypes.insert(uuid.clone(), prototype);
    Ok((StatusCode::CREATED, Json(json!({ "uuid": uuid }))))
}

async fn get_prototype(
    State(db): State<Db>,
    Path(uuid): Path<String>,
) -> Result<Json<Prototype>, Rejection> {
    let store = db.read().await;
    store
        .prototypes
        .get(&uuid)
        .cloned()
        .map(Json)
        .ok_or_else(|| Rejection::not_found("prototype", &uuid))
}

// --- concepts ---

fn insert_concept(store: &mut Store, input: CreateConcept) -> Result<Concept, Rejection> {
    if !store.prototypes.contains_key(&input.prototype_uuid) {
        return Err(Rejection::not_found("prototype", &input.prototype_uuid));
    }
    let version = match &input.previous_version_uuid {
        Some(prev) => {
            let prev = store
                .concepts
                .get(prev)
                .ok_or_else(|| Rejection::not_found("concept", prev))?;
            prev.version + 1
        }
        None => 1,
    };
    let concept = Concept {
        uuid: new_uuid(),
        prototype_uuid: input.prototype_uuid,
        json_obj: input.json_obj,
        embedding: input.embedding,
        previous_version_uuid: input.previous_version_uuid,
        version,
    };
    store.concepts.insert(concept.uuid.clone(), concept.clone());
    Ok(concept)
}

async fn create_concept(
    State(db): State<Db>,
    Json(input): Json<CreateConcept>,
) -> Result<(StatusCode, Json<Value>), Rejection> {
    let mut store = db.write().await;
    let concept = insert_concept(&mut store, input)?;
    tracing::debug!(uuid = %concept.uuid, version = concept.version, "concept created");
    Ok((StatusCode::CREATED, Json(json!({ "uuid": concept.uuid }))))
}

async fn get_concept(
    State(db): State<Db>,
    Path(uuid): Path<String>,
) -> Result<Json<Concept>, Rejection> {
    let store = db.read().await;
    store
        .concepts
        .get(&uuid)
        .cloned()
        .map(Json)
        .ok_or_else(|| Rejection::not_found("concept", &uuid))
}

/// Fraction of query terms that occur in the concept's JSON text.
pub fn term_similarity(query: &str, concept: &Concept) -> f64 {
    let terms: Vec<String> = query.split_whitespace().map(str::to_lowercase).collect();
    if terms.is_empty() {
        return 0.0;
    }
    let text = Value::Object(concept.json_obj.clone())
        .to_string()
        .to_lowercase();
    let hits = terms.iter().filter(|t| text.contains(t.as_str())).count();
    hits as f64 / terms.len() as f64
}

async fn search_concepts(
    State(db): State<Db>,
    Json(input): Json<SearchConcepts>,
) -> Json<Value> {
    let store = db.read().await;
    let mut scored: Vec<(f64, &Concept)> = store
        .concepts
        .values()
        .filter(|c| {
            input
                .prototype_filter
                .as_ref()
                .map_or(true, |p| &c.prototype_uuid == p)
        })
        .map(|c| (term_similarity(&input.query, c), c))
        .filter(|(score, _)| *score > 0.0 && *score >= input.similarity_threshold)
        .collect();
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.uuid.cmp(&b.1.uuid)));
    scored.truncate(input.top_k);

    let results: Vec<Value> = scored
        .into_iter()
        .map(|(score, c)| {
            json!({
                "uuid": c.uuid,
                "prototypeUuid": c.prototype_uuid,
                "jsonObj": c.json_obj,
                "similarity": score,
            })
        })
        .collect();
    Json(json!({ "results": results }))
}

// --- associations ---

async fn add_association(
    State(db): State<Db>,
    Json(input): Json<CreateAssociation>,
) -> Result<(StatusCode, Json<Value>), Rejection> {
    let mut store = db.write().await;
    for uuid in [&input.from_concept_uuid, &input.to_concept_uuid] {
        if !store.has_endpoint(uuid) {
            return Err(Rejection::not_found("concept", uuid));
        }
    }
    store.associations.push(Association {
        from_concept_uuid: input.from_concept_uuid,
        to_concept_uuid: input.to_concept_uuid,
        relation_type: input.relation_type,
        strength: input.strength,
    });
    Ok((StatusCode::CREATED, Json(json!({ "success": true }))))
}

async fn get_associations(
    State(db): State<Db>,
    Path(uuid): Path<String>,
    Query(params): Query<AssociationParams>,
) -> Result<Json<Value>, Rejection> {
    let direction = params.direction.unwrap_or_else(|| "both".to_string());
    let (outgoing, incoming) = match direction.as_str() {
        "in" => (false, true),
        "out" => (true, false),
        "both" => (true, true),
        other => {
            return Err(Rejection(
                StatusCode::BAD_REQUEST,
                format!("invalid direction: {other}"),
            ))
        }
    };
    let store = db.read().await;
    if !store.has_endpoint(&uuid) {
        return Err(Rejection::not_found("concept", &uuid));
    }
    let associations: Vec<&Association> = store
        .associations
        .iter()
        .filter(|a| {
            (outgoing && a.from_concept_uuid == uuid) || (incoming && a.to_concept_uuid == uuid)
        })
        .collect();
    Ok(Json(json!({ "associations": associations })))
}

// --- nodes ---

async fn create_node(
    State(db): State<Db>,
    Json(input): Json<CreateNode>,
) -> Result<(StatusCode, Json<Value>), Rejection> {
    let mut store = db.write().await;
    if let Some(proto) = &input.prototype_uuid {
        if !store.prototypes.contains_key(proto) {
            return Err(Rejection::not_found("prototype", proto));
        }
    }
    let node = Node {
        uuid: new_uuid(),
        label: input.label,
        summary: input.summary,
        tags: input.tags.unwrap_or_default(),
        metadata: input.metadata.unwrap_or_default(),
        associations: input.associations.unwrap_or_default(),
        prototype_uuid: input.prototype_uuid,
        embedding: None,
    };
    let uuid = node.uuid.clone();
    store.nodes.insert(uuid.clone(), node);
    Ok((StatusCode::CREATED, Json(json!({ "uuid": uuid }))))
}

/// Deterministic bag-of-words vector over the node's label, summary and tags.
pub fn node_embedding(node: &Node) -> Vec<f64> {
    let mut vector = vec![0.0; EMBEDDING_DIMENSIONS];
    let text = std::iter::once(node.label.as_str())
        .chain(node.summary.as_deref())
        .chain(node.tags.iter().map(String::as_str));
    for token in text.flat_map(str::split_whitespace) {
        let bucket = token
            .to_lowercase()
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_add(b as usize));
        vector[bucket % EMBEDDING_DIMENSIONS] += 1.0;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

async fn update_node_embedding(
    State(db): State<Db>,
    Path(uuid): Path<String>,
) -> Result<Json<Value>, Rejection> {
    let mut store = db.write().await;
    let node = store
        .nodes
        .get_mut(&uuid)
        .ok_or_else(|| Rejection::not_found("node", &uuid))?;
    let embedding = node_embedding(node);
    node.embedding = Some(embedding);
    Ok(Json(json!({
        "success": true,
        "uuid": uuid,
        "dimensions": EMBEDDING_DIMENSIONS,
    })))
}

// --- ORM ---

async fn register_prototype(
    State(db): State<Db>,
    Json(input): Json<RegisterPrototype>,
) -> Json<Value> {
    let mut store = db.write().await;
    let name = input.prototype_name;
    let existing = store.orm.get(&name).cloned().or_else(|| {
        store
            .prototypes
            .values()
            .find(|p| p.name == name)
            .map(|p| p.uuid.clone())
    });
    let prototype_uuid = match existing {
        Some(uuid) => uuid,
        None => {
            let options = input.options.unwrap_or_default();
            let prototype = Prototype {
                uuid: new_uuid(),
                name: name.clone(),
                description: options
                    .get("description")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                context: None,
                labels: vec![name.to_lowercase()],
                embedding: None,
                parent_prototype_uuids: Vec::new(),
            };
            let uuid = prototype.uuid.clone();
            store.prototypes.insert(uuid.clone(), prototype);
            uuid
        }
    };
    tracing::debug!(%name, %prototype_uuid, "ORM prototype registered");
    store.orm.insert(name, prototype_uuid.clone());
    Json(json!({ "success": true, "prototypeUuid": prototype_uuid }))
}

fn instance_json(name: &str, concept: &Concept) -> Value {
    json!({
        "uuid": concept.uuid,
        "prototypeName": name,
        "prototypeUuid": concept.prototype_uuid,
        "properties": concept.json_obj,
    })
}

async fn create_instance(
    State(db): State<Db>,
    Path(name): Path<String>,
    Json(input): Json<CreateInstance>,
) -> Result<(StatusCode, Json<Value>), Rejection> {
    let mut store = db.write().await;
    let prototype_uuid = store
        .orm
        .get(&name)
        .cloned()
        .ok_or_else(|| Rejection::not_found("registered prototype", &name))?;
    let concept = insert_concept(
        &mut store,
        CreateConcept {
            prototype_uuid,
            json_obj: input.properties,
            embedding: None,
            previous_version_uuid: None,
        },
    )?;
    Ok((StatusCode::CREATED, Json(instance_json(&name, &concept))))
}

async fn get_instance(
    State(db): State<Db>,
    Path((name, uuid)): Path<(String, String)>,
) -> Result<Json<Value>, Rejection> {
    let store = db.read().await;
    let prototype_uuid = store
        .orm
        .get(&name)
        .ok_or_else(|| Rejection::not_found("registered prototype", &name))?;
    store
        .concepts
        .get(&uuid)
        .filter(|c| &c.prototype_uuid == prototype_uuid)
        .map(|c| Json(instance_json(&name, c)))
        .ok_or_else(|| Rejection::not_found("instance", &uuid))
}
