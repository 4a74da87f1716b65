//! Request payloads for the KnowShowGo API.
//!
//! # Design
//! Field names are snake_case in Rust and camelCase on the wire. Optional
//! scalars and vectors are always serialized, as `null` when absent, while
//! defaulted containers (`labels`, `tags`, `metadata`, ...) go out empty.
//! Responses are not modelled here: the server owns their shape, so the
//! client hands back `JsonObject` or raw `serde_json::Value` lists.
//!
//! Payloads also derive `Deserialize`, with the same wire defaults as their
//! constructors, so they can be loaded from JSON fixtures and config files.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A JSON object as returned by the full-body operations.
pub type JsonObject = serde_json::Map<String, Value>;

pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;
pub const DEFAULT_STRENGTH: f64 = 1.0;

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_similarity_threshold() -> f64 {
    DEFAULT_SIMILARITY_THRESHOLD
}

fn default_strength() -> f64 {
    DEFAULT_STRENGTH
}

/// Payload for `POST /api/prototypes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPrototype {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f64>>,
    #[serde(default)]
    pub parent_prototype_uuids: Option<Vec<String>>,
}

impl NewPrototype {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Payload for `POST /api/concepts`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConcept {
    pub prototype_uuid: String,
    pub json_obj: JsonObject,
    #[serde(default)]
    pub embedding: Option<Vec<f64>>,
    /// Set to create a new version of an existing concept.
    #[serde(default)]
    pub previous_version_uuid: Option<String>,
}

impl NewConcept {
    pub fn new(prototype_uuid: impl Into<String>, json_obj: JsonObject) -> Self {
        Self {
            prototype_uuid: prototype_uuid.into(),
            json_obj,
            ..Self::default()
        }
    }
}

/// Payload for `POST /api/concepts/search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConceptSearch {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
    /// Restrict matches to concepts of this prototype uuid.
    #[serde(default)]
    pub prototype_filter: Option<String>,
}

impl ConceptSearch {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: DEFAULT_TOP_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            prototype_filter: None,
        }
    }

    pub fn top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn similarity_threshold(mut self, threshold: f64) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn prototype_filter(mut self, prototype_uuid: impl Into<String>) -> Self {
        self.prototype_filter = Some(prototype_uuid.into());
        self
    }
}

/// Payload for `POST /api/associations`: a directed, typed, weighted edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAssociation {
    pub from_concept_uuid: String,
    pub to_concept_uuid: String,
    pub relation_type: String,
    #[serde(default = "default_strength")]
    pub strength: f64,
}

impl NewAssociation {
    pub fn new(
        from_concept_uuid: impl Into<String>,
        to_concept_uuid: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            from_concept_uuid: from_concept_uuid.into(),
            to_concept_uuid: to_concept_uuid.into(),
            relation_type: relation_type.into(),
            strength: DEFAULT_STRENGTH,
        }
    }

    pub fn strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }
}

/// Which edges `GET /api/associations/{uuid}` returns, relative to the concept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    In,
    Out,
    #[default]
    Both,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::In => "in",
            Direction::Out => "out",
            Direction::Both => "both",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid direction `{0}`, expected one of: in, out, both")]
pub struct ParseDirectionError(pub String);

impl FromStr for Direction {
    type Err = ParseDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(Direction::In),
            "out" => Ok(Direction::Out),
            "both" => Ok(Direction::Both),
            other => Err(ParseDirectionError(other.to_string())),
        }
    }
}

/// Payload for `POST /api/nodes`: a concept carrying document metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNode {
    pub label: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: JsonObject,
    /// Association-like mappings; their shape is owned by the server.
    #[serde(default)]
    pub associations: Vec<Value>,
    #[serde(default)]
    pub prototype_uuid: Option<String>,
}

impl NewNode {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }
}

/// Payload for `POST /api/orm/register`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrmRegistration {
    pub prototype_name: String,
    #[serde(default)]
    pub options: JsonObject,
}

impl OrmRegistration {
    pub fn new(prototype_name: impl Into<String>) -> Self {
        Self {
            prototype_name: prototype_name.into(),
            options: JsonObject::new(),
        }
    }
}

/// Payload for `POST /api/orm/{prototypeName}/create`.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct NewInstance<'a> {
    pub properties: &'a JsonObject,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_prototype_sends_nulls_and_empty_labels() {
        let json = serde_json::to_value(NewPrototype::new("Person")).unwrap();
        assert_eq!(
            json,
            json!({
                "name": "Person",
                "description": null,
                "context": null,
                "labels": [],
                "embedding": null,
                "parentPrototypeUuids": null
            })
        );
    }

    #[test]
    fn concept_search_defaults() {
        let search = ConceptSearch::new("q");
        assert_eq!(search.top_k, 10);
        assert_eq!(search.similarity_threshold, 0.7);
        assert!(search.prototype_filter.is_none());
    }

    #[test]
    fn concept_search_fills_defaults_when_deserialized() {
        let search: ConceptSearch = serde_json::from_str(r#"{"query":"q"}"#).unwrap();
        assert_eq!(search, ConceptSearch::new("q"));
    }

    #[test]
    fn association_strength_defaults_to_one() {
        let assoc: NewAssociation = serde_json::from_str(
            r#"{"fromConceptUuid":"a","toConceptUuid":"b","relationType":"relatesTo"}"#,
        )
        .unwrap();
        assert_eq!(assoc.strength, 1.0);
        assert_eq!(assoc, NewAssociation::new("a", "b", "relatesTo"));
    }

    #[test]
    fn direction_parses_known_values_only() {
        assert_eq!("in".parse::<Direction>().unwrap(), Direction::In);
        assert_eq!("out".parse::<Direction>().unwrap(), Direction::Out);
        assert_eq!("both".parse::<Direction>().unwrap(), Direction::Both);
        let err = "sideways".parse::<Direction>().unwrap_err();
        assert_eq!(err, ParseDirectionError("sideways".to_string()));
        assert_eq!(Direction::default(), Direction::Both);
    }

    #[test]
    fn new_node_defaults_containers() {
        let json = serde_json::to_value(NewNode::new("Doc")).unwrap();
        assert_eq!(json["tags"], json!([]));
        assert_eq!(json["metadata"], json!({}));
        assert_eq!(json["associations"], json!([]));
        assert_eq!(json["summary"], Value::Null);
        assert_eq!(json["prototypeUuid"], Value::Null);
    }

    #[test]
    fn orm_registration_sends_empty_options() {
        let json = serde_json::to_value(OrmRegistration::new("Person")).unwrap();
        assert_eq!(json, json!({"prototypeName": "Person", "options": {}}));
    }
}
