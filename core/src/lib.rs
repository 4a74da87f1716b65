//! Blocking Rust client for the KnowShowGo knowledge-graph REST API.
//!
//! # Overview
//! Prototypes, concepts, associations, document nodes and ORM instances all
//! live on the server; this crate only turns method calls into HTTP requests
//! and JSON responses back into values.
//!
//! # Design
//! - `KnowShowGoClient` is sans-IO: `build_*` produces an `HttpRequest`,
//!   `parse_*` consumes an `HttpResponse`. It holds only `base_url`.
//! - `Session` owns one `ureq::Agent` and runs each operation end to end.
//! - Request payloads are typed (`NewPrototype`, `ConceptSearch`, ...);
//!   responses stay as JSON because their shape belongs to the server.
//!
//! ```no_run
//! use knowshowgo_core::{ConceptSearch, NewPrototype, Session};
//!
//! let session = Session::new("http://localhost:3000");
//! let person = session.create_prototype(&NewPrototype::new("Person"))?;
//! let hits = session.search_concepts(&ConceptSearch::new("person named John").top_k(5))?;
//! # let _ = (person, hits);
//! # Ok::<(), knowshowgo_core::ApiError>(())
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod session;
pub mod types;

pub use client::KnowShowGoClient;
pub use config::{ClientConfig, DEFAULT_BASE_URL};
pub use error::ApiError;
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use session::Session;
pub use types::{
    ConceptSearch, Direction, JsonObject, NewAssociation, NewConcept, NewNode, NewPrototype,
    OrmRegistration, ParseDirectionError,
};
