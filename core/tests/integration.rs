//! End-to-end tests against the live mock server.
//!
//! # Design
//! Starts the mock server on a random port, then drives every `Session`
//! operation over real HTTP. Validates that request building, the ureq
//! transport and response parsing agree with an actual server.

use knowshowgo_core::{
    ApiError, ClientConfig, ConceptSearch, Direction, HttpMethod, JsonObject, NewAssociation,
    NewConcept, NewNode, NewPrototype, OrmRegistration, Session,
};
use serde_json::json;

/// Start the mock server on a background runtime and return its base URL.
fn start_server() -> String {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run(listener).await
        })
        .unwrap();
    });

    format!("http://{addr}")
}

fn object(value: serde_json::Value) -> JsonObject {
    value.as_object().unwrap().clone()
}

#[test]
fn knowledge_graph_lifecycle() {
    let session = Session::new(&format!("{}/", start_server()));

    // Step 1: health.
    let health = session.health_check().unwrap();
    assert_eq!(health["status"], "ok");

    // Step 2: prototype with only a name; optional fields go out as null.
    let person = session
        .create_prototype(&NewPrototype {
            description: Some("A human individual".to_string()),
            labels: vec!["person".to_string(), "human".to_string()],
            ..NewPrototype::new("Person")
        })
        .unwrap();
    let fetched = session.get_prototype(&person).unwrap();
    assert_eq!(fetched["uuid"], person.as_str());
    assert_eq!(fetched["name"], "Person");
    assert_eq!(fetched["labels"], json!(["person", "human"]));
    assert_eq!(fetched["context"], serde_json::Value::Null);

    // Step 3: concepts, including a second version.
    let john = session
        .create_concept(&NewConcept::new(
            &person,
            object(json!({"name": "John Doe", "email": "john@example.com"})),
        ))
        .unwrap();
    let john_v2 = session
        .create_concept(&NewConcept {
            previous_version_uuid: Some(john.clone()),
            ..NewConcept::new(&person, object(json!({"name": "John Q. Doe"})))
        })
        .unwrap();
    let jane = session
        .create_concept(&NewConcept::new(&person, object(json!({"name": "Jane Roe"}))))
        .unwrap();

    let concept = session.get_concept(&john_v2).unwrap();
    assert_eq!(concept["version"], 2);
    assert_eq!(concept["previousVersionUuid"], john.as_str());
    assert_eq!(concept["jsonObj"]["name"], "John Q. Doe");

    // Step 4: search.
    let results = session
        .search_concepts(&ConceptSearch::new("jane roe").top_k(5))
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["uuid"], jane.as_str());

    let results = session
        .search_concepts(&ConceptSearch::new("doe").prototype_filter(&person))
        .unwrap();
    assert_eq!(results.len(), 2);

    // Step 5: associations.
    session
        .add_association(&NewAssociation::new(&john, &jane, "relatesTo"))
        .unwrap();
    session
        .add_association(&NewAssociation::new(&jane, &john_v2, "knows").strength(0.4))
        .unwrap();

    let out = session.get_associations(&john, Direction::Out).unwrap();
    assert_eq!(out.len(), 1);
    assert_eq!(out[0]["toConceptUuid"], jane.as_str());
    assert_eq!(out[0]["strength"], 1.0);

    let incoming = session.get_associations(&jane, Direction::In).unwrap();
    assert_eq!(incoming.len(), 1);
    assert_eq!(incoming[0]["relationType"], "relatesTo");

    let both = session.get_associations(&jane, Direction::default()).unwrap();
    assert_eq!(both.len(), 2);

    // Step 6: document nodes.
    let node = session
        .create_node_with_document(&NewNode {
            summary: Some("Meeting notes".to_string()),
            tags: vec!["meeting".to_string()],
            prototype_uuid: Some(person.clone()),
            ..NewNode::new("Standup 2024-05-01")
        })
        .unwrap();
    session.update_node_embedding(&node).unwrap();
    session
        .add_association(&NewAssociation::new(&node, &john, "mentions"))
        .unwrap();
    assert_eq!(session.get_associations(&node, Direction::Out).unwrap().len(), 1);

    // Step 7: ORM.
    session
        .register_prototype(&OrmRegistration::new("Company"))
        .unwrap();
    let created = session
        .create_instance("Company", &object(json!({"name": "Acme", "employees": 12})))
        .unwrap();
    let uuid = created["uuid"].as_str().unwrap().to_string();
    assert_eq!(created["properties"]["name"], "Acme");

    let instance = session.get_instance("Company", &uuid).unwrap();
    assert_eq!(instance, created);

    // Step 8: counts via the generic request primitive.
    let health = session
        .request::<serde_json::Value>(HttpMethod::Get, "/health", &[], None)
        .unwrap();
    assert_eq!(health["concepts"], 4);
    assert_eq!(health["nodes"], 1);
}

#[test]
fn reserved_characters_in_path_segments_reach_the_server() {
    let session = Session::new(&start_server());

    session
        .register_prototype(&OrmRegistration::new("Job Title"))
        .unwrap();
    let created = session
        .create_instance("Job Title", &object(json!({"title": "Engineer"})))
        .unwrap();
    assert_eq!(created["prototypeName"], "Job Title");
    let uuid = created["uuid"].as_str().unwrap();
    assert_eq!(session.get_instance("Job Title", uuid).unwrap(), created);

    // The whole id reaches the server instead of being cut at `#`.
    match session.get_prototype("a#b").unwrap_err() {
        ApiError::NotFound { body } => assert!(body.contains("a#b"), "{body}"),
        other => panic!("expected NotFound, got {other:?}"),
    }
    let err = session.get_prototype("a b").unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[test]
fn missing_resources_fail_with_404() {
    let session = Session::new(&start_server());

    let err = session.get_prototype("missing").unwrap_err();
    assert!(matches!(err, ApiError::NotFound { .. }));
    assert_eq!(err.status(), Some(404));

    let err = session.get_concept("missing").unwrap_err();
    assert_eq!(err.status(), Some(404));

    let err = session.update_node_embedding("missing").unwrap_err();
    assert_eq!(err.status(), Some(404));

    let err = session.get_instance("Nobody", "missing").unwrap_err();
    assert_eq!(err.status(), Some(404));

    let err = session
        .add_association(&NewAssociation::new("a", "b", "relatesTo"))
        .unwrap_err();
    assert_eq!(err.status(), Some(404));
}

#[test]
fn validation_failures_surface_status() {
    let session = Session::new(&start_server());

    // Missing required `name` field: axum rejects the body with 422.
    let err = session
        .request(HttpMethod::Post, "/api/prototypes", &[], Some(&json!({"labels": []})))
        .unwrap_err();
    assert!(matches!(err, ApiError::HttpError { status: 422, .. }));
}

#[test]
fn sessions_can_be_shared_across_threads() {
    let config = ClientConfig::new(&start_server())
        .with_timeout(std::time::Duration::from_secs(10));
    let session = Session::with_config(config);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let session = session.clone();
            std::thread::spawn(move || {
                session
                    .create_prototype(&NewPrototype::new(format!("Kind{i}")))
                    .unwrap()
            })
        })
        .collect();
    let mut uuids: Vec<String> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    uuids.sort();
    uuids.dedup();
    assert_eq!(uuids.len(), 4);

    let health = session.health_check().unwrap();
    assert_eq!(health["prototypes"], 4);
}
