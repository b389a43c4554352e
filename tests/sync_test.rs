//! End-to-end sync runs against mock registry and pool servers

use biosample_sync::{
    run_sync, PoolConfig, PoolGateway, ReconcilerConfig, RegistryClient, RegistryConfig,
    RulesetLoader, SyncError,
};
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ruleset_document() -> Value {
    json!({
        "rule_groups": [
            {
                "name": "standard",
                "rules": [
                    {"Name": "Material", "Required": "mandatory", "Type": "ontology_id", "Allow Multiple": "no"},
                    {"Name": "Project", "Required": "mandatory", "Type": "limited value", "Allow Multiple": "no"}
                ]
            },
            {
                "name": "organism",
                "rules": [
                    {"Name": "Species", "Required": "mandatory", "Type": "ontology_id", "Allow Multiple": "no"},
                    {"Name": "Birth weight", "Required": "optional", "Type": "number",
                     "Valid units": ["kilograms", "grams"], "Allow Multiple": "no"}
                ]
            },
            {
                "name": "specimen from organism",
                "rules": [
                    {"Name": "Organism part", "Required": "mandatory", "Type": "ontology_id", "Allow Multiple": "no"}
                ]
            },
            {"name": "experiment ontology", "rules": []}
        ]
    })
}

fn organism(accession: &str) -> Value {
    json!({
        "accession": accession,
        "characteristics": {
            "material": [{"text": "organism", "ontologyTerms": ["http://purl.obolibrary.org/obo/OBI_0100026"]}],
            "project": [{"text": "IMAGE"}],
            "species": [{"text": "Gallus gallus", "ontologyTerms": ["http://purl.obolibrary.org/obo/NCBITaxon_9031"]}],
            "birth weight": [{"text": "1.2", "unit": "kilograms"}]
        },
        "relationships": [
            {"source": accession, "type": "child of", "target": "SAMEA0000009"}
        ]
    })
}

fn specimen(accession: &str) -> Value {
    json!({
        "accession": accession,
        "characteristics": {
            "material": [{"text": "specimen from organism"}],
            "organism part": [{"text": "liver", "ontologyTerms": ["http://purl.obolibrary.org/obo/UBERON_0002107"]}]
        },
        "relationships": [
            {"source": accession, "type": "derived from", "target": "SAMEA0000001"}
        ]
    })
}

async fn mount_sample(server: &MockServer, accession: &str, etag: &str, body: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/samples/{}", accession)))
        .respond_with(ResponseTemplate::new(200).insert_header("ETag", etag).set_body_json(body))
        .mount(server)
        .await;
}

async fn mount_index(server: &MockServer, category: &str, entries: Value) {
    Mock::given(method("GET"))
        .and(path(format!("/{}/", category)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": entries.as_array().map(Vec::len).unwrap_or(0),
            "next": null,
            "previous": null,
            "results": entries
        })))
        .mount(server)
        .await;
}

async fn registry_server(accessions: &[&str]) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accessions"))
        .and(query_param("page", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {"accessions": accessions},
            "page": {"size": 500, "totalElements": accessions.len(), "totalPages": 1, "number": 0}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ruleset.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ruleset_document()))
        .mount(&server)
        .await;
    server
}

fn clients(registry: &MockServer, pool: &MockServer) -> (RegistryClient, PoolGateway, RulesetLoader) {
    let registry_client = RegistryClient::new(RegistryConfig {
        base_url: registry.uri(),
        ..Default::default()
    })
    .unwrap();
    let gateway = PoolGateway::new(PoolConfig {
        base_url: pool.uri(),
        password: Some("secret".into()),
        ..Default::default()
    })
    .unwrap();
    let loader = RulesetLoader::new(format!("{}/ruleset.json", registry.uri()), 5).unwrap();
    (registry_client, gateway, loader)
}

#[tokio::test]
async fn test_sync_creates_updates_and_ignores() {
    let registry = registry_server(&["SAMEA0000001", "SAMEA0000002", "SAMEA0000003"]).await;
    mount_sample(&registry, "SAMEA0000001", "\"new\"", organism("SAMEA0000001")).await;
    mount_sample(&registry, "SAMEA0000002", "\"changed\"", specimen("SAMEA0000002")).await;
    mount_sample(&registry, "SAMEA0000003", "\"same\"", organism("SAMEA0000003")).await;

    let pool = MockServer::start().await;
    mount_index(&pool, "organism", json!([{"data_source_id": "SAMEA0000003", "etag": "\"same\""}])).await;
    mount_index(&pool, "specimen", json!([{"data_source_id": "SAMEA0000002", "etag": "\"old\""}])).await;

    Mock::given(method("POST"))
        .and(path("/organism/"))
        .and(body_partial_json(json!({
            "data_source_id": "SAMEA0000001",
            "etag": "\"new\"",
            "material": "organism",
            "material_ontology": "http://purl.obolibrary.org/obo/OBI_0100026",
            "project": "IMAGE",
            "organisms": [{
                "species": "Gallus gallus",
                "species_ontology": "http://purl.obolibrary.org/obo/NCBITaxon_9031",
                "birth_weight": "1.2",
                "birth_weight_unit": "kilograms",
                "child_of": ["SAMEA0000009"]
            }]
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&pool)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/specimen/SAMEA0000002"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&pool)
        .await;
    Mock::given(method("POST"))
        .and(path("/specimen/"))
        .and(body_partial_json(json!({
            "data_source_id": "SAMEA0000002",
            "specimens": [{
                "organism_part": "liver",
                "organism_part_ontology": "http://purl.obolibrary.org/obo/UBERON_0002107",
                "derived_from": "SAMEA0000001"
            }]
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&pool)
        .await;

    let (registry_client, gateway, loader) = clients(&registry, &pool);
    let report = run_sync(registry_client, gateway, &loader, ReconcilerConfig::default())
        .await
        .unwrap();

    assert_eq!(report.created, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.ignored, 1);
    assert_eq!(report.errors, 0);
    assert_eq!(
        report.registry_etags.get("SAMEA0000002").map(String::as_str),
        Some("\"changed\"")
    );
}

#[tokio::test]
async fn test_sync_contains_record_failures() {
    let registry = registry_server(&["SAMEA0000001", "SAMEA0000002", "SAMEA0000003"]).await;
    mount_sample(&registry, "SAMEA0000001", "\"e1\"", organism("SAMEA0000001")).await;
    mount_sample(
        &registry,
        "SAMEA0000002",
        "\"e2\"",
        json!({"accession": "SAMEA0000002", "characteristics": {"material": [{"text": "pool of specimens"}]}}),
    )
    .await;
    Mock::given(method("GET"))
        .and(path("/samples/SAMEA0000003"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&registry)
        .await;

    let pool = MockServer::start().await;
    mount_index(&pool, "organism", json!([])).await;
    mount_index(&pool, "specimen", json!([])).await;
    Mock::given(method("POST"))
        .and(path("/organism/"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad record"))
        .expect(1)
        .mount(&pool)
        .await;

    let (registry_client, gateway, loader) = clients(&registry, &pool);
    let report = run_sync(registry_client, gateway, &loader, ReconcilerConfig { batch_size: 2 })
        .await
        .unwrap();

    assert_eq!(report.errors, 3);
    assert_eq!(report.total(), 3);
}

#[tokio::test]
async fn test_sync_fails_without_pool_index() {
    let registry = registry_server(&["SAMEA0000001"]).await;

    let pool = MockServer::start().await;
    mount_index(&pool, "organism", json!([])).await;
    Mock::given(method("GET"))
        .and(path("/specimen/"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&pool)
        .await;

    let (registry_client, gateway, loader) = clients(&registry, &pool);
    let result = run_sync(registry_client, gateway, &loader, ReconcilerConfig::default()).await;

    assert!(matches!(result, Err(SyncError::Server { status: 503, .. })));
}

#[tokio::test]
async fn test_sync_fails_on_incomplete_ruleset() {
    let registry = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/accessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "_embedded": {"accessions": []},
            "page": {"totalElements": 0, "totalPages": 0, "number": 0}
        })))
        .mount(&registry)
        .await;
    Mock::given(method("GET"))
        .and(path("/ruleset.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rule_groups": [{"name": "standard", "rules": []}]
        })))
        .mount(&registry)
        .await;
    let pool = MockServer::start().await;

    let (registry_client, gateway, loader) = clients(&registry, &pool);
    let result = run_sync(registry_client, gateway, &loader, ReconcilerConfig::default()).await;

    assert!(matches!(result, Err(SyncError::Ruleset(_))));
}

#[tokio::test]
async fn test_sync_with_more_pages_than_connections() {
    let accessions: Vec<String> = (1..=6).map(|i| format!("SAMEA000000{}", i)).collect();

    let registry = MockServer::start().await;
    for (number, accession) in accessions.iter().enumerate() {
        Mock::given(method("GET"))
            .and(path("/accessions"))
            .and(query_param("page", number.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "_embedded": {"accessions": [accession]},
                "page": {"size": 1, "totalElements": accessions.len(), "totalPages": accessions.len(), "number": number}
            })))
            .expect(1)
            .mount(&registry)
            .await;
        mount_sample(&registry, accession, "\"e1\"", organism(accession)).await;
    }
    Mock::given(method("GET"))
        .and(path("/ruleset.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(ruleset_document()))
        .mount(&registry)
        .await;

    let pool = MockServer::start().await;
    mount_index(&pool, "organism", json!([])).await;
    mount_index(&pool, "specimen", json!([])).await;
    Mock::given(method("POST"))
        .and(path("/organism/"))
        .respond_with(ResponseTemplate::new(201))
        .expect(6)
        .mount(&pool)
        .await;

    let (_, gateway, loader) = clients(&registry, &pool);
    let registry_client = RegistryClient::new(RegistryConfig {
        base_url: registry.uri(),
        page_size: 1,
        max_connections: 2,
        ..Default::default()
    })
    .unwrap();

    let report = tokio::time::timeout(
        Duration::from_secs(10),
        run_sync(registry_client, gateway, &loader, ReconcilerConfig { batch_size: 1 }),
    )
    .await
    .expect("sync did not finish")
    .unwrap();

    assert_eq!(report.created, 6);
    assert_eq!(report.errors, 0);
    for accession in &accessions {
        assert!(report.registry_etags.contains_key(accession));
    }
}
