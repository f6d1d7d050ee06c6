//! End-to-end relay runs: JSON lines in, HTTP deliveries and results out.

#![allow(clippy::unwrap_used)]

use relay_core::TargetFormat;
use relay_testing::{image_exists, plain_event, ComputeExistsBuilder, MockServer};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use usage_relay::{build_handler, read_batch, relay_batch, Config};

fn config(url: String) -> Config {
    let mut config = Config::default();
    config.handler.settings.url = url;
    config.handler.settings.retries = 1;
    config
}

fn lines(payloads: &[Value]) -> Vec<u8> {
    payloads.iter().map(|p| format!("{p}\n")).collect::<String>().into_bytes()
}

async fn run(config: &Config, payloads: &[Value]) -> Value {
    let input = lines(payloads);
    let mut batch = read_batch(&input[..]).await.unwrap();
    let handler = build_handler(config, CancellationToken::new()).unwrap();
    let results = relay_batch(&handler, &mut batch).await;
    serde_json::to_value(&results).unwrap()
}

#[tokio::test]
async fn successful_delivery_is_reported() {
    let server = MockServer::start().await;
    server.respond("/nova", 201).await;

    let results = run(&config(server.endpoint("/nova")), &[plain_event("instance_create", 1)]).await;

    assert_eq!(results, json!({"1": {"error": false, "code": 201, "message": "Success"}}));
    server.assert_request_count(1).await;
}

#[tokio::test]
async fn rejected_delivery_is_reported() {
    let server = MockServer::start().await;
    server.respond("/nova", 404).await;

    let results = run(&config(server.endpoint("/nova")), &[plain_event("instance_create", 1)]).await;

    assert_eq!(results["1"]["error"], json!(true));
    assert_eq!(results["1"]["code"], json!(404));
    assert!(results["1"]["message"].as_str().unwrap().starts_with("Exceeded retry limit. Error "));
    server.assert_request_count(1).await;
}

#[tokio::test]
async fn verifier_outage_publishes_both_exists_types() {
    let server = MockServer::start().await;
    server.respond("/test/compute.instance.exists.verified", 201).await;
    server.respond("/test/compute.instance.exists", 201).await;
    let mut config = config(server.endpoint("/test/%(event_type)s"));
    config.handler.settings.stacktach_down = true;

    let results = run(&config, &[ComputeExistsBuilder::new(1).build()]).await;

    assert_eq!(results["1"]["error"], json!(false));
    let paths: Vec<String> =
        server.received_requests().await.into_iter().map(|request| request.path).collect();
    assert_eq!(paths, vec!["/test/compute.instance.exists.verified", "/test/compute.instance.exists"]);
}

#[tokio::test]
async fn image_usage_is_published_as_cuf() {
    let server = MockServer::start().await;
    server.respond("/glance", 201).await;
    let mut config = config(server.endpoint("/glance"));
    config.handler.settings.format = TargetFormat::CufUsageXml;
    config.cuf.region = Some("DFW".to_string());
    config.cuf.data_center = Some("DFW1".to_string());

    let results = run(&config, &[image_exists("image-msg")]).await;

    assert_eq!(results["image-msg"]["error"], json!(false));
    let bodies: Vec<String> =
        server.received_requests().await.iter().map(|request| request.body_text()).collect();
    assert_eq!(bodies.len(), 2);
    assert!(bodies[0].contains("serviceCode=\"Glance\""));
    assert!(bodies[0].contains("startTime=\"2013-09-02 16:08:10\""));
    assert!(bodies[1].contains("endTime=\"2013-09-02 16:08:46\""));
}

#[tokio::test]
async fn mixed_batch_reports_every_identified_message() {
    let server = MockServer::start().await;
    server.respond("/nova", 201).await;

    let payloads = [
        plain_event("instance_create", "ok"),
        json!({"message_id": "no-type"}),
        json!({"event_type": "no-id"}),
    ];
    let results = run(&config(server.endpoint("/nova")), &payloads).await;

    let results = results.as_object().unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results["ok"]["code"], json!(201));
    assert_eq!(results["no-type"]["code"], json!(0));
    server.assert_request_count(1).await;
}
