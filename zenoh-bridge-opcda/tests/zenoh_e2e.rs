//! End-to-end tests over live Zenoh sessions.
//!
//! Note: Zenoh requires a multi-thread tokio runtime.
//! Each test uses a unique key prefix to avoid interference.

use std::sync::Arc;
use std::time::Duration;

use dabridge_common::{Format, Quality, Reading, TagPath, TagValue};
use dabridge_engine::{BridgeHealth, DaSource, Sink};
use zenoh_bridge_opcda::publish::{WireMessage, ZenohPublisher};
use zenoh_bridge_opcda::serve::ServedTarget;
use zenoh_bridge_opcda::sim::SimulatedSource;

/// Generate a unique test prefix to avoid test interference.
fn unique_prefix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    format!("test_opcda_{}", nanos)
}

async fn open_session() -> Arc<zenoh::Session> {
    let config = zenoh::Config::default();
    Arc::new(
        zenoh::open(config)
            .await
            .expect("Failed to open Zenoh session"),
    )
}

fn tag(name: &str) -> TagPath {
    TagPath::new(name).unwrap()
}

/// Publisher sink round-trip: key is `{prefix}/{tag}`, payload carries
/// value and lowercase quality.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_publish_roundtrip() {
    let prefix = unique_prefix();
    let session = open_session().await;

    let subscriber = session
        .declare_subscriber(format!("{}/**", prefix))
        .await
        .expect("Failed to create subscriber");

    tokio::time::sleep(Duration::from_millis(100)).await;

    let publisher = ZenohPublisher::new(session.clone(), prefix.clone(), Format::Json);
    let reading = Reading::new(tag("line1/temp"), TagValue::Number(123.45), Quality::Good);
    publisher.deliver(&reading).await.expect("Failed to publish");

    let sample = tokio::time::timeout(Duration::from_secs(5), subscriber.recv_async())
        .await
        .expect("Timeout waiting for message")
        .expect("Failed to receive message");

    assert_eq!(
        sample.key_expr().as_str(),
        format!("{}/line1/temp", prefix)
    );

    let message: WireMessage = serde_json::from_slice(&sample.payload().to_bytes()).unwrap();
    assert_eq!(message.value, TagValue::Number(123.45));
    assert_eq!(message.quality, Quality::Good);

    drop(subscriber);
    session.close().await.expect("Failed to close session");
}

/// Served attributes answer client reads with the latest delivered value.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_served_attribute_read() {
    let prefix = unique_prefix();
    let session = open_session().await;
    let source: Arc<dyn DaSource> = Arc::new(SimulatedSource::new("sim", 3));

    let target = ServedTarget::serve(
        session.clone(),
        &prefix,
        &[tag("line1/temp")],
        source,
        true,
        Arc::new(BridgeHealth::new()),
    )
    .await
    .expect("Failed to start served target");

    target
        .deliver(&Reading::new(
            tag("line1/temp"),
            TagValue::Number(21.5),
            Quality::Good,
        ))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let replies = session
        .get(format!("{}/line1/temp", prefix))
        .await
        .expect("Failed to query");

    let reply = tokio::time::timeout(Duration::from_secs(5), replies.recv_async())
        .await
        .expect("Timeout waiting for reply")
        .expect("Failed to receive reply");

    let sample = reply.result().expect("Expected a sample reply");
    let served: serde_json::Value = serde_json::from_slice(&sample.payload().to_bytes()).unwrap();
    assert_eq!(served["value"], serde_json::json!(21.5));
    assert_eq!(served["quality"], serde_json::json!("good"));

    target.close().await.unwrap();
    session.close().await.expect("Failed to close session");
}

/// A write accepted by the source lands in the served table and is
/// acknowledged to the caller.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_writeback_accepted() {
    let prefix = unique_prefix();
    let session = open_session().await;
    let sim = Arc::new(SimulatedSource::new("sim", 5));
    let source: Arc<dyn DaSource> = sim.clone();
    let setpoint = tag("sim/line1/temp_setpoint");

    let target = ServedTarget::serve(
        session.clone(),
        &prefix,
        &[setpoint.clone()],
        source,
        false,
        Arc::new(BridgeHealth::new()),
    )
    .await
    .expect("Failed to start served target");

    tokio::time::sleep(Duration::from_millis(100)).await;

    let replies = session
        .get(format!("{}/@/write/{}", prefix, setpoint))
        .payload(serde_json::to_vec(&serde_json::json!(25.5)).unwrap())
        .await
        .expect("Failed to send write query");

    let reply = tokio::time::timeout(Duration::from_secs(5), replies.recv_async())
        .await
        .expect("Timeout waiting for write reply")
        .expect("Failed to receive write reply");

    assert!(reply.result().is_ok(), "write should be acknowledged");

    // Source confirmed first, then the served table.
    let on_source = sim.read(&setpoint).await.unwrap();
    assert_eq!(on_source.value, TagValue::Number(25.5));

    let served = target.store().get(&setpoint).unwrap();
    assert_eq!(served.value, TagValue::Number(25.5));

    target.close().await.unwrap();
    session.close().await.expect("Failed to close session");
}

/// A write the source refuses leaves the served value untouched and
/// reports the rejection to the caller.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_writeback_rejected() {
    let prefix = unique_prefix();
    let session = open_session().await;
    let source: Arc<dyn DaSource> = Arc::new(SimulatedSource::new("sim", 5));
    let readonly_tag = tag("sim/line1/temp");

    let target = ServedTarget::serve(
        session.clone(),
        &prefix,
        &[readonly_tag.clone()],
        source,
        false,
        Arc::new(BridgeHealth::new()),
    )
    .await
    .expect("Failed to start served target");

    target
        .deliver(&Reading::new(
            readonly_tag.clone(),
            TagValue::Number(21.0),
            Quality::Good,
        ))
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;

    let replies = session
        .get(format!("{}/@/write/{}", prefix, readonly_tag))
        .payload(serde_json::to_vec(&serde_json::json!(99.0)).unwrap())
        .await
        .expect("Failed to send write query");

    let reply = tokio::time::timeout(Duration::from_secs(5), replies.recv_async())
        .await
        .expect("Timeout waiting for write reply")
        .expect("Failed to receive write reply");

    assert!(reply.result().is_err(), "write should be rejected");

    // Previously served value is unchanged.
    let served = target.store().get(&readonly_tag).unwrap();
    assert_eq!(served.value, TagValue::Number(21.0));

    target.close().await.unwrap();
    session.close().await.expect("Failed to close session");
}

/// With readonly set, the write endpoint does not exist: a write query
/// finds no queryable and simply drains with no replies.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_readonly_write_endpoint_absent() {
    let prefix = unique_prefix();
    let session = open_session().await;
    let source: Arc<dyn DaSource> = Arc::new(SimulatedSource::new("sim", 5));
    let setpoint = tag("sim/line1/temp_setpoint");

    let target = ServedTarget::serve(
        session.clone(),
        &prefix,
        &[setpoint.clone()],
        source,
        true,
        Arc::new(BridgeHealth::new()),
    )
    .await
    .expect("Failed to start served target");

    tokio::time::sleep(Duration::from_millis(100)).await;

    let replies = session
        .get(format!("{}/@/write/{}", prefix, setpoint))
        .payload(serde_json::to_vec(&serde_json::json!(25.5)).unwrap())
        .await
        .expect("Failed to send write query");

    // No queryable serves the write namespace; the query completes with
    // no replies at all (it is not rejected at runtime, it is absent).
    let outcome = tokio::time::timeout(Duration::from_secs(2), replies.recv_async()).await;
    assert!(
        outcome.is_err() || outcome.unwrap().is_err(),
        "readonly target must not answer write queries"
    );

    // And the served value is untouched.
    let served = target.store().get(&setpoint).unwrap();
    assert!(served.value.is_null());

    target.close().await.unwrap();
    session.close().await.expect("Failed to close session");
}
