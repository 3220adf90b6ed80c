mod common;

use common::{native_stub, spawn_host, test_config, FakeAttestor};
use proof_of_device::background::BackgroundRelay;
use proof_of_device::content::ContentRelay;
use proof_of_device::page::PageClient;
use proof_of_device::protocol::PageReply;
use proof_of_device::window::{LocalWindow, WindowEvent};
use proof_of_device::RelayError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

async fn next_reply(page: &PageClient, events: &mut mpsc::UnboundedReceiver<WindowEvent>) -> PageReply {
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let event = events.recv().await.expect("window open");
            // The page also sees its own requests go by.
            if let Some(reply) = page.reply_from(&event) {
                return reply;
            }
        }
    })
    .await
    .expect("reply within 2s")
}

#[tokio::test]
async fn page_register_and_challenge_through_all_hops() {
    let config = Arc::new(test_config());
    let (conn, stub) = native_stub();
    let background = BackgroundRelay::start(config.clone(), Ok(conn));
    spawn_host(stub, FakeAttestor, config.clone());

    let window = LocalWindow::new(config.origin.clone());
    let content = ContentRelay::attach(config.clone(), window.clone(), background.clone());
    content.listen(window.subscribe());

    let page = PageClient::new(config.clone(), window.clone());
    let mut page_events = window.subscribe();
    assert!(page.extension_present());

    page.request_register();
    let reply = next_reply(&page, &mut page_events).await;
    assert_eq!(reply.host, "POD_EXT");
    assert_eq!(reply.data, "quote-for-0123456789ABCDEF");

    page.request_challenge(json!({ "value": 4 }));
    let reply = next_reply(&page, &mut page_events).await;
    assert_eq!(reply.data, r#"signed:{"value":4}"#);
}

#[tokio::test]
async fn page_without_extension_sees_no_marker() {
    let config = Arc::new(test_config());
    let window = LocalWindow::new(config.origin.clone());
    let page = PageClient::new(config, window);
    assert!(!page.extension_present());
}

#[tokio::test]
async fn unreachable_host_leaves_page_waiting() {
    let config = Arc::new(test_config());
    let background = BackgroundRelay::<mpsc::UnboundedSender<serde_json::Value>>::start(
        config.clone(),
        Err(RelayError::NativeHostUnavailable),
    );

    let window = LocalWindow::new(config.origin.clone());
    let content = ContentRelay::attach(config.clone(), window.clone(), background);
    content.listen(window.subscribe());
    let page = PageClient::new(config, window.clone());
    let mut page_events = window.subscribe();

    page.request_register();
    let waited = tokio::time::timeout(Duration::from_millis(200), next_reply(&page, &mut page_events)).await;
    assert!(waited.is_err(), "page must not receive a reply");
}

#[tokio::test]
async fn page_ignores_replies_from_other_origins_or_hosts() {
    let config = Arc::new(test_config());
    let window = LocalWindow::new(config.origin.clone());
    let page = PageClient::new(config.clone(), window);

    let forged = WindowEvent {
        origin: "http://evil.test".into(),
        source: None,
        data: json!({ "host": "POD_EXT", "data": "x" }),
    };
    assert!(page.reply_from(&forged).is_none());

    let own_request = WindowEvent {
        origin: config.origin.clone(),
        source: None,
        data: json!({ "host": "POD_BROWSER", "type": "get_quote" }),
    };
    assert!(page.reply_from(&own_request).is_none());
}
