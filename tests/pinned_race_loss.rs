//! A pinned send loses the race when its target endpoint's connection
//! drops out from under it between being listed live and the actual
//! dial/transmit; the caller gets a rejection naming the endpoint.

mod mocks;

use std::sync::Arc;
use std::time::Duration;

use message_center::{
    ActorId, Category, ClientMessageCenter, Direction, Endpoint, GatewayManagerConfig,
    InMemoryGatewayManager, Message, MessageCenterConfig, NullStatusListener,
};
use mocks::MockConnectionFactory;

fn endpoint(port: u16) -> Endpoint {
    Endpoint::from_addr(format!("127.0.0.1:{}", port).parse().unwrap())
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(30)).await;
}

#[tokio::test]
async fn connection_lost_between_selection_and_send_rejects_with_endpoint_and_unavailable() {
    mocks::init_logging();
    let g1 = endpoint(1);
    let gw = Arc::new(InMemoryGatewayManager::new(
        vec![g1.as_gateway_uri()],
        GatewayManagerConfig::default(),
    ));
    let factory = MockConnectionFactory::new();
    let center = ClientMessageCenter::new(
        MessageCenterConfig::default(),
        endpoint(9000),
        ActorId::from_key("client"),
        factory.clone(),
        gw.clone(),
        Arc::new(NullStatusListener),
    );
    center.start().unwrap();
    let reader = center.get_reader(Category::Request).unwrap();
    tokio::pin!(reader);

    // Warm up a connection to G1 so it's pooled.
    let actor = ActorId::from_key("actor-1");
    center.send_message(
        Message::new(Category::Request, Direction::Request, actor.clone()).pinned_to(g1),
    );
    settle().await;
    assert_eq!(factory.dial_count(g1), 1);

    // The connection dies, and redialing G1 is now doomed — the gateway
    // went unavailable in the window between G1 being listed live and the
    // pinned send actually landing.
    for conn in factory.connections_for(g1) {
        conn.close(message_center::CloseReason::TransportClosed("peer reset".into()));
    }
    factory.fail(g1);

    center.send_message(
        Message::new(Category::Request, Direction::Request, actor).pinned_to(g1),
    );

    use tokio_stream::StreamExt;
    let rsp = tokio::time::timeout(Duration::from_millis(500), reader.next())
        .await
        .expect("a rejection should arrive")
        .expect("stream not closed");
    assert!(matches!(rsp.category, Category::Unrecoverable));
    let body = String::from_utf8(rsp.body).unwrap();
    assert!(body.contains(&g1.to_string()), "reason names the endpoint: {}", body);
    assert!(body.to_lowercase().contains("unavailable"), "reason says unavailable: {}", body);
}
