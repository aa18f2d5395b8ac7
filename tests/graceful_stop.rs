//! After `stop()`, `send_message` drops silently, the inbound queue
//! closes, and open connections are torn down.

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
async fn stop_drops_sends_closes_connections_and_ends_the_inbound_stream() {
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
        gw,
        Arc::new(NullStatusListener),
    );
    center.start().unwrap();
    let reader = center.get_reader(Category::Request).unwrap();
    tokio::pin!(reader);

    center.send_message(
        Message::new(Category::Request, Direction::Request, ActorId::from_key("a")).pinned_to(g1),
    );
    settle().await;
    assert_eq!(center.connection_count(), 1);

    center.stop().await;
    assert!(!center.running());

    for conn in factory.connections_for(g1) {
        assert!(!conn.is_valid(), "stop tears down pooled connections");
    }

    // Sends after stop are dropped, not routed.
    center.send_message(
        Message::new(Category::Request, Direction::Request, ActorId::from_key("b")).pinned_to(g1),
    );
    settle().await;
    let delivered: usize = factory
        .connections_for(g1)
        .iter()
        .map(|c| c.sent.lock().unwrap().len())
        .sum();
    assert_eq!(delivered, 1, "the post-stop send never reached a connection");

    use tokio_stream::StreamExt;
    assert_eq!(reader.next().await, None, "inbound stream ends cleanly");
}
