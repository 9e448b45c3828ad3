use std::{
    net::{Ipv4Addr, SocketAddr},
    time::Duration,
};

use checkers_server::network::lan::{Advertiser, DISCOVERY_PORT, ServerInfo, discover};
use serial_test::serial;
use tokio_util::sync::CancellationToken;

#[tokio::test]
#[serial]
async fn test_discover_finds_advertised_server() {
    let cancel = CancellationToken::new();
    let target = SocketAddr::from((Ipv4Addr::LOCALHOST, DISCOVERY_PORT));
    let advertiser = Advertiser::new(31999, "Integration game")
        .with_target(target)
        .with_interval(Duration::from_millis(50));

    // Listener first, advertisements after a short delay
    let listener = tokio::spawn(discover(DISCOVERY_PORT, Duration::from_millis(800)));
    tokio::time::sleep(Duration::from_millis(100)).await;
    let task = tokio::spawn(advertiser.run(cancel.clone()));

    let servers = listener
        .await
        .expect("Discovery task panicked")
        .expect("Discovery failed");
    cancel.cancel();
    task.await
        .expect("Advertiser task panicked")
        .expect("Advertiser failed");

    // Repeated advertisements collapse into one entry
    assert_eq!(
        servers,
        vec![ServerInfo {
            motd: "Integration game".to_string(),
            address: SocketAddr::from((Ipv4Addr::LOCALHOST, 31999)),
        }]
    );
}

#[tokio::test]
#[serial]
async fn test_discover_without_servers() {
    let servers = discover(DISCOVERY_PORT, Duration::from_millis(200))
        .await
        .expect("Discovery failed");
    assert!(servers.is_empty());
}
