//! Registry traffic stays on loopback whatever proxy the environment names.
//!
//! Lives in its own test binary because it changes process environment.

use devreg_core::{DevRegistry, RegistrySettings, WorkerDefinition};

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().unwrap().port()
}

#[tokio::test]
async fn test_proxy_variables_are_ignored() {
    let dead_proxy = format!("http://127.0.0.1:{}", free_port());
    for var in ["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"] {
        std::env::set_var(var, &dead_proxy);
    }
    for var in ["NO_PROXY", "no_proxy"] {
        std::env::remove_var(var);
    }

    let port = free_port();
    let settings = RegistrySettings::default().with_port(port);
    let owner = DevRegistry::new(settings.clone()).unwrap();
    owner
        .register("w", &WorkerDefinition::local().with_port(8787))
        .await
        .unwrap();
    assert!(owner.is_serving());

    let peer = DevRegistry::new(settings).unwrap();
    let listed = peer.list().await.unwrap().expect("registry is running");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed["w"].port, Some(8787));

    owner.stop().await;
}
