use routeguide_client::{ClientConfig, RouteGuideClient};
use routeguide_server::{Handler, ServerConfig, serve};
use routeguide_types::{Point, Rectangle};
use std::io::Write;
use std::sync::Arc;

#[tokio::test]
async fn test_server_from_config_file() -> anyhow::Result<()> {
    let mut dataset = tempfile::NamedTempFile::new()?;
    dataset.write_all(
        br#"[
            {"location": {"latitude": 10, "longitude": 20}, "name": "first"},
            {"location": {"latitude": 30, "longitude": 40}, "name": ""},
            {"location": {"latitude": 10, "longitude": 20}, "name": "first again"}
        ]"#,
    )?;

    let mut config_file = tempfile::NamedTempFile::new()?;
    writeln!(config_file, "port = 0")?;
    writeln!(config_file, "features_path = {:?}", dataset.path())?;
    writeln!(config_file, "[transport]")?;
    writeln!(config_file, "max_frame_size = 65536")?;
    writeln!(config_file, "call_buffer = 2")?;
    writeln!(config_file, "outbound_buffer = 4")?;

    let config = ServerConfig::from_path(config_file.path())?;
    let store = config.load_features()?;
    assert_eq!(store.len(), 3);

    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    let addr = listener.local_addr()?;
    let transport = config.transport.clone();
    tokio::spawn(async move {
        let _ = serve(
            listener,
            Handler::new(Arc::new(store)),
            transport,
            futures::future::pending(),
        )
        .await;
    });

    let client = RouteGuideClient::connect_with(
        addr,
        ClientConfig {
            max_frame_size: 65536,
            call_buffer: 2,
            outbound_buffer: 4,
        },
    )
    .await?;

    assert_eq!(client.get_feature(Point::new(10, 20)).await?.name, "first");

    let everything = Rectangle::new(Point::new(0, 0), Point::new(100, 100));
    let names: Vec<String> = client
        .list_features(everything)
        .await?
        .collect_all()
        .await?
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(names, ["first", "", "first again"]);

    // Small buffers still carry a longer route.
    let mut call = client.record_route().await?;
    for _ in 0..50 {
        call.send(Point::new(10, 20)).await?;
    }
    let summary = call.finish().await?;
    assert_eq!(summary.point_count, 50);
    assert_eq!(summary.feature_count, 100);

    Ok(())
}

#[test]
fn test_missing_dataset_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig::default().with_features_path(dir.path().join("missing.json"));
    assert!(matches!(
        config.load_features(),
        Err(routeguide::LoadError::Io { .. })
    ));

    let mut garbage = tempfile::NamedTempFile::new().unwrap();
    garbage.write_all(b"{not json").unwrap();
    let config = ServerConfig::default().with_features_path(garbage.path());
    assert!(matches!(
        config.load_features(),
        Err(routeguide::LoadError::Decode(_))
    ));
}
