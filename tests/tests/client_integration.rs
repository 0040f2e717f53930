use routeguide::FeatureStore;
use routeguide_client::{ClientError, RouteGuideClient};
use routeguide_server::{Handler, TransportConfig, run_server, serve};
use routeguide_types::geo::{distance, path_distance};
use routeguide_types::{Feature, Point, Rectangle, RouteNote};
use std::sync::Arc;
use std::time::Duration;

async fn spawn_test_server() -> anyhow::Result<std::net::SocketAddr> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "routeguide_server=info,routeguide=info,info".into()),
        )
        .try_init()
        .ok();
    let store = Arc::new(FeatureStore::bundled()?);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let bound_addr = listener.local_addr()?;

    tokio::spawn(async move {
        let _ = run_server(listener, store, futures::future::pending()).await;
    });

    Ok(bound_addr)
}

#[tokio::test]
async fn test_get_feature() -> anyhow::Result<()> {
    let addr = spawn_test_server().await?;
    let client = RouteGuideClient::connect(addr).await?;

    let feature = client
        .get_feature(Point::new(409_146_138, -746_188_906))
        .await?;
    assert_eq!(
        feature.name,
        "Berkshire Valley Management Area Trail, Jefferson, NJ, USA"
    );

    // Nothing stored here: an unnamed feature at the requested point.
    let feature = client.get_feature(Point::new(0, 0)).await?;
    assert_eq!(feature, Feature::unnamed(Point::new(0, 0)));
    assert!(!feature.is_named());

    // Two features share this location; the first loaded wins.
    let feature = client
        .get_feature(Point::new(411_633_782, -746_784_970))
        .await?;
    assert_eq!(feature.name, "211-225 Plains Road, Augusta, NJ 07822, USA");

    assert_eq!(client.active_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_list_features() -> anyhow::Result<()> {
    let addr = spawn_test_server().await?;
    let client = RouteGuideClient::connect(addr).await?;
    let store = FeatureStore::bundled()?;

    let rect = Rectangle::new(
        Point::new(400_000_000, -750_000_000),
        Point::new(420_000_000, -730_000_000),
    );
    let features = client.list_features(rect).await?.collect_all().await?;
    let expected: Vec<Feature> = store.scan_in(&rect).cloned().collect();
    assert!(!features.is_empty());
    assert_eq!(features, expected);
    // Unnamed features are listed too.
    assert!(features.iter().any(|f| !f.is_named()));

    // Same rectangle given by its other corners.
    let swapped = Rectangle::new(
        Point::new(420_000_000, -730_000_000),
        Point::new(400_000_000, -750_000_000),
    );
    let again = client.list_features(swapped).await?.collect_all().await?;
    assert_eq!(again, expected);

    // No features here: an empty stream that ends without error.
    let empty = Rectangle::new(Point::new(0, 0), Point::new(10, 10));
    let mut stream = client.list_features(empty).await?;
    assert!(stream.message().await?.is_none());

    Ok(())
}

#[tokio::test]
async fn test_list_features_dropped_early() -> anyhow::Result<()> {
    let addr = spawn_test_server().await?;
    let client = RouteGuideClient::connect(addr).await?;

    let world = Rectangle::new(
        Point::new(-900_000_000, -1_800_000_000),
        Point::new(900_000_000, 1_800_000_000),
    );
    let mut stream = client.list_features(world).await?;
    assert!(stream.message().await?.is_some());
    drop(stream);
    assert_eq!(client.active_calls(), 0);

    // The connection is still good for new calls.
    let all = client.list_features(world).await?.collect_all().await?;
    assert_eq!(all.len(), FeatureStore::bundled()?.len());

    Ok(())
}

#[tokio::test]
async fn test_record_route() -> anyhow::Result<()> {
    let addr = spawn_test_server().await?;
    let client = RouteGuideClient::connect(addr).await?;

    let points = [
        Point::new(407_838_351, -746_143_763),
        Point::new(411_633_782, -746_784_970),
        Point::new(0, 0),
    ];

    let mut call = client.record_route().await?;
    for point in points {
        call.send(point).await?;
    }
    let summary = call.finish().await?;

    assert_eq!(summary.point_count, 3);
    // One feature at the first point, two sharing the second.
    assert_eq!(summary.feature_count, 3);
    assert_eq!(
        summary.distance,
        distance(&points[0], &points[1]) + distance(&points[1], &points[2])
    );
    assert_eq!(summary.distance, path_distance(&points));
    assert_eq!(summary.elapsed_time, 0);

    Ok(())
}

#[tokio::test]
async fn test_record_route_elapsed_time() -> anyhow::Result<()> {
    let addr = spawn_test_server().await?;
    let client = RouteGuideClient::connect(addr).await?;

    let mut call = client.record_route().await?;
    call.send(Point::new(1, 1)).await?;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    call.send(Point::new(1, 1)).await?;
    let summary = call.finish().await?;

    assert_eq!(summary.point_count, 2);
    assert_eq!(summary.feature_count, 0);
    assert_eq!(summary.distance, 0);
    assert!(summary.elapsed_time >= 1);

    Ok(())
}

#[tokio::test]
async fn test_record_route_empty() -> anyhow::Result<()> {
    let addr = spawn_test_server().await?;
    let client = RouteGuideClient::connect(addr).await?;

    let summary = client.record_route().await?.finish().await?;
    assert_eq!(summary.point_count, 0);
    assert_eq!(summary.feature_count, 0);
    assert_eq!(summary.distance, 0);

    Ok(())
}

#[tokio::test]
async fn test_route_chat() -> anyhow::Result<()> {
    let addr = spawn_test_server().await?;
    let client = RouteGuideClient::connect(addr).await?;

    let l1 = Point::new(0, 1);
    let l2 = Point::new(0, 2);
    let n1 = RouteNote::new(l1, "First message");
    let n2 = RouteNote::new(l1, "Second message");
    let n3 = RouteNote::new(l2, "Third message");

    let (mut notes, mut replies) = client.route_chat().await?;

    notes.send(n1.clone()).await?;
    assert_eq!(replies.message().await?, Some(n1.clone()));

    notes.send(n2.clone()).await?;
    assert_eq!(replies.message().await?, Some(n1.clone()));
    assert_eq!(replies.message().await?, Some(n2.clone()));

    notes.send(n3.clone()).await?;
    assert_eq!(replies.message().await?, Some(n3.clone()));

    notes.close().await?;
    assert_eq!(replies.message().await?, None);

    // A later chat on a new connection sees the notes already recorded.
    let other = RouteGuideClient::connect(addr).await?;
    let (mut notes, replies) = other.route_chat().await?;
    let n4 = RouteNote::new(l2, "Fourth message");
    notes.send(n4.clone()).await?;
    notes.close().await?;
    assert_eq!(replies.collect_all().await?, vec![n3, n4]);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_route_chat() -> anyhow::Result<()> {
    const CALLERS: usize = 8;
    const NOTES_EACH: usize = 20;

    let addr = spawn_test_server().await?;
    let location = Point::new(123_456, 654_321);

    let mut tasks = Vec::new();
    for caller in 0..CALLERS {
        tasks.push(tokio::spawn(async move {
            let client = RouteGuideClient::connect(addr).await?;
            let (mut notes, replies) = client.route_chat().await?;
            for i in 0..NOTES_EACH {
                notes
                    .send(RouteNote::new(location, format!("caller {} note {}", caller, i)))
                    .await?;
            }
            notes.close().await?;
            replies.collect_all().await
        }));
    }

    let mut batches = Vec::new();
    for task in tasks {
        batches.push(task.await??);
    }

    // Every append survived: a final chat reply holds all of them.
    let client = RouteGuideClient::connect(addr).await?;
    let (mut notes, replies) = client.route_chat().await?;
    notes.send(RouteNote::new(location, "last")).await?;
    notes.close().await?;
    let history = replies.collect_all().await?;
    assert_eq!(history.len(), CALLERS * NOTES_EACH + 1);

    // Each reply batch starts over at the first note of the history, ends
    // with the note that triggered it and is a prefix of the final history.
    for (caller, replies) in batches.iter().enumerate() {
        let mut chunks: Vec<&[RouteNote]> = Vec::new();
        let mut start = 0;
        for i in 1..=replies.len() {
            if i == replies.len() || replies[i] == history[0] {
                chunks.push(&replies[start..i]);
                start = i;
            }
        }

        assert_eq!(chunks.len(), NOTES_EACH);
        let mut last_len = 0;
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(*chunk, &history[..chunk.len()]);
            assert!(chunk.len() > last_len);
            last_len = chunk.len();
            let own = chunk.last().map(|note| note.message.as_str());
            assert_eq!(own, Some(format!("caller {} note {}", caller, i).as_str()));
        }
    }

    Ok(())
}

#[tokio::test]
async fn test_route_chat_without_notes() -> anyhow::Result<()> {
    let addr = spawn_test_server().await?;
    let client = RouteGuideClient::connect(addr).await?;

    let (mut notes, replies) = client.route_chat().await?;
    notes.close().await?;
    assert!(replies.collect_all().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_unread_stream_does_not_block_other_calls() -> anyhow::Result<()> {
    const FEATURES: i32 = 500;

    let features = (0..FEATURES)
        .map(|i| Feature::new(format!("feature {}", i), Point::new(i, i)))
        .collect();
    let store = Arc::new(FeatureStore::from_features(features));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = serve(
            listener,
            Handler::new(store),
            TransportConfig::default(),
            futures::future::pending(),
        )
        .await;
    });

    let client = RouteGuideClient::connect(addr).await?;
    let everything = Rectangle::new(Point::new(0, 0), Point::new(FEATURES, FEATURES));
    let mut listing = client.list_features(everything).await?;
    let (mut notes, mut replies) = client.route_chat().await?;
    notes.send(RouteNote::new(Point::new(-5, -5), "unread")).await?;

    // Neither the listing nor the chat is read while these run.
    for i in [7, 250, 499] {
        let feature = tokio::time::timeout(
            Duration::from_secs(3),
            client.get_feature(Point::new(i, i)),
        )
        .await??;
        assert_eq!(feature.name, format!("feature {}", i));
    }

    let mut count = 0;
    while let Some(feature) = listing.message().await? {
        assert_eq!(feature.location, Point::new(count, count));
        count += 1;
    }
    assert_eq!(count, FEATURES);
    assert_eq!(replies.message().await?.map(|n| n.message), Some("unread".into()));

    Ok(())
}

#[tokio::test]
async fn test_send_on_finished_route_is_closed() -> anyhow::Result<()> {
    let addr = spawn_test_server().await?;
    let client = RouteGuideClient::connect(addr).await?;

    let (mut notes, replies) = client.route_chat().await?;
    notes.close().await?;
    assert!(matches!(
        notes.send(RouteNote::new(Point::new(3, 3), "late")).await,
        Err(ClientError::Closed)
    ));
    assert!(replies.collect_all().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_connect_refused() -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    assert!(matches!(
        RouteGuideClient::connect(addr).await,
        Err(ClientError::Connection(_))
    ));
    Ok(())
}
