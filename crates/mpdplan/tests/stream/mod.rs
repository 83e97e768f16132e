mod http;

use std::sync::{Arc, Mutex};

use bytes::Bytes;
use mpdplan::{
    event::{MANIFEST_LOADED, MANIFEST_PARSE_COMPLETED, SEGMENT_LOADED},
    LoadEvent, LoadHook, LoadRequest, MpdError, MpdResult, PlayerConfig, PlayerEvent,
    SegmentKind, SegmentLoader, StreamController,
};
use url::Url;

use crate::{setup_tracing, AssertWrapper};

const TWO_PERIODS: &str = include_str!("../fixtures/two-periods.mpd");

fn manifest_url() -> Url {
    Url::parse("https://media.example.com/dash/manifest.mpd").unwrap()
}

fn fast_retry() -> PlayerConfig {
    PlayerConfig {
        retry_delay_ms: 1,
        max_retry_delay_ms: 4,
        ..Default::default()
    }
}

/// Answers every request with its own path and records when each load starts and ends.
#[derive(Clone, Default)]
struct RecordingLoader {
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingLoader {
    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl SegmentLoader for RecordingLoader {
    async fn load(&self, request: LoadRequest) -> MpdResult<Bytes> {
        let path = request.url.path().to_string();
        self.log.lock().unwrap().push(format!("start {path}"));
        tokio::task::yield_now().await;
        self.log.lock().unwrap().push(format!("end {path}"));
        Ok(Bytes::from(path))
    }
}

/// Fails the first `failures` loads of every URL with a server error.
#[derive(Clone)]
struct FlakyLoader {
    failures: usize,
    attempts: Arc<Mutex<Vec<String>>>,
}

impl FlakyLoader {
    fn new(failures: usize) -> Self {
        Self {
            failures,
            attempts: Default::default(),
        }
    }

    fn attempts_for(&self, path: &str) -> usize {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| *p == path)
            .count()
    }
}

impl SegmentLoader for FlakyLoader {
    async fn load(&self, request: LoadRequest) -> MpdResult<Bytes> {
        let path = request.url.path().to_string();
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            attempts.push(path.clone());
            attempts.iter().filter(|p| **p == path).count()
        };
        if attempt <= self.failures {
            return Err(MpdError::HttpError(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        }
        Ok(Bytes::from(path))
    }
}

fn record_segments(controller: &StreamController<impl SegmentLoader>) -> Arc<Mutex<Vec<(usize, SegmentKind)>>> {
    let loaded = Arc::new(Mutex::new(Vec::new()));
    let sink = loaded.clone();
    controller.event_bus().on(SEGMENT_LOADED, move |event| {
        if let PlayerEvent::SegmentLoaded(segment) = event {
            sink.lock().unwrap().push((segment.period, segment.kind));
        }
    });
    loaded
}

#[tokio::test]
async fn test_pairs_are_loaded_in_order() -> anyhow::Result<()> {
    setup_tracing();
    let loader = RecordingLoader::default();
    let controller = StreamController::new(loader.clone(), PlayerConfig::default());
    let loaded = record_segments(&controller);

    let plan = controller.on_manifest_loaded(TWO_PERIODS, manifest_url())?;
    controller.run(&plan).await?;

    assert_eq!(
        *loaded.lock().unwrap(),
        [
            (0, SegmentKind::Initialization),
            (0, SegmentKind::Media(0)),
            (0, SegmentKind::Media(1)),
            (1, SegmentKind::Initialization),
            (1, SegmentKind::Media(0)),
            (1, SegmentKind::Media(1)),
        ]
    );

    // Each pair is fetched concurrently and finishes before the next one starts
    let log = loader.log();
    assert_eq!(log.len(), 6 * 4);
    for pair in log.chunks(4) {
        assert!(pair[0].starts_with("start ") && pair[1].starts_with("start "), "{pair:?}");
        assert!(pair[2].starts_with("end ") && pair[3].starts_with("end "), "{pair:?}");
    }

    let starts: Vec<_> = log.iter().filter(|l| l.starts_with("start ")).collect();
    assert_eq!(starts[0], "start /dash/content/p0/v1080/init.mp4");
    assert_eq!(starts[1], "start /dash/content/p0/audio/a48/init.mp4");
    assert_eq!(starts[2], "start /dash/content/p0/v1080/001.m4s");
    assert_eq!(starts[4], "start /dash/content/p0/v1080/002.m4s");
    assert_eq!(starts[6], "start /dash/content/v1080-init.mp4");

    Ok(())
}

#[tokio::test]
async fn test_segment_payloads() -> anyhow::Result<()> {
    let controller = StreamController::new(RecordingLoader::default(), PlayerConfig::default());
    let payloads = Arc::new(Mutex::new(Vec::new()));
    let sink = payloads.clone();
    controller.event_bus().on(SEGMENT_LOADED, move |event| {
        if let PlayerEvent::SegmentLoaded(segment) = event {
            sink.lock().unwrap().push(segment.clone());
        }
    });

    let plan = controller.on_manifest_loaded(TWO_PERIODS, manifest_url())?;
    controller.run(&plan).await?;

    let payloads = payloads.lock().unwrap();
    let first = &payloads[0];
    assert_eq!(first.video_url.path(), "/dash/content/p0/v1080/init.mp4");
    assert_eq!(first.video, Bytes::from_static(b"/dash/content/p0/v1080/init.mp4"));
    assert_eq!(first.audio, Bytes::from_static(b"/dash/content/p0/audio/a48/init.mp4"));
    Ok(())
}

#[tokio::test]
async fn test_manifest_events() -> anyhow::Result<()> {
    let controller = StreamController::new(RecordingLoader::default(), PlayerConfig::default());
    let topics = Arc::new(Mutex::new(Vec::new()));

    for topic in [MANIFEST_LOADED, MANIFEST_PARSE_COMPLETED] {
        let topics = topics.clone();
        controller.event_bus().on(topic, move |event| {
            topics.lock().unwrap().push(event.topic());
            if let PlayerEvent::ManifestParseCompleted { manifest } = event {
                // templates are already merged into the representations
                let representation = manifest
                    .first("Period")
                    .and_then(|p| p.first("AdaptationSet"))
                    .and_then(|a| a.first("Representation"))
                    .and_then(|r| r.first("SegmentTemplate"));
                assert!(representation.is_some());
            }
        });
    }

    controller.on_manifest_loaded(TWO_PERIODS, manifest_url())?;
    assert_eq!(
        *topics.lock().unwrap(),
        [MANIFEST_LOADED, MANIFEST_PARSE_COMPLETED]
    );
    Ok(())
}

#[tokio::test]
async fn test_missing_key() -> anyhow::Result<()> {
    let config = PlayerConfig {
        preferred_video_key: "640x360".to_string(),
        ..Default::default()
    };
    let loader = RecordingLoader::default();
    let controller = StreamController::new(loader.clone(), config);

    let plan = controller.on_manifest_loaded(TWO_PERIODS, manifest_url())?;
    let error = controller.run(&plan).await.unwrap_err();
    match error {
        MpdError::KeyNotFound { period, key } => {
            assert_eq!(period, 0);
            assert_eq!(key, "640x360");
        }
        e => panic!("unexpected error: {e}"),
    }
    assert!(loader.log().is_empty());

    Ok(())
}

#[tokio::test]
async fn test_retry_until_success() -> anyhow::Result<()> {
    let loader = FlakyLoader::new(2);
    let controller = StreamController::new(loader.clone(), fast_retry());
    let loaded = record_segments(&controller);

    let plan = controller.on_manifest_loaded(TWO_PERIODS, manifest_url())?;
    controller.run(&plan).await?;

    assert_eq!(loaded.lock().unwrap().len(), 6);
    assert_eq!(loader.attempts_for("/dash/content/p0/v1080/init.mp4"), 3);
    Ok(())
}

#[tokio::test]
async fn test_retry_exhausted() -> anyhow::Result<()> {
    let loader = FlakyLoader::new(usize::MAX);
    let config = PlayerConfig {
        retries: 2,
        ..fast_retry()
    };
    let controller = StreamController::new(loader.clone(), config);
    let loaded = record_segments(&controller);

    let plan = controller.on_manifest_loaded(TWO_PERIODS, manifest_url())?;
    let result = controller.run(&plan).await;

    assert!(matches!(result, Err(MpdError::HttpError(_))));
    assert_eq!(loader.attempts_for("/dash/content/p0/v1080/init.mp4"), 3);
    assert!(loaded.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_non_network_errors_are_not_retried() -> anyhow::Result<()> {
    #[derive(Clone, Default)]
    struct BrokenLoader(Arc<Mutex<Vec<String>>>);

    impl SegmentLoader for BrokenLoader {
        async fn load(&self, request: LoadRequest) -> MpdResult<Bytes> {
            self.0.lock().unwrap().push(request.url.path().to_string());
            Err(std::io::Error::other("disk on fire").into())
        }
    }

    let loader = BrokenLoader::default();
    let controller = StreamController::new(loader.clone(), fast_retry());
    let plan = controller.on_manifest_loaded(TWO_PERIODS, manifest_url())?;

    let result = controller.run(&plan).await;
    assert!(matches!(result, Err(MpdError::IOError(_))));

    let attempts = loader.0.lock().unwrap();
    assert_eq!(attempts[0], "/dash/content/p0/v1080/init.mp4");
    assert_eq!(
        attempts
            .iter()
            .filter(|p| *p == "/dash/content/p0/v1080/init.mp4")
            .count(),
        1
    );
    Ok(())
}

#[tokio::test]
async fn test_cancel_stops_the_loop() -> anyhow::Result<()> {
    let controller = StreamController::new(RecordingLoader::default(), PlayerConfig::default());
    let loaded = record_segments(&controller);

    let token = controller.cancellation_token();
    controller.event_bus().on(SEGMENT_LOADED, move |_| token.cancel());

    let plan = controller.on_manifest_loaded(TWO_PERIODS, manifest_url())?;
    let result = controller.run(&plan).await;

    assert!(matches!(result, Err(MpdError::Cancelled)));
    assert_eq!(
        *loaded.lock().unwrap(),
        [(0, SegmentKind::Initialization)]
    );
    Ok(())
}

#[tokio::test]
async fn test_unequal_media_lists_load_the_shorter() -> anyhow::Result<()> {
    let manifest = r#"<MPD><Period duration="PT6S">
        <AdaptationSet mimeType="video/mp4">
            <SegmentTemplate duration="2" initialization="v.mp4" media="v$Number$.m4s"/>
            <Representation width="1920" height="1080"/>
        </AdaptationSet>
        <AdaptationSet mimeType="audio/mp4">
            <SegmentTemplate duration="3" initialization="a.mp4" media="a$Number$.m4s"/>
            <Representation audioSamplingRate="48000"/>
        </AdaptationSet>
    </Period></MPD>"#;

    let controller = StreamController::new(RecordingLoader::default(), PlayerConfig::default());
    let loaded = record_segments(&controller);
    let plan = controller.on_manifest_loaded(manifest, manifest_url())?;

    let period = plan.period(0).assert_success();
    assert_eq!(period.video_urls("1920x1080").assert_success().media.len(), 3);
    assert_eq!(period.audio_urls("48000").assert_success().media.len(), 2);

    controller.run(&plan).await?;
    assert_eq!(loaded.lock().unwrap().len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_three_media_segments_in_order() -> anyhow::Result<()> {
    let manifest = r#"<MPD><Period duration="PT6S">
        <SegmentTemplate duration="2" initialization="$RepresentationID$/init.mp4" media="$RepresentationID$/$Number$.m4s"/>
        <AdaptationSet mimeType="video/mp4">
            <Representation id="v" width="1920" height="1080"/>
        </AdaptationSet>
        <AdaptationSet mimeType="audio/mp4">
            <Representation id="a" audioSamplingRate="48000"/>
        </AdaptationSet>
    </Period></MPD>"#;

    let loader = RecordingLoader::default();
    let controller = StreamController::new(loader.clone(), PlayerConfig::default());
    let loaded = record_segments(&controller);

    let plan = controller.on_manifest_loaded(manifest, manifest_url())?;
    controller.run(&plan).await?;

    assert_eq!(
        *loaded.lock().unwrap(),
        [
            (0, SegmentKind::Initialization),
            (0, SegmentKind::Media(0)),
            (0, SegmentKind::Media(1)),
            (0, SegmentKind::Media(2)),
        ]
    );

    let log = loader.log();
    let expected = ["init.mp4", "1.m4s", "2.m4s", "3.m4s"];
    assert_eq!(log.len(), expected.len() * 4);
    for (pair, file) in log.chunks(4).zip(expected) {
        // both halves of a pair start before either ends, and the next pair waits
        assert_eq!(pair[0], format!("start /dash/v/{file}"));
        assert_eq!(pair[1], format!("start /dash/a/{file}"));
        assert!(pair[2].starts_with("end ") && pair[3].starts_with("end "), "{pair:?}");
    }

    Ok(())
}

#[tokio::test]
async fn test_cancel_notifies_abort() -> anyhow::Result<()> {
    struct PendingLoader;

    impl SegmentLoader for PendingLoader {
        async fn load(&self, _request: LoadRequest) -> MpdResult<Bytes> {
            std::future::pending().await
        }
    }

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let controller = StreamController::new(PendingLoader, PlayerConfig::default())
        .with_load_hook(LoadHook::new(move |event| {
            sink.lock().unwrap().push(event.clone())
        }));

    let token = controller.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        token.cancel();
    });

    let result = controller.attach_source(manifest_url()).await;
    assert!(matches!(result, Err(MpdError::Cancelled)));
    assert_eq!(*events.lock().unwrap(), [LoadEvent::Abort]);
    Ok(())
}
