use std::sync::{Arc, Mutex};

use bytes::Bytes;
use mpdplan::{
    event::SEGMENT_LOADED, HttpClient, HttpLoader, LoadEvent, LoadHook, LoadRequest, MpdError,
    PlayerConfig, PlayerEvent, ResponseType, SegmentLoader, StreamController,
};
use url::Url;
use wiremock::{
    matchers::{method, path, path_regex},
    Mock, MockServer, Request, ResponseTemplate,
};

use super::TWO_PERIODS;

async fn setup_mock_server(body: &str) -> (Url, MockServer) {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/dash/manifest.mpd"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"\.(mp4|m4s)$"))
        .respond_with(|request: &Request| {
            ResponseTemplate::new(200).set_body_bytes(request.url.path().as_bytes().to_vec())
        })
        .mount(&mock_server)
        .await;

    let url = Url::parse(&format!("{}/dash/manifest.mpd", mock_server.uri())).unwrap();
    (url, mock_server)
}

#[tokio::test]
async fn test_attach_source_and_run() -> anyhow::Result<()> {
    let (manifest_url, _server) = setup_mock_server(TWO_PERIODS).await;

    let controller = StreamController::new(HttpLoader::default(), PlayerConfig::default());
    let segments = Arc::new(Mutex::new(Vec::new()));
    let sink = segments.clone();
    controller.event_bus().on(SEGMENT_LOADED, move |event| {
        if let PlayerEvent::SegmentLoaded(segment) = event {
            sink.lock().unwrap().push(segment.clone());
        }
    });

    let plan = controller.attach_source(manifest_url.clone()).await?;
    controller.run(&plan).await?;

    let segments = segments.lock().unwrap();
    assert_eq!(segments.len(), 6);
    for segment in segments.iter() {
        assert_eq!(segment.video, Bytes::from(segment.video_url.path().to_string()));
        assert_eq!(segment.audio, Bytes::from(segment.audio_url.path().to_string()));
        assert_eq!(segment.video_url.host_str(), manifest_url.host_str());
    }
    assert_eq!(segments[5].audio_url.path(), "/dash/content/a48-11.m4s");

    Ok(())
}

#[tokio::test]
async fn test_http_error_after_retries() -> anyhow::Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(2)
        .mount(&mock_server)
        .await;

    let config = PlayerConfig {
        retries: 1,
        retry_delay_ms: 1,
        ..Default::default()
    };
    let controller = StreamController::new(HttpLoader::default(), config);
    let manifest_url = Url::parse(&format!("{}/manifest.mpd", mock_server.uri()))?;

    let result = controller.attach_source(manifest_url).await;
    match result {
        Err(MpdError::HttpError(status)) => assert_eq!(status.as_u16(), 404),
        other => panic!("unexpected result: {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn test_loader_sends_headers() -> anyhow::Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/init.mp4"))
        .and(wiremock::matchers::header("x-token", "secret"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8, 1, 2]))
        .expect(1)
        .mount(&mock_server)
        .await;

    let loader = HttpLoader::new(HttpClient::new(reqwest::Client::builder())?);
    let request = LoadRequest::new(Url::parse(&format!("{}/init.mp4", mock_server.uri()))?)
        .header(
            reqwest::header::HeaderName::from_static("x-token"),
            reqwest::header::HeaderValue::from_static("secret"),
        );
    assert_eq!(request.response_type, ResponseType::ArrayBuffer);

    let data = loader.load(request).await?;
    assert_eq!(&data[..], [0u8, 1, 2]);

    Ok(())
}

#[tokio::test]
async fn test_loader_reads_local_files() -> anyhow::Result<()> {
    let path = std::env::temp_dir().join(format!("mpdplan-{}.mpd", std::process::id()));
    tokio::fs::write(&path, TWO_PERIODS).await?;

    let manifest_url = Url::from_file_path(&path).map_err(|_| anyhow::anyhow!("bad path"))?;
    let loader = HttpLoader::default();
    let data = loader.load(LoadRequest::text(manifest_url.clone())).await?;
    assert_eq!(&data[..], TWO_PERIODS.as_bytes());

    // segments of a local manifest resolve next to it
    let controller = StreamController::new(loader, PlayerConfig::default());
    let plan = controller.attach_source(manifest_url).await?;
    let video = plan.periods[0].video_urls("1920x1080").unwrap();
    assert_eq!(video.initialization.scheme(), "file");
    assert!(video
        .initialization
        .path()
        .ends_with("/content/p0/v1080/init.mp4"));

    tokio::fs::remove_file(&path).await?;
    Ok(())
}

fn recording_hook() -> (LoadHook, Arc<Mutex<Vec<LoadEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let hook = LoadHook::new(move |event| sink.lock().unwrap().push(event.clone()));
    (hook, events)
}

#[tokio::test]
async fn test_loader_reports_progress_and_success() -> anyhow::Result<()> {
    let mock_server = MockServer::start().await;
    let body = vec![7u8; 64 * 1024];
    Mock::given(method("GET"))
        .and(path("/media.m4s"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
        .mount(&mock_server)
        .await;

    let (hook, events) = recording_hook();
    let request = LoadRequest::new(Url::parse(&format!("{}/media.m4s", mock_server.uri()))?)
        .hook(Some(hook));
    let data = HttpLoader::default().load(request).await?;
    assert_eq!(data.len(), body.len());

    let events = events.lock().unwrap();
    let (last, progress) = events.split_last().unwrap();
    assert_eq!(
        *last,
        LoadEvent::Success {
            loaded: body.len() as u64
        }
    );
    assert!(!progress.is_empty());

    let mut previous = 0;
    for event in progress {
        match event {
            LoadEvent::Progress { loaded, total } => {
                assert!(*loaded > previous);
                assert_eq!(*total, Some(body.len() as u64));
                previous = *loaded;
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(previous, body.len() as u64);

    Ok(())
}

#[tokio::test]
async fn test_loader_reports_errors() -> anyhow::Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&mock_server)
        .await;

    let (hook, events) = recording_hook();
    let request = LoadRequest::new(Url::parse(&format!("{}/media.m4s", mock_server.uri()))?)
        .hook(Some(hook));
    let result = HttpLoader::default().load(request).await;
    assert!(matches!(result, Err(MpdError::HttpError(_))));

    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    match &events[0] {
        LoadEvent::Error { status, .. } => {
            assert_eq!(status.map(|s| s.as_u16()), Some(500))
        }
        other => panic!("unexpected event: {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn test_not_modified_is_accepted() -> anyhow::Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&mock_server)
        .await;

    let url = Url::parse(&format!("{}/init.mp4", mock_server.uri()))?;
    let data = HttpLoader::default().load(LoadRequest::new(url)).await?;
    assert!(data.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_manifest_cookies_are_sent_with_segments() -> anyhow::Result<()> {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/dash/manifest.mpd"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("set-cookie", "session=abc; Path=/")
                .set_body_string(TWO_PERIODS),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"\.(mp4|m4s)$"))
        .and(wiremock::matchers::header("cookie", "session=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8]))
        .mount(&mock_server)
        .await;

    let controller = StreamController::new(HttpLoader::default(), PlayerConfig::default());
    let manifest_url = Url::parse(&format!("{}/dash/manifest.mpd", mock_server.uri()))?;
    let plan = controller.attach_source(manifest_url).await?;
    controller.run(&plan).await?;

    Ok(())
}
