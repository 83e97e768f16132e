use std::{
    io::Write,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use clap::Parser;
use clap_handler::handler;
use mpdplan::{
    event::SEGMENT_LOADED, LoadEvent, LoadHook, MpdError, PlayerEvent, StreamController,
};

use super::{parse_source, HttpOptions, PlayerOptions};

/// Load the preferred video and audio tracks and append them to local files
#[derive(Parser, Clone, Debug)]
#[clap(name = "fetch")]
pub struct FetchCommand {
    #[clap(flatten)]
    pub http: HttpOptions,

    #[clap(flatten)]
    pub player: PlayerOptions,

    /// Output directory
    #[clap(short, long, default_value = ".")]
    pub output: PathBuf,

    /// Manifest URL or path
    pub source: String,
}

struct Outputs {
    video: std::fs::File,
    audio: std::fs::File,
    error: Option<std::io::Error>,
}

impl Outputs {
    fn append(&mut self, video: &[u8], audio: &[u8]) {
        if self.error.is_some() {
            return;
        }
        let result = self
            .video
            .write_all(video)
            .and_then(|_| self.audio.write_all(audio));
        if let Err(e) = result {
            self.error = Some(e);
        }
    }
}

#[handler(FetchCommand)]
pub async fn fetch(args: FetchCommand) -> anyhow::Result<()> {
    let source = parse_source(&args.source)?;
    let controller = StreamController::new(args.http.into_loader()?, args.player.into_config()?)
        .with_load_hook(LoadHook::new(|event| match event {
            LoadEvent::Progress { loaded, total } => {
                tracing::trace!("Received {loaded} of {total:?} bytes")
            }
            LoadEvent::Error { status, message } => {
                tracing::debug!("Load failed ({status:?}): {message}")
            }
            _ => {}
        }));
    let config = controller.config();
    tracing::info!(
        "Fetching video {} and audio {}",
        config.preferred_video_key,
        config.preferred_audio_key
    );

    std::fs::create_dir_all(&args.output)?;
    let outputs = Arc::new(Mutex::new(Outputs {
        video: std::fs::File::create(args.output.join("video.mp4"))?,
        audio: std::fs::File::create(args.output.join("audio.m4a"))?,
        error: None,
    }));

    let sink = outputs.clone();
    let token = controller.cancellation_token();
    controller.event_bus().on(SEGMENT_LOADED, move |event| {
        let PlayerEvent::SegmentLoaded(segment) = event else {
            return;
        };
        let mut outputs = sink.lock().unwrap_or_else(|e| e.into_inner());
        outputs.append(&segment.video, &segment.audio);
        if outputs.error.is_some() {
            token.cancel();
        }
    });

    let token = controller.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling the in-flight segments");
            token.cancel();
        }
    });

    let plan = controller.attach_source(source).await?;
    let result = controller.run(&plan).await;

    let mut outputs = outputs.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(e) = outputs.error.take() {
        return Err(e.into());
    }
    match result {
        Ok(()) => {
            tracing::info!("Saved to {}", args.output.display());
            Ok(())
        }
        Err(MpdError::Cancelled) => {
            tracing::warn!("Cancelled, partial output kept in {}", args.output.display());
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
