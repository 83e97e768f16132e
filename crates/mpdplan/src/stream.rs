use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{
    config::PlayerConfig,
    event::{EventBus, PlayerEvent, SegmentKind, SegmentLoaded},
    inherit::resolve_templates,
    loader::{LoadEvent, LoadHook, LoadRequest, SegmentLoader},
    manifest::{parse, view::Mpd},
    plan::{PlanBuilder, SegmentRequestPlan},
    url::UrlNode,
    MpdError, MpdResult,
};

/// Drives a manifest from text to loaded segments.
///
/// Segments are loaded as (video, audio) pairs: both halves of a pair are
/// fetched concurrently, and the next pair is only requested once the
/// previous one has been published on the [`EventBus`].
pub struct StreamController<L> {
    loader: L,
    bus: EventBus,
    config: PlayerConfig,
    cancel: CancellationToken,
    load_hook: Option<LoadHook>,
}

impl<L> StreamController<L>
where
    L: SegmentLoader,
{
    pub fn new(loader: L, config: PlayerConfig) -> Self {
        Self {
            loader,
            bus: EventBus::new(),
            config,
            cancel: CancellationToken::new(),
            load_hook: None,
        }
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn with_cancellation_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Attached to every manifest and segment request.
    pub fn with_load_hook(mut self, hook: LoadHook) -> Self {
        self.load_hook = Some(hook);
        self
    }

    fn request(&self, request: LoadRequest) -> LoadRequest {
        request.hook(self.load_hook.clone())
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Cancelling the returned token aborts [`Self::run`] with [`MpdError::Cancelled`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Loads the manifest at `manifest_url` and builds its plan.
    pub async fn attach_source(&self, manifest_url: Url) -> MpdResult<SegmentRequestPlan> {
        tracing::info!("Loading manifest {manifest_url}");
        let data = self.fetch(self.request(LoadRequest::text(manifest_url.clone()))).await?;
        let text = String::from_utf8(data.to_vec())
            .map_err(|e| MpdError::ManifestParse(format!("manifest is not UTF-8: {e}")))?;
        self.on_manifest_loaded(&text, manifest_url)
    }

    /// Handles manifest text that has just been loaded.
    ///
    /// Calling this stands in for the `manifestLoaded` trigger: the event is
    /// published here for observers, then the text is parsed, templates are
    /// merged, `manifestParseCompleted` is published and the plan is built.
    pub fn on_manifest_loaded(
        &self,
        text: &str,
        manifest_url: Url,
    ) -> MpdResult<SegmentRequestPlan> {
        self.bus.trigger(&PlayerEvent::ManifestLoaded {
            manifest_url: manifest_url.clone(),
            text: Arc::from(text),
        });

        let mut root = parse(text, self.config.parse_options())?;
        resolve_templates(&mut root);
        let root = Arc::new(root);
        self.bus.trigger(&PlayerEvent::ManifestParseCompleted {
            manifest: root.clone(),
        });

        let mpd = Mpd::from_root(&root)?;
        let url_tree = UrlNode::build(&mpd);
        let plan = PlanBuilder::new(manifest_url)
            .segment_count(self.config.segment_count)
            .build(&mpd, &url_tree)?;
        tracing::info!("Manifest parsed, {} periods", plan.periods.len());

        Ok(plan)
    }

    /// Loads every period of `plan` in order, publishing each pair as a
    /// [`PlayerEvent::SegmentLoaded`].
    pub async fn run(&self, plan: &SegmentRequestPlan) -> MpdResult<()> {
        let video_key = &self.config.preferred_video_key;
        let audio_key = &self.config.preferred_audio_key;

        for (index, period) in plan.periods.iter().enumerate() {
            let video = period
                .video_urls(video_key)
                .ok_or_else(|| MpdError::KeyNotFound {
                    period: index,
                    key: video_key.clone(),
                })?;
            let audio = period
                .audio_urls(audio_key)
                .ok_or_else(|| MpdError::KeyNotFound {
                    period: index,
                    key: audio_key.clone(),
                })?;

            if video.media.len() != audio.media.len() {
                tracing::warn!(
                    "Period {index}: {} video segments but {} audio segments, loading {}",
                    video.media.len(),
                    audio.media.len(),
                    video.media.len().min(audio.media.len())
                );
            }
            tracing::info!("Period {index}: loading {video_key} video with {audio_key} audio");

            self.load_pair(
                index,
                SegmentKind::Initialization,
                &video.initialization,
                &audio.initialization,
            )
            .await?;
            for (i, (video_url, audio_url)) in video.media.iter().zip(&audio.media).enumerate() {
                self.load_pair(index, SegmentKind::Media(i), video_url, audio_url)
                    .await?;
            }
        }

        tracing::info!("All periods loaded");
        Ok(())
    }

    async fn load_pair(
        &self,
        period: usize,
        kind: SegmentKind,
        video_url: &Url,
        audio_url: &Url,
    ) -> MpdResult<()> {
        let (video, audio) = tokio::try_join!(
            self.fetch(self.request(LoadRequest::new(video_url.clone()))),
            self.fetch(self.request(LoadRequest::new(audio_url.clone()))),
        )?;
        tracing::info!(
            "Period {period} {kind:?} loaded: {} + {} bytes",
            video.len(),
            audio.len()
        );

        self.bus.trigger(&PlayerEvent::SegmentLoaded(SegmentLoaded {
            period,
            kind,
            video_url: video_url.clone(),
            audio_url: audio_url.clone(),
            video,
            audio,
        }));
        Ok(())
    }

    /// Loads `request`, retrying network failures with exponential backoff.
    async fn fetch(&self, request: LoadRequest) -> MpdResult<Bytes> {
        let mut attempt = 0;
        loop {
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    request.notify(LoadEvent::Abort);
                    return Err(MpdError::Cancelled);
                }
                result = self.loader.load(request.clone()) => result,
            };

            match result {
                Ok(bytes) => return Ok(bytes),
                Err(e) if e.is_network() && attempt < self.config.retries => {
                    attempt += 1;
                    let delay = self.config.retry_delay(attempt);
                    tracing::warn!(
                        "Loading {} failed, retry {attempt}/{} in {delay:?}. {e}",
                        request.url,
                        self.config.retries
                    );
                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => {
                            request.notify(LoadEvent::Abort);
                            return Err(MpdError::Cancelled);
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
