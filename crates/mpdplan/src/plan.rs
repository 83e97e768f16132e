use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    count::{period_durations, segment_count},
    inherit::resolve_templates,
    manifest::{
        parse,
        view::{AdaptationSet, Mpd, Representation},
        ParseOptions,
    },
    template::{expand, expand_media, TemplateContext},
    url::{manifest_base_url, merge_baseurls, UrlNode},
    MpdError, MpdResult,
};

pub const DEFAULT_LANG: &str = "en";

/// Every segment URL of a manifest, grouped by period and track.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentRequestPlan {
    pub periods: Vec<PeriodSegmentRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodSegmentRequest {
    pub video: Vec<VideoSegmentRequest>,
    pub audio: Vec<AudioSegmentRequest>,
}

/// One video AdaptationSet. Representations are keyed by `{width}x{height}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoSegmentRequest {
    pub representations: IndexMap<String, SegmentUrls>,
}

/// One audio AdaptationSet. Representations are keyed by sample rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioSegmentRequest {
    pub lang: String,
    pub representations: IndexMap<String, SegmentUrls>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentUrls {
    pub initialization: Url,
    pub media: Vec<Url>,
}

impl SegmentRequestPlan {
    pub fn period(&self, index: usize) -> Option<&PeriodSegmentRequest> {
        self.periods.get(index)
    }

    pub fn is_empty(&self) -> bool {
        self.periods.is_empty()
    }
}

impl PeriodSegmentRequest {
    /// URLs of the first video AdaptationSet offering `key`.
    pub fn video_urls(&self, key: &str) -> Option<&SegmentUrls> {
        self.video
            .iter()
            .find_map(|request| request.representations.get(key))
    }

    /// URLs of the first audio AdaptationSet offering `key`.
    pub fn audio_urls(&self, key: &str) -> Option<&SegmentUrls> {
        self.audio
            .iter()
            .find_map(|request| request.representations.get(key))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackType {
    Video,
    Audio,
}

impl TrackType {
    /// Only fragmented MP4 tracks are planned, anything else is skipped.
    pub fn from_mime_type(mime_type: Option<&str>) -> Option<Self> {
        match mime_type? {
            "video/mp4" => Some(Self::Video),
            "audio/mp4" => Some(Self::Audio),
            _ => None,
        }
    }
}

pub struct PlanBuilder {
    manifest_url: Url,
    segment_count: Option<usize>,
}

impl PlanBuilder {
    pub fn new(manifest_url: Url) -> Self {
        Self {
            manifest_url,
            segment_count: None,
        }
    }

    /// Segment count to use when the manifest does not determine one.
    pub fn segment_count(mut self, count: Option<usize>) -> Self {
        self.segment_count = count;
        self
    }

    /// Builds the plan from a manifest whose templates have already been merged.
    pub fn build(&self, mpd: &Mpd, url_tree: &UrlNode) -> MpdResult<SegmentRequestPlan> {
        let base_url = manifest_base_url(mpd, &self.manifest_url)?;
        let durations = period_durations(mpd)?;

        let mut plan = SegmentRequestPlan::default();
        for (i, period) in mpd.periods().enumerate() {
            let mut request = PeriodSegmentRequest::default();

            for (j, adaptation_set) in period.adaptation_sets().enumerate() {
                let mime_type = adaptation_set.mime_type().or_else(|| {
                    adaptation_set
                        .representations()
                        .next()
                        .and_then(|r| r.mime_type())
                });
                let Some(track) = TrackType::from_mime_type(mime_type) else {
                    tracing::debug!(
                        "Skipping adaptation set {j} of period {i} with mime type {mime_type:?}"
                    );
                    continue;
                };

                let representations = self.representations(
                    &adaptation_set,
                    track,
                    (i, j),
                    &base_url,
                    url_tree,
                    durations.get(i).copied().flatten(),
                )?;
                match track {
                    TrackType::Video => {
                        request.video.push(VideoSegmentRequest { representations })
                    }
                    TrackType::Audio => request.audio.push(AudioSegmentRequest {
                        lang: adaptation_set.lang().unwrap_or(DEFAULT_LANG).to_string(),
                        representations,
                    }),
                }
            }

            tracing::debug!(
                "Period {i}: {} video and {} audio adaptation sets",
                request.video.len(),
                request.audio.len()
            );
            plan.periods.push(request);
        }

        Ok(plan)
    }

    fn representations(
        &self,
        adaptation_set: &AdaptationSet,
        track: TrackType,
        (i, j): (usize, usize),
        base_url: &Url,
        url_tree: &UrlNode,
        period_duration: Option<Duration>,
    ) -> MpdResult<IndexMap<String, SegmentUrls>> {
        let mut result = IndexMap::new();

        for (k, representation) in adaptation_set.representations().enumerate() {
            let fragment = url_tree.resolve(&[i, j, k])?;
            let base_url = merge_baseurls(base_url, &fragment)?;
            let urls = self.segment_urls(&representation, &base_url, period_duration)?;

            let key = representation_key(&representation, track, k)?;
            if result.insert(key.clone(), urls).is_some() {
                tracing::warn!("Duplicated representation key {key} in period {i}, keeping the last one");
            }
        }

        Ok(result)
    }

    fn segment_urls(
        &self,
        representation: &Representation,
        base_url: &Url,
        period_duration: Option<Duration>,
    ) -> MpdResult<SegmentUrls> {
        let id = representation.id();
        let template = representation.segment_template();
        let missing = |attribute: &str| {
            MpdError::Template(format!(
                "representation {} has no {attribute} template",
                id.unwrap_or("<unnamed>")
            ))
        };

        let initialization = template
            .and_then(|t| t.initialization())
            .ok_or_else(|| missing("initialization"))?;
        let media = template
            .and_then(|t| t.media())
            .ok_or_else(|| missing("media"))?;
        let start_number = match template {
            Some(template) => template.start_number()?.unwrap_or(1),
            None => 1,
        };
        let count = segment_count(template.as_ref(), period_duration, self.segment_count)?;

        let context = TemplateContext {
            number: None,
            representation_id: id.map(str::to_string),
        };
        let initialization = merge_baseurls(base_url, &expand(initialization, &context.clone().number(1))?)?;
        let media = expand_media(media, &context, start_number, count)?
            .iter()
            .map(|path| merge_baseurls(base_url, path))
            .collect::<MpdResult<Vec<_>>>()?;

        Ok(SegmentUrls {
            initialization,
            media,
        })
    }
}

/// `{width}x{height}` for video and the sample rate for audio, falling back to
/// the Representation id and then its position.
fn representation_key(
    representation: &Representation,
    track: TrackType,
    index: usize,
) -> MpdResult<String> {
    let key = match track {
        TrackType::Video => match (representation.width()?, representation.height()?) {
            (Some(width), Some(height)) => Some(format!("{width}x{height}")),
            _ => None,
        },
        TrackType::Audio => representation.audio_sampling_rate().map(str::to_string),
    };

    Ok(key
        .or_else(|| representation.id().map(str::to_string))
        .unwrap_or_else(|| index.to_string()))
}

/// Parses `text`, merges inherited templates and builds the plan.
pub fn build_plan(
    text: &str,
    manifest_url: Url,
    options: ParseOptions,
    segment_count: Option<usize>,
) -> MpdResult<SegmentRequestPlan> {
    let mut root = parse(text, options)?;
    resolve_templates(&mut root);

    let mpd = Mpd::from_root(&root)?;
    let url_tree = UrlNode::build(&mpd);
    PlanBuilder::new(manifest_url)
        .segment_count(segment_count)
        .build(&mpd, &url_tree)
}
