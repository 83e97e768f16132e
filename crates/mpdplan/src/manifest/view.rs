//! Typed, read-only projections over [`ManifestNode`].
//!
//! Views borrow the generic tree and only interpret attributes when asked,
//! so a malformed value is reported by the accessor that needs it.

use std::time::Duration;

use super::ManifestNode;
use crate::{MpdError, MpdResult};

macro_rules! node_view {
    ($(#[$meta:meta])* $name:ident => $tag:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name<'a>(&'a ManifestNode);

        impl<'a> $name<'a> {
            pub const TAG: &'static str = $tag;

            pub fn new(node: &'a ManifestNode) -> MpdResult<Self> {
                if node.tag == Self::TAG {
                    Ok(Self(node))
                } else {
                    Err(MpdError::ManifestParse(format!(
                        "expected <{}>, found <{}>",
                        Self::TAG,
                        node.tag
                    )))
                }
            }

            pub fn node(&self) -> &'a ManifestNode {
                self.0
            }
        }
    };
}

node_view!(
    /// Root of the media presentation description.
    Mpd => "MPD"
);
node_view!(
    /// A time-bounded section of the presentation.
    Period => "Period"
);
node_view!(AdaptationSet => "AdaptationSet");
node_view!(Representation => "Representation");
node_view!(
    /// Pattern for initialization and media segment URLs.
    SegmentTemplate => "SegmentTemplate"
);
node_view!(SegmentTimeline => "SegmentTimeline");
node_view!(BaseUrl => "BaseURL");

fn base_url_of(node: &ManifestNode) -> Option<&str> {
    node.first(BaseUrl::TAG).map(|n| BaseUrl(n).url())
}

impl<'a> Mpd<'a> {
    /// Accepts either the `MPD` element or a retained document node wrapping it.
    pub fn from_root(root: &'a ManifestNode) -> MpdResult<Self> {
        if root.tag == super::DOCUMENT_TAG {
            let mpd = root.first(Self::TAG).ok_or_else(|| {
                MpdError::ManifestParse("document has no <MPD> element".to_string())
            })?;
            Self::new(mpd)
        } else {
            Self::new(root)
        }
    }

    pub fn periods(&self) -> impl Iterator<Item = Period<'a>> {
        self.0.all(Period::TAG).map(Period)
    }

    /// `static` or `dynamic`.
    pub fn mpd_type(&self) -> Option<&'a str> {
        self.0.attr("type")
    }

    pub fn base_url(&self) -> Option<&'a str> {
        base_url_of(self.0)
    }

    pub fn media_presentation_duration(&self) -> MpdResult<Option<Duration>> {
        self.0.duration_attr("mediaPresentationDuration")
    }

    pub fn min_buffer_time(&self) -> MpdResult<Option<Duration>> {
        self.0.duration_attr("minBufferTime")
    }
}

impl<'a> Period<'a> {
    pub fn id(&self) -> Option<&'a str> {
        self.0.attr("id")
    }

    pub fn start(&self) -> MpdResult<Option<Duration>> {
        self.0.duration_attr("start")
    }

    pub fn duration(&self) -> MpdResult<Option<Duration>> {
        self.0.duration_attr("duration")
    }

    pub fn adaptation_sets(&self) -> impl Iterator<Item = AdaptationSet<'a>> {
        self.0.all(AdaptationSet::TAG).map(AdaptationSet)
    }

    pub fn segment_template(&self) -> Option<SegmentTemplate<'a>> {
        self.0.first(SegmentTemplate::TAG).map(SegmentTemplate)
    }

    pub fn base_url(&self) -> Option<&'a str> {
        base_url_of(self.0)
    }
}

impl<'a> AdaptationSet<'a> {
    pub fn mime_type(&self) -> Option<&'a str> {
        self.0.attr("mimeType")
    }

    pub fn content_type(&self) -> Option<&'a str> {
        self.0.attr("contentType")
    }

    pub fn lang(&self) -> Option<&'a str> {
        self.0.attr("lang")
    }

    pub fn segment_alignment(&self) -> MpdResult<Option<bool>> {
        self.0.parse_attr("segmentAlignment")
    }

    pub fn start_with_sap(&self) -> MpdResult<Option<u32>> {
        self.0.parse_attr("startWithSAP")
    }

    pub fn representations(&self) -> impl Iterator<Item = Representation<'a>> {
        self.0.all(Representation::TAG).map(Representation)
    }

    pub fn segment_template(&self) -> Option<SegmentTemplate<'a>> {
        self.0.first(SegmentTemplate::TAG).map(SegmentTemplate)
    }

    pub fn base_url(&self) -> Option<&'a str> {
        base_url_of(self.0)
    }
}

impl<'a> Representation<'a> {
    pub fn id(&self) -> Option<&'a str> {
        self.0.attr("id")
    }

    /// Some packagers spell the attribute `bandWidth`.
    pub fn bandwidth(&self) -> MpdResult<Option<u64>> {
        match self.0.parse_attr("bandwidth")? {
            Some(bandwidth) => Ok(Some(bandwidth)),
            None => self.0.parse_attr("bandWidth"),
        }
    }

    pub fn codecs(&self) -> Option<&'a str> {
        self.0.attr("codecs")
    }

    pub fn width(&self) -> MpdResult<Option<u64>> {
        self.0.parse_attr("width")
    }

    pub fn height(&self) -> MpdResult<Option<u64>> {
        self.0.parse_attr("height")
    }

    pub fn mime_type(&self) -> Option<&'a str> {
        self.0.attr("mimeType")
    }

    pub fn audio_sampling_rate(&self) -> Option<&'a str> {
        self.0.attr("audioSamplingRate")
    }

    pub fn segment_template(&self) -> Option<SegmentTemplate<'a>> {
        self.0.first(SegmentTemplate::TAG).map(SegmentTemplate)
    }

    pub fn base_url(&self) -> Option<&'a str> {
        base_url_of(self.0)
    }
}

impl<'a> SegmentTemplate<'a> {
    pub fn initialization(&self) -> Option<&'a str> {
        self.0.attr("initialization")
    }

    pub fn media(&self) -> Option<&'a str> {
        self.0.attr("media")
    }

    pub fn start_number(&self) -> MpdResult<Option<u64>> {
        self.0.parse_attr("startNumber")
    }

    pub fn timescale(&self) -> MpdResult<Option<u64>> {
        self.0.parse_attr("timescale")
    }

    /// Nominal segment duration, in `timescale` units.
    pub fn duration(&self) -> MpdResult<Option<u64>> {
        self.0.parse_attr("duration")
    }

    pub fn segment_timeline(&self) -> Option<SegmentTimeline<'a>> {
        self.0.first(SegmentTimeline::TAG).map(SegmentTimeline)
    }
}

/// One `<S>` element of a segment timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineEntry {
    pub time: Option<u64>,
    pub duration: u64,
    /// Only additional segments are counted, so `r=5` means six segments in total.
    /// A negative value repeats until the next `S@t`, or the end of the period.
    pub repeat: i64,
}

impl SegmentTimeline<'_> {
    pub fn entries(&self) -> MpdResult<Vec<TimelineEntry>> {
        self.0
            .all("S")
            .map(|s| {
                Ok::<_, MpdError>(TimelineEntry {
                    time: s.parse_attr("t")?,
                    duration: s.parse_attr("d")?.ok_or_else(|| {
                        MpdError::ManifestParse("missing S@d in SegmentTimeline".to_string())
                    })?,
                    repeat: s.parse_attr("r")?.unwrap_or(0),
                })
            })
            .collect()
    }
}

impl<'a> BaseUrl<'a> {
    pub fn url(&self) -> &'a str {
        self.0.text.as_deref().map(str::trim).unwrap_or_default()
    }
}
