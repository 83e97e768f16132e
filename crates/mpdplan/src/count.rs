//! How many media segments a Representation has.
//!
//! The manifest rarely states it directly, so the count is derived from the
//! first source available:
//!
//! 1. a `SegmentTimeline`, summing `r + 1` over its `<S>` entries;
//! 2. `SegmentTemplate@duration` and the duration of the enclosing Period;
//! 3. a count configured by the caller.

use std::time::Duration;

use crate::{
    manifest::view::{Mpd, SegmentTemplate, TimelineEntry},
    MpdError, MpdResult,
};

const NANOS_PER_SEC: u128 = 1_000_000_000;
/// Upper bound on the segments of one Representation.
const MAX_SEGMENTS: usize = 1 << 24;

/// Duration of every Period, in manifest order, where it can be known.
///
/// A Period lasts for `Period@duration`, or until the next Period starts, or
/// until the end of the presentation for the last one. A Period without
/// `@start` begins where the previous one ends.
pub fn period_durations(mpd: &Mpd) -> MpdResult<Vec<Option<Duration>>> {
    let mut starts: Vec<Option<Duration>> = Vec::new();
    let mut explicit: Vec<Option<Duration>> = Vec::new();

    for (index, period) in mpd.periods().enumerate() {
        let duration = period.duration()?;
        let start = match period.start()? {
            Some(start) => Some(start),
            None if index == 0 => Some(Duration::ZERO),
            None => match (starts[index - 1], explicit[index - 1]) {
                (Some(start), Some(duration)) => Some(start + duration),
                _ => None,
            },
        };
        starts.push(start);
        explicit.push(duration);
    }

    let total = mpd.media_presentation_duration()?;
    Ok((0..starts.len())
        .map(|index| {
            explicit[index].or_else(|| {
                let start = starts[index]?;
                let end = match starts.get(index + 1) {
                    Some(next) => (*next)?,
                    None => total?,
                };
                end.checked_sub(start)
            })
        })
        .collect())
}

/// Number of media segments described by `template` within a period of `period_duration`.
pub fn segment_count(
    template: Option<&SegmentTemplate>,
    period_duration: Option<Duration>,
    fallback: Option<usize>,
) -> MpdResult<usize> {
    if let Some(template) = template {
        let timescale = template.timescale()?.unwrap_or(1).max(1);

        if let Some(timeline) = template.segment_timeline() {
            return timeline_count(&timeline.entries()?, timescale, period_duration);
        }

        if let (Some(duration), Some(period_duration)) = (template.duration()?, period_duration) {
            if duration == 0 {
                return Err(MpdError::ManifestParse(
                    "SegmentTemplate@duration must not be zero".to_string(),
                ));
            }
            let period = period_duration.as_nanos() * timescale as u128;
            let segment = duration as u128 * NANOS_PER_SEC;
            return checked_count(period.div_ceil(segment));
        }
    }

    fallback.ok_or_else(|| {
        MpdError::UnknownSegmentCount(
            "no SegmentTimeline, no SegmentTemplate@duration with a known period duration, and no configured count"
                .to_string(),
        )
    })
}

fn timeline_count(
    entries: &[TimelineEntry],
    timescale: u64,
    period_duration: Option<Duration>,
) -> MpdResult<usize> {
    let overflow = || MpdError::ManifestParse("SegmentTimeline is too long".to_string());
    let mut count = 0usize;
    let mut time = 0u128;

    for (index, entry) in entries.iter().enumerate() {
        if entry.duration == 0 {
            return Err(MpdError::ManifestParse("S@d must not be zero".to_string()));
        }
        if let Some(t) = entry.time {
            time = t as u128;
        }

        let repeat = if entry.repeat >= 0 {
            entry.repeat as u128
        } else {
            // repeat until the next S@t, or until the period ends after the last entry
            let end = match entries.get(index + 1) {
                Some(next) => next.time.map(u128::from).ok_or_else(|| {
                    MpdError::ManifestParse(
                        "negative S@r must be followed by an S with @t".to_string(),
                    )
                })?,
                None => {
                    let period_duration = period_duration.ok_or_else(|| {
                        MpdError::UnknownSegmentCount(
                            "negative S@r needs a known period duration".to_string(),
                        )
                    })?;
                    period_duration.as_nanos() * timescale as u128 / NANOS_PER_SEC
                }
            };
            end.saturating_sub(time)
                .div_ceil(entry.duration as u128)
                .saturating_sub(1)
        };

        let segments = repeat.checked_add(1).ok_or_else(overflow)?;
        count = usize::try_from(segments)
            .ok()
            .and_then(|segments| count.checked_add(segments))
            .ok_or_else(overflow)?;
        time = segments
            .checked_mul(entry.duration as u128)
            .and_then(|elapsed| time.checked_add(elapsed))
            .ok_or_else(overflow)?;
    }

    checked_count(count as u128)
}

fn checked_count(count: u128) -> MpdResult<usize> {
    match usize::try_from(count) {
        Ok(count) if count <= MAX_SEGMENTS => Ok(count),
        _ => Err(MpdError::ManifestParse(format!(
            "{count} segments exceed the limit of {MAX_SEGMENTS}"
        ))),
    }
}
