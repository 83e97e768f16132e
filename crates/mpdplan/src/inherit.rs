//! `SegmentTemplate` inheritance.
//!
//! A template defined on a Period applies to all of its AdaptationSets, and a
//! template on an AdaptationSet applies to all of its Representations. The
//! closer scope wins attribute by attribute: attributes missing on a closer
//! template are filled in from the enclosing one.
//!
//! ```text
//! Period          SegmentTemplate { initialization: A, media: B }
//! ├─ AdaptationSet SegmentTemplate { media: C }
//! │  └─ Representation              => { initialization: A, media: C }
//! └─ AdaptationSet
//!    └─ Representation              => { initialization: A, media: B }
//! ```

use crate::manifest::{
    view::{AdaptationSet, Mpd, Period, Representation, SegmentTemplate},
    ManifestNode, DOCUMENT_TAG, TEXT_TAG,
};

/// Merges templates down every Period of the tree in place.
pub fn resolve_templates(mpd: &mut ManifestNode) {
    if mpd.tag == DOCUMENT_TAG {
        for mpd in mpd.all_mut(Mpd::TAG) {
            resolve_templates(mpd);
        }
        return;
    }

    for period in mpd.all_mut(Period::TAG) {
        let inherited = period.first(SegmentTemplate::TAG).cloned();
        for adaptation_set in period.all_mut(AdaptationSet::TAG) {
            resolve_adaptation_set(adaptation_set, inherited.as_ref());
        }
    }
}

/// Siblings receive the same `inherited` value, so an override in one
/// AdaptationSet never leaks into the next.
fn resolve_adaptation_set(adaptation_set: &mut ManifestNode, inherited: Option<&ManifestNode>) {
    let has_own = adaptation_set.has(SegmentTemplate::TAG);
    if let Some(inherited) = inherited {
        merge_node(adaptation_set, inherited);
    }

    let effective = if has_own {
        adaptation_set.first(SegmentTemplate::TAG).cloned()
    } else {
        inherited.cloned()
    };
    let Some(effective) = effective else {
        return;
    };

    for representation in adaptation_set.all_mut(Representation::TAG) {
        merge_node(representation, &effective);
    }
}

/// Fill-gap merge of `template` into `target`.
///
/// Without an own child of the template's tag, `target` receives a copy of
/// `template`. Otherwise the first such child is kept and only gains the
/// attributes and child elements it does not define itself.
pub fn merge_node(target: &mut ManifestNode, template: &ManifestNode) {
    if !target.has(&template.tag) {
        tracing::debug!("attaching inherited <{}> to <{}>", template.tag, target.tag);
        target.push_child(template.clone());
        return;
    }

    if let Some(existing) = target.first_mut(&template.tag) {
        for (key, value) in &template.attributes {
            if !existing.attributes.contains_key(key) {
                existing.attributes.insert(key.clone(), value.clone());
            }
        }

        for tag in template.tags().filter(|tag| *tag != TEXT_TAG) {
            if !existing.has(tag) {
                for child in template.all(tag) {
                    existing.push_child(child.clone());
                }
            }
        }
    }
}
