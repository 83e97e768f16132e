use serde::Serialize;
use url::Url;

use crate::{
    manifest::view::{AdaptationSet, Mpd, Period, Representation},
    MpdError, MpdResult,
};

pub(crate) fn is_absolute_url(s: &str) -> bool {
    s.starts_with("http://")
        || s.starts_with("https://")
        || s.starts_with("file://")
        || s.starts_with("ftp://")
}

/// Resolves `new` against `current` like a browser resolves a relative link.
pub fn merge_baseurls(current: &Url, new: &str) -> MpdResult<Url> {
    if is_absolute_url(new) {
        Ok(Url::parse(new)?)
    } else {
        // The query of `current` (often an auth token on the manifest URL)
        // carries over unless `new` brings its own.
        //
        //   manifest.mpd?auth=secret + /video42.mp4          => /video42.mp4?auth=secret
        //   manifest.mpd?auth=old    + /video42.mp4?auth=new => /video42.mp4?auth=new
        let mut merged = current.join(new)?;
        if merged.query().is_none() {
            merged.set_query(current.query());
        }
        Ok(merged)
    }
}

/// The base every segment of a manifest is resolved against: the manifest's own
/// location, refined by a top-level `<BaseURL>` when there is one.
pub fn manifest_base_url(mpd: &Mpd, manifest_url: &Url) -> MpdResult<Url> {
    match mpd.base_url() {
        Some(base_url) if !base_url.is_empty() => merge_baseurls(manifest_url, base_url),
        _ => Ok(manifest_url.clone()),
    }
}

/// `<BaseURL>` fragments laid out like the Period / AdaptationSet / Representation
/// hierarchy. Nodes are addressed by position, not by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UrlNode {
    pub url: Option<String>,
    pub children: Vec<UrlNode>,
}

impl UrlNode {
    pub fn new(url: Option<&str>) -> Self {
        Self {
            url: url.map(str::to_string),
            children: Vec::new(),
        }
    }

    /// Builds the tree for every Period of `mpd`. The root itself carries no fragment.
    pub fn build(mpd: &Mpd) -> Self {
        let mut root = Self::new(None);
        root.children = mpd.periods().map(|p| Self::period(&p)).collect();
        root
    }

    fn period(period: &Period) -> Self {
        let mut node = Self::new(period.base_url());
        node.children = period
            .adaptation_sets()
            .map(|a| Self::adaptation_set(&a))
            .collect();
        node
    }

    fn adaptation_set(adaptation_set: &AdaptationSet) -> Self {
        let mut node = Self::new(adaptation_set.base_url());
        node.children = adaptation_set
            .representations()
            .map(|r: Representation| Self::new(r.base_url()))
            .collect();
        node
    }

    pub fn child(&self, index: usize) -> Option<&UrlNode> {
        self.children.get(index)
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Concatenates the fragments along `path`, root to leaf.
    ///
    /// The path must name an existing node at every level and end on a leaf,
    /// i.e. a Representation.
    pub fn resolve(&self, path: &[usize]) -> MpdResult<String> {
        let mut base_url = String::new();
        let mut node = self;
        for &index in path {
            node = node.child(index).ok_or_else(|| MpdError::InvalidPath {
                path: path.to_vec(),
                reason: "index out of range",
            })?;
            if let Some(url) = &node.url {
                base_url.push_str(url);
            }
        }

        if !node.is_leaf() {
            return Err(MpdError::InvalidPath {
                path: path.to_vec(),
                reason: "path does not end at a representation",
            });
        }

        Ok(base_url)
    }
}
