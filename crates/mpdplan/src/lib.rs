pub mod config;
pub mod count;
pub mod error;
pub mod event;
pub mod inherit;
pub mod loader;
pub mod manifest;
pub mod plan;
pub mod stream;
pub mod template;
pub mod url;
pub mod util;

/// ┌──────────────┐  manifestLoaded   ┌──────────────┐
/// │    Loader    ├───────────────────►    parse     │
/// └──────▲───────┘                   └──────┬───────┘
///        │                                  │ resolve_templates
///        │                           ┌──────▼───────┐  manifestParseCompleted
///        │                           │ merged tree  ├─────────────────────────►
///        │                           └──────┬───────┘
///        │                                  │ UrlNode::build + PlanBuilder
///        │                           ┌──────▼───────┐
///        │  (video, audio) pairs     │     Plan     │
///        └───────────────────────────┤  period 0..  │
///           one pair in flight       └──────────────┘
///                  │
///                  └──► segmentLoaded: init, media[0], media[1], ...
pub use stream::StreamController;

pub use config::PlayerConfig;
pub use error::*;
pub use event::{EventBus, PlayerEvent, SegmentKind, SegmentLoaded};
pub use loader::{HttpLoader, LoadEvent, LoadHook, LoadRequest, ResponseType, SegmentLoader};
pub use plan::{build_plan, SegmentRequestPlan, SegmentUrls};
pub use util::http::HttpClient;
