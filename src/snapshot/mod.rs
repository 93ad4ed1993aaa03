//! DOM snapshot storage and reconstruction.

pub mod renderer;
pub mod rewrite;
pub mod storage;

pub use renderer::{RenderedFrameSnapshot, SnapshotRenderer};
pub use rewrite::{rewrite_url_for_custom_protocol, unwrap_popout_url};
pub use storage::SnapshotStorage;
