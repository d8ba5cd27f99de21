mod backend;
mod backends;
pub mod labels;
pub mod postprocess;
mod registry;
mod result;

pub use backend::{detect_timed, DetectorBackend, TimedDetections};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use backends::{StubBackend, StubScript};
pub use registry::{open_backend, BackendKind};
pub use result::{BoundingBox, Detection};
