pub mod dto;
mod ext;
mod files;
pub mod response;
mod router;
mod v1;
pub mod validation;

pub use router::{AppState, BUILD_INFO, BuildInfo, create_router};
