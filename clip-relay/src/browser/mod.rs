//! Remote browser sessions and the publish surface adapter.

mod cdp;
mod session;
mod surface;

pub use cdp::CdpClient;
pub use session::{GenloginSessionProvider, SessionProvider, acquire_with_retry};
pub use surface::{CdpPublishSurface, CdpSurfaceFactory, SurfaceFactory};
