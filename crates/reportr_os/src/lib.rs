#![forbid(unsafe_code)]

pub mod desk;
pub mod export;
pub mod identity;
pub mod policy;
pub mod session;

pub use desk::{GateError, ReportDesk};
pub use identity::IdentityVerifier;
pub use policy::AdminAllowList;
pub use session::{SessionContext, SessionRegistry, SessionToken};
