//! Request pipeline middleware.
//!
//! Route-level layers, outermost first: [`AuditLayer`] then
//! [`EnforcementLayer`]. Both share one [`RequestSnapshot`] per request.
//! [`IdentityLayer`] sits on the whole router.

pub mod audit;
pub mod enforcement;
pub mod identity;
pub mod snapshot;

pub use audit::{AuditLayer, AuditService};
pub use enforcement::{EnforcementLayer, EnforcementService};
pub use identity::{identity_from_headers, IdentityLayer, IdentityService};
pub use snapshot::{client_ip, RequestSnapshot, DEFAULT_MAX_BODY_BYTES};
