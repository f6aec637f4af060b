//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, HTTP transaction)
//! 2. `TraceLayer` (request span)
//! 3. Request ID (recorded on the span, echoed in the response)
//! 4. CORS (when origins are configured)
//! 5. Rate limiting (governor, `/auth` only)
//! 6. Session resolution (`/cart` and `/orders` only)

pub mod rate_limit;
pub mod request_id;
pub mod session;

pub use rate_limit::auth_rate_limiter;
pub use request_id::{REQUEST_ID_HEADER, RequestId, make_request_span, request_id_middleware};
pub use session::{
    CurrentSession, SESSION_COOKIE_NAME, removal_cookie, session_cookie, session_cookie_value,
    session_middleware, set_cookie,
};
