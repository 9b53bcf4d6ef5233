//! Backend HTTP boundary tests
//!
//! BackendClient against a wiremock server, and full attempts driven
//! through it.

mod requester;
