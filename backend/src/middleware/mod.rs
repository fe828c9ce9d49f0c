//! Request middleware: session authentication and CSRF

pub mod auth;
pub mod csrf;

pub use auth::{auth_middleware, Access, AuthUser, CurrentUser};
pub use csrf::{csrf_middleware, csrf_token};
