pub mod auth;
pub mod comments;
pub mod pages;

pub use auth::auth_routes;
pub use comments::comments_routes;
pub use pages::pages_routes;
