pub mod comment;
pub mod user;

pub use comment::*;
pub use user::*;
