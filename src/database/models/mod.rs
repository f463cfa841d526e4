pub mod role;
pub mod token;
pub mod user;

pub use role::Role;
pub use token::{Token, TokenScope};
pub use user::User;
