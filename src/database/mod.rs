pub mod error;
pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

pub use error::DatabaseError;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{RoleRepository, Store, TokenRepository, UserRepository};
