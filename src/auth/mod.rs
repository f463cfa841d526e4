pub mod clock;
pub mod guards;
pub mod password;
pub mod principal;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use guards::{authorize, enforce, ensure_self_or_role, Gate, Policy};
pub use password::{Password, PasswordError, PasswordHashing};
pub use principal::{authenticate, resolve_principal, Principal};
pub use token::{TokenError, TokenService};
