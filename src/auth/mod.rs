pub mod gate;
pub mod principal;
pub mod tokens;

pub use gate::{require, Decision};
pub use principal::Principal;
pub use tokens::{TokenAuthority, TokenError};
