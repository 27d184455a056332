pub mod filters;
pub mod movie;
pub mod permission;
pub mod runtime;
pub mod token;
pub mod user;

pub use filters::{Filters, Metadata};
pub use movie::Movie;
pub use permission::Permissions;
pub use runtime::Runtime;
pub use token::{Scope, Token, TokenRecord};
pub use user::{Password, User};
