pub mod user;

pub use user::{AdminContext, UserContext};
