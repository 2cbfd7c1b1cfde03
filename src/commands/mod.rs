pub mod chat;
pub mod query;

pub use chat::*;
pub use query::*;
