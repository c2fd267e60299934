//! Domain row types and ownership rules

mod network;
mod user;

pub use network::Network;
pub use user::User;
