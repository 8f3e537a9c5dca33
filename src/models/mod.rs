pub mod connection;
pub mod requests;
pub mod transfer;

pub use connection::*;
pub use requests::*;
pub use transfer::*;
