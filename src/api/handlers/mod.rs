pub mod connection;
pub mod transfer;
pub mod upload;
