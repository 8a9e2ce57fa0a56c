pub mod network;
pub mod replay;
pub mod store;
pub mod wal;
