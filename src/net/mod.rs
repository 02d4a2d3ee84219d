pub mod client;
pub mod protocol;
pub mod server;

pub use client::GameClient;
pub use server::GameServer;
