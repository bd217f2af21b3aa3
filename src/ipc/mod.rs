pub mod client;
pub mod meta_tools;
pub mod protocol;
pub mod server;
