mod server;

pub use server::{ServerConfig, normalize_base_url};
