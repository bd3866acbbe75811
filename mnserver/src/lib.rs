// Library interface for mnserver modules
// This allows tests and the binary to import modules

pub mod ingestion;
pub mod scheduler;
pub mod scraping;
pub mod server;
pub mod store;
