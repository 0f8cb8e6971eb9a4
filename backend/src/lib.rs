pub mod config;
pub mod imaging;
pub mod prediction;
pub mod pyprocess;
pub mod routes;
pub mod storage;
