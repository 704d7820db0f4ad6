pub mod config;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod rejection;
pub mod response;
pub mod storage;
pub mod time;
pub mod token;
