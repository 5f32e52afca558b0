//! Application services: bounded rendering, background delivery and downloads.

pub mod dispatch;
pub mod documents;
pub mod downloads;
pub mod error;
pub mod jobs;
pub mod notify;
pub mod render;
pub mod repos;
