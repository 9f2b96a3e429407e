pub mod admission;
pub mod api;
pub mod archive;
pub mod checksum;
pub mod config;
pub mod fetch;
pub mod humanize;
pub mod job;
pub mod notify;
pub mod observability;
pub mod pipeline;
pub mod sink;
pub mod storage;
