#![forbid(unsafe_code)]

pub mod book;
pub mod build;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod extract;
pub mod fetch;
pub mod formats;
pub mod images;
pub mod index;
pub mod logging;
pub mod markdown;
pub mod raw_store;
pub mod toc;
