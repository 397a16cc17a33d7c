pub mod admin;
pub mod aliases;
pub mod app;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod experiments;
pub mod expression;
pub mod fs_util;
pub mod gene_history;
pub mod gene_info;
pub mod heavy;
pub mod matrix;
pub mod network;
pub mod output;
pub mod participation;
pub mod store;
pub mod tribe;
