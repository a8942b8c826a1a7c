pub mod api;
pub mod chart;
pub mod command;
pub mod config;
pub mod console;
pub mod controls;
pub mod dashboard;
pub mod display;
pub mod error;
pub mod metrics;
pub mod poller;
pub mod runtime;
pub mod source;
pub mod storage;
pub mod svg;
pub mod theme;
