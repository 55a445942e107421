#![allow(
    clippy::module_name_repetitions,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::ignored_unit_patterns
)]

pub mod action;
pub mod config;
pub mod control;
pub mod daemon;
pub mod decoder;
pub mod device;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod event;
pub mod notification;
pub mod state;
pub mod timer;
