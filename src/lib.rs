#![allow(clippy::collapsible_if)]

pub mod catalog;
pub mod config;
pub mod dispatch;
pub mod logging;
pub mod net;
pub mod roles;
pub mod session;
