pub mod backend;
pub mod config;
pub mod controller;
pub mod environment;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod loopback;
pub mod model;
pub mod notification;
pub mod server;
pub mod worker;
