pub mod auth;
pub mod cli;
pub mod clues;
pub mod config;
pub mod controller;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod progress;
pub mod puzzle;
pub mod server;
pub mod validator;
