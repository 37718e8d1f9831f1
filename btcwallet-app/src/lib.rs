//! Front ends for the BTC wallet: a clap command line with an interactive
//! shell, and an axum HTTP API. Both drive the same [`context::AppContext`].

pub mod cli;
pub mod context;
pub mod server;
