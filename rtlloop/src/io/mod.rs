pub mod config;
pub mod filelist;
pub mod generator;
pub mod process;
pub mod prompt;
pub mod reviewer;
pub mod run_log;
pub mod verifier;
