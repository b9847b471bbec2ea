pub mod config_cmd;
pub mod doctor;
pub mod models;
pub mod run;
