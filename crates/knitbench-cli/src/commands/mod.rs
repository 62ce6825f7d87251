pub mod compare;
pub mod init;
pub mod list_cases;
pub mod list_models;
pub mod review;
pub mod run;
pub mod validate;
