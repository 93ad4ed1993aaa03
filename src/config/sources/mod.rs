pub mod environment;
pub mod user_file;
