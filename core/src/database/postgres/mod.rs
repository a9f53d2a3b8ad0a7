pub mod client;
pub mod generate;
