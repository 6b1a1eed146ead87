pub mod openai;
pub mod usage;
