pub mod openai_api;
