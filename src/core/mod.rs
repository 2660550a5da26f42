pub mod classifier;
pub mod generator;
pub mod pipeline;
pub mod templates;
pub mod validator;
