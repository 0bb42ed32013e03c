pub mod configuration;
pub mod controller;
pub mod error_handling;
pub mod imaging;
pub mod pipeline;
pub mod session_management;
pub mod storage;
pub mod web_interface;

pub use controller::Controller;
pub use pipeline::PipelineController;
