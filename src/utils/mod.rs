pub mod clock;
pub mod deadline;
pub mod logger;
