pub mod batch;
pub mod markers;
pub mod processors;
pub mod run;
pub mod validate;
