pub mod core;
pub mod import;
pub mod marks;
pub mod reports;
pub mod support;
