pub mod event;
pub mod function;
pub mod ids;
pub mod milestone;
pub mod project;
pub mod ticket;
pub mod validation;
