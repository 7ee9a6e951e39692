//! Opcode handlers, grouped by concern.

pub mod arithmetic;
pub mod attribute;
pub mod calls;
pub mod containers;
pub mod control;
pub mod exception;
pub mod kw_binding;
pub mod load_store;
