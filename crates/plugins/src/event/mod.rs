//! Builtin event plugins.

pub mod template;
