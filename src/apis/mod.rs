//! Built-in capability modules
//!
//! Each module contributes its operations through a `register` function
//! called from [`register_all`]. Operation names that would collide with
//! a language keyword are registered with a trailing `_`, which the
//! registry strips.

use crate::api::ApiRegistry;
use crate::syntax::{ParamSchema, ParamType};

pub mod net;
pub mod session;
pub mod text;

pub fn register_all(reg: &mut ApiRegistry) {
    net::register(reg);
    session::register(reg);
    text::register(reg);
}

/// Shorthand for a flag-style parameter schema entry.
pub(crate) fn flag_param(
    name: &str,
    flag: &str,
    ty: ParamType,
    required: bool,
    default: &str,
    position: usize,
) -> ParamSchema {
    ParamSchema {
        name: name.to_string(),
        ty,
        required,
        default: if default.is_empty() && required {
            None
        } else {
            Some(default.to_string())
        },
        flag: Some(flag.to_string()),
        position,
        choices: Vec::new(),
    }
}
