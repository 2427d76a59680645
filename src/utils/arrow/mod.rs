//! Arrow utilities
//!
//! Helpers for column lookup and type normalization on record batches.

pub mod array_utils;

pub use array_utils::{
    boolean_column, downcast_array, float_column, get_column_by_name, get_column_index,
    project_columns, replace_column, require_columns, string_column,
};
