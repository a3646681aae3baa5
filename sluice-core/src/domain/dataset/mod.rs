// sluice-core/src/domain/dataset/mod.rs

pub mod table;
pub mod value;

pub use table::{Column, Dataset};
pub use value::{DataType, Value};
