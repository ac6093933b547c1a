pub mod string;

pub use string::{head_chars, tail_chars, truncate_chars};
