mod search;
pub mod support;
