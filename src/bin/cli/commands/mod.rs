pub mod cat;
pub mod create;
pub mod download;
pub mod modify;
pub mod tree;
