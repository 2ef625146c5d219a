pub mod completion;
pub mod config;
pub mod export;
pub mod scan;
pub mod selection;
pub mod stats;
pub mod template;
pub mod tree;
