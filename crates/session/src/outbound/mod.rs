pub mod blob;
pub mod document;
pub mod identity;
