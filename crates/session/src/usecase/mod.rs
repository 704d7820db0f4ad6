pub mod collection;
pub mod store;
pub mod sync;
pub mod view;
