pub mod cookie_store;
pub mod inspector;
pub mod resolver;
pub mod scorer;
