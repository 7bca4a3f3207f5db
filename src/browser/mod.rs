pub mod launch;
pub mod manager;
pub mod page;
