pub mod connection;
#[cfg(test)]
pub mod memory;
pub mod mongo;
pub mod repository;
