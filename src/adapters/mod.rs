pub mod in_memory;
pub mod postgres_session_repository;
pub mod postgres_transaction_repository;

pub use in_memory::{InMemorySessionRepository, InMemoryStore, InMemoryTransactionRepository};
pub use postgres_session_repository::PostgresSessionRepository;
pub use postgres_transaction_repository::PostgresTransactionRepository;
