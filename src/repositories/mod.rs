pub mod memory;
pub mod session;
pub mod user;

pub use memory::{InMemorySessionStore, InMemoryUserStore};
pub use session::{SessionRepository, SessionStore};
pub use user::{NewUser, UserRepository, UserStore};
