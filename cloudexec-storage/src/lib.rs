pub mod spaces;
pub mod state;
pub mod store;
pub mod transfer;

pub use spaces::SpacesStore;
pub use state::StateStore;
pub use store::{MemoryStore, ObjectStore};
pub use transfer::upload_tree;
