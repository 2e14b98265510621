// Service exports
pub mod appwrite;
pub mod backend;

pub use appwrite::{AppwriteClient, AppwriteCollections};
pub use backend::{BackendError, BookingService, ProviderDirectory};
