pub mod request_loader;

pub use request_loader::{load_batch_request, load_direct_request, load_rubric, load_text};
