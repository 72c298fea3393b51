pub mod fetch;
pub mod isolate;

pub use fetch::{fetch_image, try_fetch_image, HttpImageFetcher, ImageFetcher};
