pub mod client;

pub use client::{first_output_image, normalize_base_url, ComfyUIClient, ImageRef};
