// FILE: src/classify/mod.rs
pub mod bouncer;
pub mod mime;

pub use bouncer::Bouncer;
pub use mime::mime_for_path;
