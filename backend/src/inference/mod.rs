pub mod annotate;
pub mod classifier;
pub mod detector;
pub mod pipeline;
pub mod preprocess;
