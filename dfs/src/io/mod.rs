mod image;

pub use image::{DiskImage, DiskImageBuilder};
