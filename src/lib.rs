pub mod albums;
pub mod catalog;
pub mod config;
pub mod error;
pub mod frame;
pub mod rotation;
pub mod scan;

pub use error::Error;
pub use frame::PictureFrame;
