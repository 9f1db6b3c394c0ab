pub mod las;

pub use self::las::{encode, EncodeOptions, EncodeSummary};
