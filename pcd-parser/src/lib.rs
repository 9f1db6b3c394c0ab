pub mod parsers;
pub mod reader;

pub use parsers::las::decode;
pub use reader::las::scan_labels;
