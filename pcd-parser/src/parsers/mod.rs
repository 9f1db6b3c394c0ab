use pcd_core::{error::Result, pointcloud::PointCloud};

pub mod csv;
pub mod las;
pub mod mapping;

pub trait ParserProvider {
    fn get_parser(&self) -> Box<dyn Parser>;
}

pub trait Parser {
    fn parse(&self) -> Result<PointCloud>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    Las,
    Laz,
}

impl Extension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Extension::Las => "las",
            Extension::Laz => "laz",
        }
    }
}

pub fn get_extension(extension: &str) -> Option<Extension> {
    match extension.to_ascii_lowercase().as_str() {
        "las" => Some(Extension::Las),
        "laz" => Some(Extension::Laz),
        _ => None,
    }
}
