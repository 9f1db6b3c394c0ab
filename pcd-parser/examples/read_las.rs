use std::path::PathBuf;

use pcd_parser::parsers::{las::LasParserProvider, ParserProvider as _};

fn main() {
    let filename = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("pcd-parser/examples/data/sample.laz"));
    let provider = LasParserProvider { filename };
    let parser = provider.get_parser();

    let point_cloud = parser.parse().unwrap();

    println!("Number of points: {}", point_cloud.len());
    println!(
        "LAS {}.{}, point format {}",
        point_cloud.header.version.0, point_cloud.header.version.1, point_cloud.header.point_format
    );
    println!(
        "Labels: {}",
        pcd_core::remap::LabelSet::from_column(point_cloud.classification())
    );
    if !point_cloud.is_empty() {
        println!("First point: {:?}", point_cloud.table().record(0));
    }
}
