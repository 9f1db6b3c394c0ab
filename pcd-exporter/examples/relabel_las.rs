use std::path::PathBuf;

use pcd_core::remap::{LabelMapping, RemapEngine};
use pcd_exporter::{encode, EncodeOptions};
use pcd_parser::parsers::{las::LasParserProvider, ParserProvider as _};

fn main() {
    let mut args = std::env::args().skip(1);
    let input = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("pcd-exporter/examples/data/sample.laz"));
    let output = args
        .next()
        .map(PathBuf::from)
        .unwrap_or_else(|| input.with_file_name("sample_updated.laz"));

    let provider = LasParserProvider { filename: input };
    let mut point_cloud = provider.get_parser().parse().unwrap();

    let mappings = vec![LabelMapping::new(1, 2), LabelMapping::new(2, 3)];
    let report = RemapEngine::new()
        .apply(&mut point_cloud, &mappings)
        .unwrap();
    for entry in &report.entries {
        println!("{}: {} records", entry.mapping, entry.records_changed);
    }

    let summary = encode(&output, &point_cloud, &EncodeOptions::default()).unwrap();
    println!("offset: {:?}", summary.offset);
    println!("bounds: {:?}", summary.bounding_volume);
}
