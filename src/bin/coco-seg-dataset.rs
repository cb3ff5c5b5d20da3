//! COCO segmentation dataset CLI tool
//!
//! Inspects and exports samples of a COCO segmentation dataset after resizing
//! and label-map construction.

#[cfg(feature = "cli")]
use coco_seg_dataset::cli;

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    cli::main()
}

#[cfg(not(feature = "cli"))]
fn main() {
    panic!("CLI feature not enabled. Please rebuild with --features cli");
}
