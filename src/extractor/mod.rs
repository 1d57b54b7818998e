//! Lazy, multi-segment extractor views over recordings and sortings.

pub mod binary;
pub mod memory;
pub mod recording;
pub mod sorting;

pub use binary::{BinaryDescriptor, BinaryRecordingView, SampleEncoding, SegmentFile, export_recording};
pub use memory::VecRecordingView;
pub use recording::{ChannelId, ChannelInfo, RecordingView, Traces};
pub use sorting::{SortingView, UnitId, VecSortingView};
