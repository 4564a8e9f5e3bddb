pub mod boxes;
pub mod parser;
pub mod pssh;
pub mod queue;
pub mod sidx;

pub use boxes::{BoxHeader, FourCC};
pub use parser::{ParseError, find_box, find_box_content, find_mdat, read_box_header, top_level_boxes};
pub use pssh::{ProtectionData, PsshError, build_pssh, parse_pssh, patch_moov};
pub use queue::{
    BufferError, BufferEvent, BufferQueue, Completion, CompletionHandle, Listener, OperationKind,
    QueueError, SourceBuffer, SubscriptionId,
};
pub use sidx::{ByteRange, SegmentIndex, SubSegment};
