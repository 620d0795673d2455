//! Data carried between pipeline stages
//!
//! Every value except the fingerprint table is produced per scan and
//! consumed exactly once by the next stage.

pub mod audiobook;
pub mod results;

pub use audiobook::{Audiobook, AudiobookInfo, Chapter, ProcessedAudiobook, ProcessedChapter};
pub use results::{DiscoveryResult, MetadataResult, PersistedAudiobook, ScanTrigger, SplitResult};
