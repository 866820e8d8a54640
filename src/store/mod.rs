//! Region file store: decoded records partitioned by region code, with the
//! load/remove/convert operations that keep them in step with disk.

pub mod index;
pub mod record;
pub mod region;

pub use index::{
    ConversionReport, LoadOutcome, LoadSummary, NoWriteObserver, RegionStore,
    StoreLayout, WriteObserver,
};
pub use record::{Record, RecordView};
pub use region::{RegionCode, RegionSet};
