pub mod expand;
pub mod model;
pub mod report;
pub mod sheets;

pub use expand::{expand_entry, expand_index, expand_pattern, Expansion, ExpansionError};
pub use model::{
    AssetIndex, AssetSize, AssetStatus, Entry, EntryKind, ExpandedAsset, SizeSpec, VarBindings,
};
pub use report::{png_size, MissingAsset, SizeMismatch, StatusFilter, ValidationReport};
pub use sheets::{load_sheet_spec, parse_sheet_tables, SheetEntry};
