pub mod chat;
pub mod events;
pub mod records;
pub mod styles;

pub use records::{ImagePayload, RecordStatus, ResultRecord, ResultRegistry, SourceItem};
pub use styles::{ColorTheme, Style};
