mod error;
mod page;
mod record;
mod record_file;
mod value;

pub use error::{RecordError, RecordResult};
pub use page::RecordPage;
pub use record::{Record, RecordId, SlotId};
pub use record_file::{RecordFileHandler, RecordFileScanner};
pub use value::{
    AttrType, DATE_MAX, DATE_MIN, FLOAT_EPSILON, Value, format_float, parse_date, validate_date,
};
