//! Push-protocol wire codec.
//!
//! Terminals upload newline-separated tagged records and consume commands
//! in a strict tab-separated dialect. The two directions are not the same
//! grammar: uploads tolerate collapsed whitespace (some firmwares drop
//! tabs in transit), command emit never does. Parsing happens once, here,
//! at the codec boundary; everything inward works with typed records.

pub mod command;
pub mod emit;
pub mod parse;
pub mod types;

pub use command::{is_idempotent, validate_bio, CommandOp, FormatError};
pub use emit::{canonicalize_biodata, command_line, repair_payload};
pub use parse::{parse_info_csv, parse_options_string, parse_payload, parse_record, parse_reply};
pub use types::{BioType, CommandCategory, CommandReply, DeviceInfo, Record};
