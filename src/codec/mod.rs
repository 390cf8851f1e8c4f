//! Query-string and JSON body codecs.

pub mod body;
pub mod query;

pub use body::{is_json_media_type, parse_json, render_body, RequestBody, Reviver};
pub use query::{encode_component, encode_query, iso_duration, QueryParams, QueryValue};
