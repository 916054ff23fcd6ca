//! Highlights, memos and follow-up threads anchored to character ranges of
//! streamed markdown, with a persistable session format.

pub mod annotation;
pub mod config;
pub mod engine;
pub mod error;
pub mod highlight;
pub mod markdown;
pub mod message;
pub mod pricing;
pub mod range;
pub mod segmenter;
pub mod selection;
pub mod session;
pub mod span_id;
pub mod storage;

pub use crate::engine::AnnotationEngine;
pub use crate::error::Error;
pub use crate::range::TextRange;
pub use crate::span_id::SpanId;
