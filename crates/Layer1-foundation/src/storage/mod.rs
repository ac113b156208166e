//! Storage layer
//!
//! JsonStore: 범용 JSON 파일 저장소

mod json;

pub use json::JsonStore;
