//! Shared helpers for reading model output.

pub mod json_extraction;

pub use json_extraction::{
    analyze_json_structure, extract_code_block, extract_json, extract_largest_object,
    find_matching_brace, JsonExtraction, JsonStructureAnalysis,
};
