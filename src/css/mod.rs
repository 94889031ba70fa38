//! Class, style and prop mini-languages: tokenizer, parsers, serializers.

pub mod parser;
pub mod tokenizer;

pub use parser::{
    apply_classes, apply_props, apply_style, classes_to_string, parse_classes, parse_props,
    parse_style, props_to_string, style_to_string, Change,
};
