pub mod markdown_parser;

pub use markdown_parser::{LineIndex, parse_markdown, parser_options};
