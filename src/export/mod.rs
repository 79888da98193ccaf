pub mod html;

pub use html::{export_to_file, render_annotated_html, render_annotated_page};
